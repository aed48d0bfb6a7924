// SPDX-License-Identifier: MIT

//! Terminal-state artifact upload (spec §4.5 "Artifact upload (Runner)").

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use vg_core::{ArtifactKind, ScanId};
use vg_storage::BlobStore;

/// Resolve the local path for `kind`: prefer the path the parser observed
/// in a `report` event, else fall back to the conventional
/// `garak.{scan_id}.<suffix>` name inside `reports_dir`.
fn resolve_path(reports_dir: &Path, scan_id: ScanId, kind: ArtifactKind, observed: Option<&str>) -> PathBuf {
    if let Some(observed) = observed {
        return PathBuf::from(observed);
    }
    let suffix = match kind {
        ArtifactKind::Report => "report.jsonl",
        ArtifactKind::Hitlog => "hitlog.jsonl",
        ArtifactKind::ReportHtml => "report.html",
    };
    reports_dir.join(format!("garak.{scan_id}.{suffix}"))
}

/// Upload whichever of {jsonl, hitlog, html} exist on disk, returning the
/// map of successfully-uploaded blob keys (spec §4.5 "include the key map
/// in the terminal `complete` event payload").
pub async fn upload_artifacts(
    blob_store: &BlobStore,
    reports_dir: &Path,
    scan_id: ScanId,
    jsonl_path: Option<&str>,
    html_path: Option<&str>,
) -> BTreeMap<String, String> {
    let mut keys = BTreeMap::new();
    for (label, kind, observed) in [
        ("jsonl", ArtifactKind::Report, jsonl_path),
        ("hitlog", ArtifactKind::Hitlog, None),
        ("html", ArtifactKind::ReportHtml, html_path),
    ] {
        let local_path = resolve_path(reports_dir, scan_id, kind, observed);
        if !tokio::fs::try_exists(&local_path).await.unwrap_or(false) {
            continue;
        }
        let key = vg_core::artifact_key(&scan_id, kind);
        match blob_store.put_file_with_retry(&key, &local_path).await {
            Ok(()) => {
                keys.insert(label.to_string(), key);
            }
            Err(err) => {
                tracing::warn!(scan_id = %scan_id, label, error = %err, "artifact upload exhausted retries");
            }
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn uploads_only_artifacts_present_on_disk() {
        let reports_dir = tempfile::tempdir().unwrap();
        let blob_dir = tempfile::tempdir().unwrap();
        let scan_id = ScanId::new();
        let jsonl = reports_dir.path().join(format!("garak.{scan_id}.report.jsonl"));
        tokio::fs::write(&jsonl, b"{}\n").await.unwrap();

        let store = BlobStore::local(blob_dir.path()).unwrap();
        let keys = upload_artifacts(&store, reports_dir.path(), scan_id, None, None).await;
        assert_eq!(keys.len(), 1);
        assert!(keys.contains_key("jsonl"));
    }
}

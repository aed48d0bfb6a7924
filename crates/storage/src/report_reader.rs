// SPDX-License-Identifier: MIT

//! Multi-layer report reader (spec §4.5, §9 "Multi-layer lookup with
//! write-through"). Lookup order: immutable in-memory cache, object
//! store, local filesystem (mtime-keyed, TTL'd), upstream Runner HTTP
//! with write-through, else none.

use crate::blobstore::BlobStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use vg_core::{ReportEntry, ScanId};

const LOCAL_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Clone, Copy, PartialEq, Eq)]
enum Provenance {
    /// Came from the object store or upstream write-through; never
    /// re-checked (spec §4.5 step 1 "return unconditionally").
    Immutable,
    /// Came from the local filesystem; re-read once `cached_at` exceeds
    /// the TTL or the file's mtime advances.
    MtimeBased { mtime: std::time::SystemTime },
}

struct CacheEntry {
    entries: Vec<ReportEntry>,
    provenance: Provenance,
    cached_at: Instant,
}

#[derive(Default)]
struct Cache {
    by_scan: HashMap<ScanId, CacheEntry>,
}

/// Composes the blob store, a local spool directory, and the Runner's
/// HTTP surface into the one lookup chain described in spec §4.5.
pub struct ReportReader {
    blob_store: BlobStore,
    local_dir: PathBuf,
    http: reqwest::Client,
    cache: Mutex<Cache>,
}

impl ReportReader {
    pub fn new(blob_store: BlobStore, local_dir: impl Into<PathBuf>) -> Self {
        Self {
            blob_store,
            local_dir: local_dir.into(),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            cache: Mutex::new(Cache::default()),
        }
    }

    /// `entries(scan_id)`; returns `None` when no layer has the artifact.
    pub async fn entries(
        &self,
        scan_id: ScanId,
        runner_base_url: Option<&str>,
        original_filename: Option<&str>,
    ) -> Option<Vec<ReportEntry>> {
        if let Some(cached) = self.cache_hit(scan_id) {
            return Some(cached);
        }

        let key = vg_core::artifact_key(&scan_id, vg_core::ArtifactKind::Report);

        if let Ok(bytes) = self.blob_store.get(&key).await {
            let parsed = parse_jsonl(&bytes);
            self.cache.lock().by_scan.insert(
                scan_id,
                CacheEntry {
                    entries: parsed.clone(),
                    provenance: Provenance::Immutable,
                    cached_at: Instant::now(),
                },
            );
            return Some(parsed);
        }

        let local_path = self.local_dir.join(format!("garak.{scan_id}.report.jsonl"));
        if let Ok(meta) = tokio::fs::metadata(&local_path).await {
            if let Ok(bytes) = tokio::fs::read(&local_path).await {
                let parsed = parse_jsonl(&bytes);
                if let Ok(mtime) = meta.modified() {
                    self.cache.lock().by_scan.insert(
                        scan_id,
                        CacheEntry {
                            entries: parsed.clone(),
                            provenance: Provenance::MtimeBased { mtime },
                            cached_at: Instant::now(),
                        },
                    );
                }
                return Some(parsed);
            }
        }

        if let (Some(base), Some(filename)) = (runner_base_url, original_filename) {
            if let Some(bytes) = self.fetch_upstream(base, filename).await {
                let parsed = parse_jsonl(&bytes);
                // Write-through: idempotent PUT under the canonical key.
                let _ = self.blob_store.put(&key, bytes.clone()).await;
                self.cache.lock().by_scan.insert(
                    scan_id,
                    CacheEntry {
                        entries: parsed.clone(),
                        provenance: Provenance::Immutable,
                        cached_at: Instant::now(),
                    },
                );
                return Some(parsed);
            }
        }

        None
    }

    /// Byte-level fetch for non-JSON-Lines artifacts (the HTML report):
    /// same lookup chain as [`Self::entries`] minus the parse/cache step,
    /// since the HTML report is served opaquely (spec §4.4 "proxies blob
    /// bytes").
    pub async fn raw_bytes(
        &self,
        scan_id: ScanId,
        kind: vg_core::ArtifactKind,
        runner_base_url: Option<&str>,
        original_filename: Option<&str>,
    ) -> Option<bytes::Bytes> {
        let key = vg_core::artifact_key(&scan_id, kind);
        if let Ok(bytes) = self.blob_store.get(&key).await {
            return Some(bytes);
        }

        let local_name = local_artifact_name(scan_id, kind);
        if let Ok(bytes) = tokio::fs::read(self.local_dir.join(&local_name)).await {
            return Some(bytes::Bytes::from(bytes));
        }

        if let (Some(base), Some(filename)) = (runner_base_url, original_filename) {
            if let Some(bytes) = self.fetch_upstream(base, filename).await {
                let _ = self.blob_store.put(&key, bytes.clone()).await;
                return Some(bytes);
            }
        }
        None
    }

    fn cache_hit(&self, scan_id: ScanId) -> Option<Vec<ReportEntry>> {
        let cache = self.cache.lock();
        let entry = cache.by_scan.get(&scan_id)?;
        match entry.provenance {
            Provenance::Immutable => Some(entry.entries.clone()),
            Provenance::MtimeBased { .. } => {
                if entry.cached_at.elapsed() < LOCAL_CACHE_TTL {
                    Some(entry.entries.clone())
                } else {
                    None
                }
            }
        }
    }

    async fn fetch_upstream(&self, base: &str, filename: &str) -> Option<bytes::Bytes> {
        let url = format!("{}/reports/{}", base.trim_end_matches('/'), filename);
        match self.http.get(url).send().await {
            Ok(resp) if resp.status().is_success() => resp.bytes().await.ok(),
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), filename, "upstream report fetch failed");
                None
            }
            Err(err) => {
                tracing::warn!(error = %err, filename, "upstream report fetch errored");
                None
            }
        }
    }

    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }
}

fn local_artifact_name(scan_id: ScanId, kind: vg_core::ArtifactKind) -> String {
    let suffix = match kind {
        vg_core::ArtifactKind::Report => "report.jsonl",
        vg_core::ArtifactKind::Hitlog => "hitlog.jsonl",
        vg_core::ArtifactKind::ReportHtml => "report.html",
    };
    format!("garak.{scan_id}.{suffix}")
}

/// Tolerant JSON-Lines parse: malformed lines are dropped, not fatal
/// (spec §4.5).
fn parse_jsonl(bytes: &[u8]) -> Vec<ReportEntry> {
    String::from_utf8_lossy(bytes)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| match ReportEntry::parse_line(l) {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::debug!(error = %err, "dropping malformed report line");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobstore::BlobStore as Store;

    #[tokio::test]
    async fn falls_back_from_blob_store_to_local_file() {
        let blob_dir = tempfile::tempdir().unwrap();
        let local_dir = tempfile::tempdir().unwrap();
        let scan_id = ScanId::new();
        let local_path = local_dir.path().join(format!("garak.{scan_id}.report.jsonl"));
        tokio::fs::write(
            &local_path,
            b"{\"entry_type\":\"attempt\",\"probe_classname\":\"dan.Dan_11_0\",\"status\":2}\n",
        )
        .await
        .unwrap();

        let reader = ReportReader::new(Store::local(blob_dir.path()).unwrap(), local_dir.path());
        let entries = reader.entries(scan_id, None, None).await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn raw_bytes_falls_back_to_local_html_file() {
        let blob_dir = tempfile::tempdir().unwrap();
        let local_dir = tempfile::tempdir().unwrap();
        let scan_id = ScanId::new();
        let local_path = local_dir.path().join(format!("garak.{scan_id}.report.html"));
        tokio::fs::write(&local_path, b"<html></html>").await.unwrap();

        let reader = ReportReader::new(Store::local(blob_dir.path()).unwrap(), local_dir.path());
        let bytes = reader
            .raw_bytes(scan_id, vg_core::ArtifactKind::ReportHtml, None, None)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"<html></html>");
    }

    #[tokio::test]
    async fn missing_everywhere_returns_none() {
        let blob_dir = tempfile::tempdir().unwrap();
        let local_dir = tempfile::tempdir().unwrap();
        let reader = ReportReader::new(Store::local(blob_dir.path()).unwrap(), local_dir.path());
        assert!(reader.entries(ScanId::new(), None, None).await.is_none());
    }

    #[tokio::test]
    async fn malformed_line_is_dropped_not_fatal() {
        let blob_dir = tempfile::tempdir().unwrap();
        let local_dir = tempfile::tempdir().unwrap();
        let scan_id = ScanId::new();
        let local_path = local_dir.path().join(format!("garak.{scan_id}.report.jsonl"));
        tokio::fs::write(
            &local_path,
            b"not json\n{\"entry_type\":\"attempt\",\"probe_classname\":\"dan.Dan_11_0\",\"status\":2}\n",
        )
        .await
        .unwrap();
        let reader = ReportReader::new(Store::local(blob_dir.path()).unwrap(), local_dir.path());
        let entries = reader.entries(scan_id, None, None).await.unwrap();
        assert_eq!(entries.len(), 1);
    }
}

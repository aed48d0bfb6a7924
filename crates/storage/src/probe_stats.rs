// SPDX-License-Identifier: MIT

//! Materialized probe stats (spec §4.5): computed once from report
//! entries, then written back to the `ScanRecord` so later reads don't
//! re-scan the JSON-Lines artifact.

use std::collections::BTreeMap;
use vg_core::{ProbeStats, ProbeTally, ReportEntry};

/// `category = probe_classname.split('.')[0]`; `status == 2` -> passed,
/// `status == 1` -> failed. Entries missing either field are skipped.
pub fn compute(entries: &[ReportEntry]) -> ProbeStats {
    let mut categories: BTreeMap<String, ProbeTally> = BTreeMap::new();
    for entry in entries {
        if entry.entry_type != "attempt" {
            continue;
        }
        let Some(classname) = entry.probe_classname() else {
            continue;
        };
        let Some(status) = entry.attempt_status() else {
            continue;
        };
        let category = classname.split('.').next().unwrap_or(classname).to_string();
        let tally = categories.entry(category).or_default();
        match status {
            2 => tally.passed += 1,
            1 => tally.failed += 1,
            _ => {}
        }
    }
    ProbeStats { categories }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(classname: &str, status: i64) -> ReportEntry {
        ReportEntry::parse_line(&format!(
            r#"{{"entry_type":"attempt","probe_classname":"{classname}","status":{status}}}"#
        ))
        .unwrap()
    }

    #[test]
    fn tallies_by_top_level_category() {
        let entries = vec![
            attempt("dan.Dan_11_0", 2),
            attempt("dan.Dan_11_0", 1),
            attempt("dan.AutoDAN", 2),
            attempt("encoding.InjectBase64", 2),
        ];
        let stats = compute(&entries);
        assert_eq!(stats.categories["dan"], ProbeTally { passed: 2, failed: 1 });
        assert_eq!(stats.categories["encoding"], ProbeTally { passed: 1, failed: 0 });
    }

    #[test]
    fn non_attempt_entries_are_ignored() {
        let entries = vec![
            ReportEntry::parse_line(r#"{"entry_type":"start_run","garak_version":"0.9"}"#).unwrap(),
            attempt("dan.Dan_11_0", 2),
        ];
        let stats = compute(&entries);
        assert_eq!(stats.categories.len(), 1);
    }
}

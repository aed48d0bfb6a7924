// SPDX-License-Identifier: MIT

//! Per-probe breakdown and per-attempt rendering over a completed scan's
//! report entries (spec §4.5 "Per-probe details", "Per-probe attempts").

use crate::probe_knowledge;
use vg_core::ReportEntry;
use vg_wire::rest::{AttemptDetail, ProbeDetail};

struct ProbeAccumulator {
    passed: u32,
    failed: u32,
}

/// Groups `entries` by fully-qualified probe classname, computes
/// pass-rate, enriches with static security metadata, and sorts ascending
/// by pass-rate (worst first). Pagination is applied by the caller so it
/// can also report `total`.
pub fn probe_details(entries: &[ReportEntry], filter: Option<&str>) -> Vec<ProbeDetail> {
    use std::collections::BTreeMap;
    let mut by_probe: BTreeMap<String, ProbeAccumulator> = BTreeMap::new();

    for entry in entries {
        if entry.entry_type != "attempt" {
            continue;
        }
        let Some(classname) = entry.probe_classname() else { continue };
        if let Some(needle) = filter {
            if !needle.is_empty() && !classname.to_lowercase().contains(&needle.to_lowercase()) {
                continue;
            }
        }
        let acc = by_probe.entry(classname.to_string()).or_insert(ProbeAccumulator { passed: 0, failed: 0 });
        match entry.attempt_status() {
            Some(2) => acc.passed += 1,
            Some(1) => acc.failed += 1,
            _ => {}
        }
    }

    let mut details: Vec<ProbeDetail> = by_probe
        .into_iter()
        .map(|(probe_classname, acc)| {
            let category = probe_classname.split('.').next().unwrap_or(&probe_classname);
            let knowledge = probe_knowledge::lookup(category);
            let total = acc.passed + acc.failed;
            let pass_rate = if total == 0 { 0.0 } else { acc.passed as f64 / total as f64 * 100.0 };
            ProbeDetail {
                probe_classname,
                category: category.to_string(),
                passed: acc.passed,
                failed: acc.failed,
                pass_rate,
                severity: knowledge.severity.to_string(),
                cwe_ids: knowledge.cwe_ids.iter().map(|s| s.to_string()).collect(),
                owasp_llm_tags: knowledge.owasp_llm_tags.iter().map(|s| s.to_string()).collect(),
                mitigation: knowledge.mitigation.to_string(),
            }
        })
        .collect();

    details.sort_by(|a, b| a.pass_rate.partial_cmp(&b.pass_rate).unwrap_or(std::cmp::Ordering::Equal));
    details
}

/// Filters `entries` down to attempts for `probe_classname`, optionally by
/// status label ("PASS"/"FAIL"), rendering each per spec §4.5.
pub fn probe_attempts(entries: &[ReportEntry], probe_classname: &str, status_filter: Option<&str>) -> Vec<AttemptDetail> {
    entries
        .iter()
        .filter(|e| e.entry_type == "attempt")
        .filter(|e| e.probe_classname() == Some(probe_classname))
        .filter(|e| status_filter.is_none_or_matches(e.status_label()))
        .map(|e| AttemptDetail {
            uuid: e.uuid_field(),
            seq: e.seq(),
            status: e.status_label().to_string(),
            prompt_text: e.prompt_text(),
            output_text: e.output_texts().first().cloned().unwrap_or_default(),
            all_outputs: e.output_texts(),
            triggers: e.triggers(),
            detector_results: e.detector_results(),
            goal: e.goal(),
        })
        .collect()
}

trait StatusFilterExt {
    fn is_none_or_matches(&self, label: &str) -> bool;
}

impl StatusFilterExt for Option<&str> {
    fn is_none_or_matches(&self, label: &str) -> bool {
        match self {
            Some(wanted) => wanted.eq_ignore_ascii_case(label),
            None => true,
        }
    }
}

/// Generic page slice; out-of-range pages yield an empty slice (spec §8).
pub fn paginate<T: Clone>(items: &[T], page: u32, page_size: u32) -> (Vec<T>, u64) {
    let total = items.len() as u64;
    let page = page.max(1);
    let page_size = page_size.max(1);
    let start = ((page - 1) as u64 * page_size as u64) as usize;
    let page_items = items.iter().skip(start).take(page_size as usize).cloned().collect();
    (page_items, total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(probe: &str, status: i64) -> ReportEntry {
        ReportEntry::parse_line(&format!(
            r#"{{"entry_type":"attempt","probe_classname":"{probe}","status":{status},"uuid":"u1","seq":0,"prompt":"p","outputs":["o"]}}"#
        ))
        .unwrap()
    }

    #[test]
    fn details_sorted_worst_first() {
        let entries = vec![
            attempt("dan.Dan_11_0", 1),
            attempt("dan.Dan_11_0", 1),
            attempt("encoding.InjectBase64", 2),
        ];
        let details = probe_details(&entries, None);
        assert_eq!(details[0].probe_classname, "dan.Dan_11_0");
        assert_eq!(details[0].pass_rate, 0.0);
    }

    #[test]
    fn filter_matches_substring_case_insensitively() {
        let entries = vec![attempt("dan.Dan_11_0", 2), attempt("encoding.InjectBase64", 2)];
        let details = probe_details(&entries, Some("DAN"));
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].probe_classname, "dan.Dan_11_0");
    }

    #[test]
    fn attempts_filtered_by_status_label() {
        let entries = vec![attempt("dan.Dan_11_0", 1), attempt("dan.Dan_11_0", 2)];
        let attempts = probe_attempts(&entries, "dan.Dan_11_0", Some("PASS"));
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].status, "PASS");
    }

    #[test]
    fn pagination_out_of_range_is_empty() {
        let items = vec![1, 2, 3];
        let (page, total) = paginate(&items, 10, 2);
        assert!(page.is_empty());
        assert_eq!(total, 3);
    }
}

// SPDX-License-Identifier: MIT

//! `GET /scan/history` filtering, sorting, and pagination (spec §4.4,
//! §6 "pagination params page, page_size, sort_by, sort_order, status,
//! search, start_date, end_date").

use vg_core::{ScanRecord, ScanStatus};
use vg_wire::rest::{HistoryQuery, ScanSnapshot, MAX_PAGE_SIZE};

const DEFAULT_PAGE_SIZE: u32 = 20;

/// Applies the query's filter/sort/page to `records`, returning the page
/// of snapshots plus the unfiltered-but-matched total (for
/// `HistoryPage::total`). Out-of-range pages yield an empty list, never
/// an error (spec §8 "Pagination at page > total_pages").
pub fn paginate(records: Vec<ScanRecord>, query: &HistoryQuery) -> (Vec<ScanSnapshot>, u32, u64) {
    let mut filtered: Vec<ScanRecord> = records
        .into_iter()
        .filter(|r| matches_status(r, query.status))
        .filter(|r| matches_search(r, query.search.as_deref()))
        .filter(|r| matches_date_range(r, query.start_date.as_deref(), query.end_date.as_deref()))
        .collect();

    sort_records(&mut filtered, query.sort_by.as_deref(), query.sort_order.as_deref());

    let total = filtered.len() as u64;
    let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let page = query.page.unwrap_or(1).max(1);

    let start = ((page - 1) as u64 * page_size as u64) as usize;
    let page_records = filtered.into_iter().skip(start).take(page_size as usize);
    let snapshots = page_records.map(|r| ScanSnapshot::from(&r)).collect();

    (snapshots, page_size, total)
}

fn matches_status(record: &ScanRecord, status: Option<ScanStatus>) -> bool {
    match status {
        Some(s) => record.status == s,
        None => true,
    }
}

fn matches_search(record: &ScanRecord, search: Option<&str>) -> bool {
    let Some(needle) = search else { return true };
    if needle.is_empty() {
        return true;
    }
    let needle = needle.to_lowercase();
    record.config.target_name.to_lowercase().contains(&needle)
        || record.config.target_type.to_lowercase().contains(&needle)
        || record.scan_id.to_string().contains(&needle)
}

fn matches_date_range(record: &ScanRecord, start_date: Option<&str>, end_date: Option<&str>) -> bool {
    let anchor_ms = record.started_at_ms.unwrap_or(record.created_at_ms);
    if let Some(start) = start_date.and_then(parse_date_ms) {
        if anchor_ms < start {
            return false;
        }
    }
    if let Some(end) = end_date.and_then(parse_date_ms) {
        // Inclusive of the whole end day.
        if anchor_ms >= end + 86_400_000 {
            return false;
        }
    }
    true
}

fn parse_date_ms(s: &str) -> Option<u64> {
    use chrono::{DateTime, Utc};
    let date = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    let naive = date.and_hms_opt(0, 0, 0)?;
    let dt = DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc);
    Some(dt.timestamp_millis() as u64)
}

fn sort_records(records: &mut [ScanRecord], sort_by: Option<&str>, sort_order: Option<&str>) {
    let descending = !matches!(sort_order, Some("asc"));
    match sort_by.unwrap_or("started_at") {
        "completed_at" => records.sort_by_key(|r| r.completed_at_ms.unwrap_or(0)),
        "status" => records.sort_by_key(|r| r.status.to_string()),
        "target_name" => records.sort_by(|a, b| a.config.target_name.cmp(&b.config.target_name)),
        "pass_rate" => records.sort_by(|a, b| {
            a.pass_rate()
                .unwrap_or(-1.0)
                .partial_cmp(&b.pass_rate().unwrap_or(-1.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        }),
        _ => records.sort_by_key(|r| r.started_at_ms.unwrap_or(r.created_at_ms)),
    }
    if descending {
        records.reverse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vg_core::scan_config::tests_support::minimal;
    use vg_core::ScanId;

    fn record(target_name: &str, status: ScanStatus, started_at_ms: u64) -> ScanRecord {
        let mut cfg = minimal();
        cfg.target_name = target_name.to_string();
        let mut r = ScanRecord::new(ScanId::new(), cfg, started_at_ms);
        r.started_at_ms = Some(started_at_ms);
        r.status = status;
        if status.is_terminal() {
            r.completed_at_ms = Some(started_at_ms + 1000);
        }
        r
    }

    #[test]
    fn out_of_range_page_is_empty_not_error() {
        let records = vec![record("llama", ScanStatus::Completed, 1000)];
        let query = HistoryQuery {
            page: Some(50),
            ..Default::default()
        };
        let (page, _, total) = paginate(records, &query);
        assert!(page.is_empty());
        assert_eq!(total, 1);
    }

    #[test]
    fn filters_by_status() {
        let records = vec![
            record("llama", ScanStatus::Completed, 1000),
            record("mistral", ScanStatus::Failed, 2000),
        ];
        let query = HistoryQuery {
            status: Some(ScanStatus::Failed),
            ..Default::default()
        };
        let (page, _, total) = paginate(records, &query);
        assert_eq!(total, 1);
        assert_eq!(page[0].target_name, "mistral");
    }

    #[test]
    fn search_matches_target_name_case_insensitively() {
        let records = vec![
            record("Llama3.2", ScanStatus::Completed, 1000),
            record("mistral", ScanStatus::Completed, 2000),
        ];
        let query = HistoryQuery {
            search: Some("llama".into()),
            ..Default::default()
        };
        let (page, _, total) = paginate(records, &query);
        assert_eq!(total, 1);
        assert_eq!(page[0].target_name, "Llama3.2");
    }

    #[test]
    fn sorts_descending_by_default() {
        let records = vec![
            record("a", ScanStatus::Completed, 1000),
            record("b", ScanStatus::Completed, 2000),
        ];
        let (page, _, _) = paginate(records, &HistoryQuery::default());
        assert_eq!(page[0].target_name, "b");
    }
}

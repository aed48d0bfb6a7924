// SPDX-License-Identifier: MIT

//! Aggregate statistics (spec §4.6): iterates every persisted `ScanRecord`
//! and folds it into status counts, pass-rate summaries, daily trends,
//! top failing probes, and per-target breakdowns.

use std::collections::BTreeMap;
use vg_core::{ScanRecord, ScanStatus};
use vg_wire::rest::{DailyTrend, FailingProbe, StatisticsResponse, StatusCounts, TargetBreakdown};

const MS_PER_DAY: u64 = 86_400_000;

/// `statistics(days)`, spec §4.6. `now_ms` anchors the `daily_trends`
/// window so tests don't depend on wall-clock time.
pub fn compute(records: &[ScanRecord], days: u32, now_ms: u64) -> StatisticsResponse {
    let mut completed = 0u64;
    let mut failed = 0u64;
    let mut cancelled = 0u64;
    let mut running_or_pending = 0u64;

    let mut total_passed_all = 0u64;
    let mut total_failed_all = 0u64;

    let mut completed_pass_rates: Vec<f64> = Vec::new();

    let mut day_buckets: BTreeMap<u64, (u64, u64, u64, Vec<f64>)> = BTreeMap::new();
    let days = days.max(1) as u64;
    let window_start = now_ms.saturating_sub((days - 1) * MS_PER_DAY);
    for d in 0..days {
        day_buckets.insert(window_start + d * MS_PER_DAY, (0, 0, 0, Vec::new()));
    }

    let mut failure_counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut target_acc: BTreeMap<(String, String), (u64, Vec<f64>, u64)> = BTreeMap::new();

    for record in records {
        match record.status {
            ScanStatus::Completed => completed += 1,
            ScanStatus::Failed => failed += 1,
            ScanStatus::Cancelled => cancelled += 1,
            ScanStatus::Pending | ScanStatus::Running => running_or_pending += 1,
        }

        total_passed_all += record.passed as u64;
        total_failed_all += record.failed as u64;

        if record.status == ScanStatus::Completed {
            if let Some(rate) = record.pass_rate() {
                completed_pass_rates.push(rate);
            }

            if let Some(stats) = &record.probe_stats {
                for (category, tally) in &stats.categories {
                    if tally.failed > 0 {
                        *failure_counts.entry(category.clone()).or_insert(0) += tally.failed as u64;
                    }
                }
            }
        }

        if let Some(completed_at) = record.completed_at_ms.or(record.started_at_ms) {
            if completed_at >= window_start {
                let day_start = window_start + ((completed_at - window_start) / MS_PER_DAY) * MS_PER_DAY;
                if let Some(bucket) = day_buckets.get_mut(&day_start) {
                    bucket.0 += 1;
                    bucket.1 += record.passed as u64;
                    bucket.2 += record.failed as u64;
                    if let Some(rate) = record.pass_rate() {
                        bucket.3.push(rate);
                    }
                }
            }
        }

        let key = (record.config.target_type.clone(), record.config.target_name.clone());
        let entry = target_acc.entry(key).or_insert((0, Vec::new(), 0));
        entry.0 += 1;
        if let Some(rate) = record.pass_rate() {
            entry.1.push(rate);
        }
        entry.2 = entry.2.max(record.created_at_ms);
    }

    let overall_pass_rate = if total_passed_all + total_failed_all > 0 {
        total_passed_all as f64 / (total_passed_all + total_failed_all) as f64 * 100.0
    } else {
        0.0
    };

    let (avg_pass_rate, min_pass_rate, max_pass_rate) = summarize(&completed_pass_rates);

    let daily_trends = day_buckets
        .into_iter()
        .map(|(day_start, (scan_count, passed, failed, rates))| DailyTrend {
            date: epoch_ms_to_date(day_start),
            scan_count,
            total_passed: passed,
            total_failed: failed,
            avg_pass_rate: avg(&rates),
        })
        .collect();

    let mut top_failing_probes: Vec<FailingProbe> = failure_counts
        .into_iter()
        .map(|(probe_classname, failure_count)| FailingProbe {
            probe_classname,
            failure_count,
        })
        .collect();
    top_failing_probes.sort_by(|a, b| b.failure_count.cmp(&a.failure_count));
    top_failing_probes.truncate(10);

    let target_breakdown = target_acc
        .into_iter()
        .map(|((target_type, target_name), (scan_count, rates, last_scanned_ms))| TargetBreakdown {
            target_type,
            target_name,
            scan_count,
            avg_pass_rate: avg(&rates),
            last_scanned_ms,
        })
        .collect();

    StatisticsResponse {
        status_counts: StatusCounts {
            completed,
            failed,
            cancelled,
            running_or_pending,
        },
        overall_pass_rate,
        avg_pass_rate,
        min_pass_rate,
        max_pass_rate,
        daily_trends,
        top_failing_probes,
        target_breakdown,
    }
}

fn summarize(rates: &[f64]) -> (f64, f64, f64) {
    if rates.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let avg = avg(rates);
    let min = rates.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = rates.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    (avg, min, max)
}

fn avg(rates: &[f64]) -> f64 {
    if rates.is_empty() {
        0.0
    } else {
        rates.iter().sum::<f64>() / rates.len() as f64
    }
}

/// Truncates to whole UTC days; only used to label `daily_trends` buckets.
fn epoch_ms_to_date(ms: u64) -> String {
    let secs = (ms / 1000) as i64;
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "1970-01-01".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vg_core::scan_config::tests_support::minimal;
    use vg_core::ScanId;

    fn completed_record(now: u64, passed: u32, failed: u32) -> ScanRecord {
        let mut r = ScanRecord::new(ScanId::new(), minimal(), now);
        r.transition_to(ScanStatus::Running, now);
        r.passed = passed;
        r.failed = failed;
        r.transition_to(ScanStatus::Completed, now);
        r
    }

    #[test]
    fn days_1_returns_exactly_one_bucket() {
        let now = 10_000_000_000;
        let stats = compute(&[], 1, now);
        assert_eq!(stats.daily_trends.len(), 1);
    }

    #[test]
    fn overall_pass_rate_is_zero_with_no_attempts() {
        let stats = compute(&[], 7, 10_000_000_000);
        assert_eq!(stats.overall_pass_rate, 0.0);
    }

    #[test]
    fn status_counts_tally_every_status() {
        let now = 10_000_000_000;
        let records = vec![completed_record(now, 8, 2)];
        let stats = compute(&records, 7, now);
        assert_eq!(stats.status_counts.completed, 1);
        assert_eq!(stats.overall_pass_rate, 80.0);
    }
}

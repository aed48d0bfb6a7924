// SPDX-License-Identifier: MIT

//! Mutable scan state (spec §3, `ScanRecord`) and its terminal-state
//! invariants.

use crate::scan_config::ScanConfig;
use crate::simple_display;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Cap on [`ScanRecord::recent_output`] (invariant viii, spec §3).
pub const RECENT_OUTPUT_CAP: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

simple_display! {
    ScanStatus {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl ScanStatus {
    /// Terminal states are absorbing (invariant iv, spec §3).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanStatus::Completed | ScanStatus::Failed | ScanStatus::Cancelled
        )
    }

    /// Whether `self -> next` is a legal transition. Terminal states never
    /// move back to running/pending; `cancelled` wins races against
    /// `completed`/`failed` once cancellation has been initiated (spec §5).
    pub fn can_transition_to(&self, next: ScanStatus) -> bool {
        if *self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        true
    }
}

/// Per-probe pass/fail tallies, materialized write-once (spec §3, §4.5).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeStats {
    pub categories: std::collections::BTreeMap<String, ProbeTally>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeTally {
    pub passed: u32,
    pub failed: u32,
}

/// A ring buffer capped at [`RECENT_OUTPUT_CAP`] lines; oldest are evicted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecentOutput(VecDeque<String>);

impl RecentOutput {
    pub fn push(&mut self, line: impl Into<String>) {
        if self.0.len() >= RECENT_OUTPUT_CAP {
            self.0.pop_front();
        }
        self.0.push_back(line.into());
    }

    pub fn last_n(&self, n: usize) -> Vec<&str> {
        self.0.iter().rev().take(n).rev().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Mutable scan state, spec §3. Owned exclusively by the Controller's
/// in-memory `active_scans` map and persisted row; the Runner never holds
/// one of these directly (it only emits [`crate::event::ProgressEvent`]s).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    pub scan_id: crate::id::ScanId,
    pub status: ScanStatus,
    /// 0..=100 (invariant v)
    pub progress: u8,
    pub current_probe: Option<String>,
    pub completed_probes: u32,
    pub total_probes: u32,
    pub current_iteration: u32,
    pub total_iterations: u32,
    pub passed: u32,
    pub failed: u32,
    pub elapsed_ms: Option<u64>,
    pub estimated_remaining_ms: Option<u64>,
    pub error_message: Option<String>,
    pub created_at_ms: u64,
    pub started_at_ms: Option<u64>,
    pub completed_at_ms: Option<u64>,
    pub jsonl_path: Option<String>,
    pub html_path: Option<String>,
    pub jsonl_key: Option<String>,
    pub html_key: Option<String>,
    pub config: ScanConfig,
    pub probe_stats: Option<ProbeStats>,
    pub recent_output: RecentOutput,
}

impl ScanRecord {
    pub fn new(scan_id: crate::id::ScanId, config: ScanConfig, created_at_ms: u64) -> Self {
        Self {
            scan_id,
            status: ScanStatus::Pending,
            progress: 0,
            current_probe: None,
            completed_probes: 0,
            total_probes: 0,
            current_iteration: 0,
            total_iterations: 0,
            passed: 0,
            failed: 0,
            elapsed_ms: None,
            estimated_remaining_ms: None,
            error_message: None,
            created_at_ms,
            started_at_ms: None,
            completed_at_ms: None,
            jsonl_path: None,
            html_path: None,
            jsonl_key: None,
            html_key: None,
            config,
            probe_stats: None,
            recent_output: RecentOutput::default(),
        }
    }

    /// Apply a status transition, respecting invariants iii/iv. Returns
    /// `false` (no-op) if the transition is disallowed.
    pub fn transition_to(&mut self, next: ScanStatus, now_ms: u64) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at_ms.get_or_insert(now_ms);
        }
        true
    }

    pub fn pass_rate(&self) -> Option<f64> {
        let total = self.passed + self.failed;
        if total == 0 {
            None
        } else {
            Some(self.passed as f64 / total as f64 * 100.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_absorbing() {
        assert!(!ScanStatus::Completed.can_transition_to(ScanStatus::Running));
        assert!(!ScanStatus::Cancelled.can_transition_to(ScanStatus::Completed));
        assert!(ScanStatus::Running.can_transition_to(ScanStatus::Completed));
    }

    #[test]
    fn recent_output_evicts_oldest() {
        let mut ring = RecentOutput::default();
        for i in 0..250 {
            ring.push(format!("line {i}"));
        }
        assert_eq!(ring.len(), RECENT_OUTPUT_CAP);
        assert_eq!(ring.last_n(1), vec!["line 249"]);
    }

    #[test]
    fn transition_sets_completed_at_once() {
        let cfg = crate::scan_config::tests_support::minimal();
        let mut rec = ScanRecord::new(crate::id::ScanId::new(), cfg, 0);
        assert!(rec.transition_to(ScanStatus::Running, 10));
        assert!(rec.transition_to(ScanStatus::Completed, 20));
        assert_eq!(rec.completed_at_ms, Some(20));
        // A second terminal event must not move completed_at.
        assert!(!rec.transition_to(ScanStatus::Failed, 30));
        assert_eq!(rec.completed_at_ms, Some(20));
    }
}

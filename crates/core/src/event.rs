// SPDX-License-Identifier: MIT

//! Typed parser output (spec §3 `ProgressEvent`, §4.2).

use serde::{Deserialize, Serialize};

/// One parsed line of `ENGINE` stdout, or the synthesized terminal events.
/// `raw_line` is carried on every variant that corresponds to an actual
/// line of output so SSE frames can expose it for downstream line-level
/// workflow reconstruction (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Status {
        message: String,
        raw_line: String,
    },
    Progress {
        probe: Option<String>,
        percent: u8,
        current: Option<u32>,
        total: Option<u32>,
        elapsed: Option<String>,
        remaining: Option<String>,
        raw_line: String,
    },
    ProbeCount {
        completed: u32,
        total: u32,
        raw_line: String,
    },
    CurrentProbe {
        probe: String,
        raw_line: String,
    },
    Result {
        tests_passed: u32,
        tests_failed: u32,
        total_tests: u32,
        total_passed: u32,
        total_failed: u32,
        raw_line: String,
    },
    Report {
        report_type: ReportType,
        path: String,
        raw_line: String,
    },
    Complete {
        passed: u32,
        failed: u32,
        report_keys: std::collections::BTreeMap<String, String>,
    },
    Error {
        message: String,
        raw_line: String,
    },
    Output {
        line: String,
        raw_line: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Html,
    Jsonl,
}

impl ProgressEvent {
    /// The `event:` frame name an SSE writer should use (spec §4.3, §6).
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::Status { .. } => "status",
            ProgressEvent::Progress { .. } => "progress",
            ProgressEvent::ProbeCount { .. } => "probe_count",
            ProgressEvent::CurrentProbe { .. } => "current_probe",
            ProgressEvent::Result { .. } => "result",
            ProgressEvent::Report { .. } => "report",
            ProgressEvent::Complete { .. } => "complete",
            ProgressEvent::Error { .. } => "error",
            ProgressEvent::Output { .. } => "output",
        }
    }

    /// Whether this event is terminal for the scan (spec §5 ordering
    /// guarantee ii): `complete` and `error` carry a terminal status;
    /// `Cancelled` is driven out-of-band by [`crate::scan_record::ScanStatus`]
    /// rather than a parser event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Complete { .. } | ProgressEvent::Error { .. })
    }
}

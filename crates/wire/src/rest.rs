// SPDX-License-Identifier: MIT

//! REST request/response DTOs for the Runner's HTTP surface (spec §4.3)
//! and the Controller's `/api/v1/...` surface (spec §6).

use serde::{Deserialize, Serialize};
use vg_core::{ProbeStats, ScanConfig, ScanId, ScanStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartScanRequest {
    pub scan_id: ScanId,
    pub config: ScanConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartScanResponse {
    pub scan_id: ScanId,
    pub status: ScanStatus,
    pub message: String,
}

/// Plain-text error body every handler converts taxonomy errors into
/// (spec §7 "error bodies carry `{detail}`").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// Read-model snapshot of a [`vg_core::ScanRecord`], shape shared by
/// `GET /scan/{id}/status`, the WebSocket fan-out, and history rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSnapshot {
    pub scan_id: ScanId,
    pub status: ScanStatus,
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
    pub target_type: String,
    pub target_name: String,
    pub created_at_ms: u64,
    pub started_at_ms: Option<u64>,
    pub completed_at_ms: Option<u64>,
}

impl From<&vg_core::ScanRecord> for ScanSnapshot {
    fn from(r: &vg_core::ScanRecord) -> Self {
        Self {
            scan_id: r.scan_id,
            status: r.status,
            progress: r.progress,
            current_probe: r.current_probe.clone(),
            completed_probes: r.completed_probes,
            total_probes: r.total_probes,
            current_iteration: r.current_iteration,
            total_iterations: r.total_iterations,
            passed: r.passed,
            failed: r.failed,
            elapsed_ms: r.elapsed_ms,
            estimated_remaining_ms: r.estimated_remaining_ms,
            error_message: r.error_message.clone(),
            target_type: r.config.target_type.clone(),
            target_name: r.config.target_name.clone(),
            created_at_ms: r.created_at_ms,
            started_at_ms: r.started_at_ms,
            completed_at_ms: r.completed_at_ms,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub status: Option<ScanStatus>,
    pub search: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Caps `page_size` at 100 (spec §4.4).
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub scans: Vec<ScanSnapshot>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultsResponse {
    pub snapshot: ScanSnapshot,
    pub probe_stats: Option<ProbeStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeDetail {
    pub probe_classname: String,
    pub category: String,
    pub passed: u32,
    pub failed: u32,
    pub pass_rate: f64,
    pub severity: String,
    pub cwe_ids: Vec<String>,
    pub owasp_llm_tags: Vec<String>,
    pub mitigation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeDetailsPage {
    pub probes: Vec<ProbeDetail>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptDetail {
    pub uuid: String,
    pub seq: u32,
    pub status: String,
    pub prompt_text: String,
    pub output_text: String,
    pub all_outputs: Vec<String>,
    pub triggers: Vec<String>,
    pub detector_results: serde_json::Value,
    pub goal: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptsPage {
    pub attempts: Vec<AttemptDetail>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttemptsQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusCounts {
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub running_or_pending: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyTrend {
    pub date: String,
    pub scan_count: u64,
    pub total_passed: u64,
    pub total_failed: u64,
    pub avg_pass_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailingProbe {
    pub probe_classname: String,
    pub failure_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetBreakdown {
    pub target_type: String,
    pub target_name: String,
    pub scan_count: u64,
    pub avg_pass_rate: f64,
    pub last_scanned_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatisticsResponse {
    pub status_counts: StatusCounts,
    pub overall_pass_rate: f64,
    pub avg_pass_rate: f64,
    pub min_pass_rate: f64,
    pub max_pass_rate: f64,
    pub daily_trends: Vec<DailyTrend>,
    pub top_failing_probes: Vec<FailingProbe>,
    pub target_breakdown: Vec<TargetBreakdown>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginListing {
    pub kind: String,
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
}

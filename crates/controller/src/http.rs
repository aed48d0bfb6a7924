// SPDX-License-Identifier: MIT

//! Controller `/api/v1/...` HTTP surface (spec §6): scan submission,
//! history/results/probes/attempts reads, report proxying, cancellation,
//! aggregate statistics, the workflow analyzer export, and the WebSocket
//! fan-out upgrade.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use vg_core::{ArtifactKind, Clock, ScanConfig, ScanId, ScanRecord, ScanStatus, SystemClock};
use vg_storage::{probe_stats, BlobStore, ReportReader};
use vg_wire::rest::{
    AttemptsPage, AttemptsQuery, ErrorBody, HistoryPage, HistoryQuery, PluginListing, ProbeDetailsPage,
    ResultsResponse, ScanSnapshot, StartScanResponse, VersionInfo,
};

use crate::registry::Registry;
use crate::workflow::{self, GraphBuilder, WorkflowGraphs};
use crate::{history, report_access, statistics, ws};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub report_reader: Arc<ReportReader>,
    pub blob_store: BlobStore,
    pub workflow_graphs: Arc<WorkflowGraphs>,
    pub runner_base_url: String,
    pub http: reqwest::Client,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/scan/start", post(start_scan))
        .route("/api/v1/scan/history", get(scan_history))
        .route("/api/v1/scan/statistics", get(scan_statistics))
        .route("/api/v1/scan/:id/status", get(scan_status))
        .route("/api/v1/scan/:id/results", get(scan_results))
        .route("/api/v1/scan/:id/probes", get(scan_probes))
        .route("/api/v1/scan/:id/probes/:probe/attempts", get(scan_probe_attempts))
        .route("/api/v1/scan/:id/report/html", get(scan_report_html))
        .route("/api/v1/scan/:id/report/detailed", get(scan_report_detailed))
        .route("/api/v1/scan/:id/workflow", get(scan_workflow).delete(scan_workflow_clear))
        .route("/api/v1/scan/:id/workflow/mermaid", get(scan_workflow_mermaid))
        .route("/api/v1/scan/:id/cancel", delete(scan_cancel))
        .route("/api/v1/scan/:id", delete(scan_delete))
        .route("/api/v1/scan/:id/progress", get(scan_progress_ws))
        .route("/api/v1/plugins/:kind", get(list_plugins))
        .route("/api/v1/version", get(version))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

fn error_response(status: StatusCode, detail: impl Into<String>) -> axum::response::Response {
    (status, Json(ErrorBody { detail: detail.into() })).into_response()
}

fn not_found(id: ScanId) -> axum::response::Response {
    error_response(StatusCode::NOT_FOUND, format!("scan {id} not found"))
}

/// The local filename the Runner gave an artifact (spec §4.5: "ENGINE
/// uses its own UUID in the filename"); recovered from the path the
/// parser reported, since the Controller never sees it directly.
fn original_filename(path: &Option<String>) -> Option<String> {
    path.as_ref()
        .and_then(|p| Path::new(p).file_name())
        .map(|f| f.to_string_lossy().into_owned())
}

async fn start_scan(State(state): State<AppState>, Json(config): Json<ScanConfig>) -> impl IntoResponse {
    match state.registry.submit(config).await {
        Ok(handle) => {
            let scan_id = handle.lock().scan_id;
            let http = state.http.clone();
            let runner_base_url = state.runner_base_url.clone();
            let store = state.registry.store_arc();
            let record = handle.clone();
            tokio::spawn(async move {
                crate::sse_consumer::run(http, runner_base_url, scan_id, record, store).await;
            });
            (
                StatusCode::OK,
                Json(StartScanResponse {
                    scan_id,
                    status: ScanStatus::Pending,
                    message: "scan submitted".to_string(),
                }),
            )
                .into_response()
        }
        Err(err) => error_response(StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), err.detail()),
    }
}

async fn scan_history(State(state): State<AppState>, Query(query): Query<HistoryQuery>) -> impl IntoResponse {
    let records = match state.registry.store().list_all().await {
        Ok(r) => r,
        Err(err) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    };
    let (scans, page_size, total) = history::paginate(records, &query);
    Json(HistoryPage {
        scans,
        page: query.page.unwrap_or(1).max(1),
        page_size,
        total,
    })
    .into_response()
}

#[derive(Debug, Deserialize)]
struct StatisticsQuery {
    days: Option<u32>,
}

async fn scan_statistics(State(state): State<AppState>, Query(query): Query<StatisticsQuery>) -> impl IntoResponse {
    let records = match state.registry.store().list_all().await {
        Ok(r) => r,
        Err(err) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    };
    let now = SystemClock.epoch_ms();
    Json(statistics::compute(&records, query.days.unwrap_or(7), now)).into_response()
}

async fn load_record(state: &AppState, id: ScanId) -> Option<ScanRecord> {
    if let Some(snapshot) = state.registry.snapshot(id) {
        return Some(snapshot);
    }
    state.registry.store().get(id).await.ok().flatten()
}

async fn scan_status(State(state): State<AppState>, AxumPath(id): AxumPath<ScanId>) -> impl IntoResponse {
    match load_record(&state, id).await {
        Some(record) => Json(ScanSnapshot::from(&record)).into_response(),
        None => not_found(id),
    }
}

/// Loads the report entries for `scan_id` through the full lookup chain
/// (spec §4.5), using the record's own remembered paths to recover the
/// Runner's original filenames for the upstream-HTTP fallback.
async fn load_entries(state: &AppState, record: &ScanRecord) -> Option<Vec<vg_core::ReportEntry>> {
    let filename = original_filename(&record.jsonl_path);
    state
        .report_reader
        .entries(record.scan_id, Some(&state.runner_base_url), filename.as_deref())
        .await
}

/// `probe_stats(scan_id)` (spec §4.5): read from the record if present,
/// else compute from `entries()` and write back once.
async fn ensure_probe_stats(state: &AppState, mut record: ScanRecord) -> ScanRecord {
    if record.probe_stats.is_some() {
        return record;
    }
    if let Some(entries) = load_entries(state, &record).await {
        let stats = probe_stats::compute(&entries);
        record.probe_stats = Some(stats.clone());
        let _ = state.registry.store().upsert(&record).await;
        if let Some(handle) = state.registry.get(record.scan_id) {
            handle.lock().probe_stats = Some(stats);
        }
    }
    record
}

async fn scan_results(State(state): State<AppState>, AxumPath(id): AxumPath<ScanId>) -> impl IntoResponse {
    let Some(record) = load_record(&state, id).await else {
        return not_found(id);
    };
    let record = ensure_probe_stats(&state, record).await;
    Json(ResultsResponse {
        snapshot: ScanSnapshot::from(&record),
        probe_stats: record.probe_stats,
    })
    .into_response()
}

#[derive(Debug, Default, Deserialize)]
struct ProbesQuery {
    filter: Option<String>,
    page: Option<u32>,
    page_size: Option<u32>,
}

async fn scan_probes(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<ScanId>,
    Query(query): Query<ProbesQuery>,
) -> impl IntoResponse {
    let Some(record) = load_record(&state, id).await else {
        return not_found(id);
    };
    let entries = load_entries(&state, &record).await.unwrap_or_default();
    let details = report_access::probe_details(&entries, query.filter.as_deref());
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(20).max(1);
    let (probes, total) = report_access::paginate(&details, page, page_size);
    Json(ProbeDetailsPage {
        probes,
        page,
        page_size,
        total,
    })
    .into_response()
}

async fn scan_probe_attempts(
    State(state): State<AppState>,
    AxumPath((id, probe)): AxumPath<(ScanId, String)>,
    Query(query): Query<AttemptsQuery>,
) -> impl IntoResponse {
    let Some(record) = load_record(&state, id).await else {
        return not_found(id);
    };
    let entries = load_entries(&state, &record).await.unwrap_or_default();
    let attempts = report_access::probe_attempts(&entries, &probe, query.status.as_deref());
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(20).max(1);
    let (attempts, total) = report_access::paginate(&attempts, page, page_size);
    Json(AttemptsPage {
        attempts,
        page,
        page_size,
        total,
    })
    .into_response()
}

async fn scan_report_html(State(state): State<AppState>, AxumPath(id): AxumPath<ScanId>) -> impl IntoResponse {
    let Some(record) = load_record(&state, id).await else {
        return not_found(id);
    };
    let filename = original_filename(&record.html_path);
    match state
        .report_reader
        .raw_bytes(id, ArtifactKind::ReportHtml, Some(&state.runner_base_url), filename.as_deref())
        .await
    {
        Some(bytes) => ([(header::CONTENT_TYPE, "text/html")], bytes).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("no html report for scan {id}")),
    }
}

async fn scan_report_detailed(State(state): State<AppState>, AxumPath(id): AxumPath<ScanId>) -> impl IntoResponse {
    let Some(record) = load_record(&state, id).await else {
        return not_found(id);
    };
    let filename = original_filename(&record.jsonl_path);
    match state
        .report_reader
        .raw_bytes(id, ArtifactKind::Report, Some(&state.runner_base_url), filename.as_deref())
        .await
    {
        Some(bytes) => ([(header::CONTENT_TYPE, "application/x-ndjson")], bytes).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("no report for scan {id}")),
    }
}

/// Rebuilds the workflow graph post-hoc from the scan's report entries
/// (spec §4.7) and caches it; a live-built graph from the SSE consumer
/// would also populate the same cache key.
async fn rebuild_workflow(state: &AppState, record: &ScanRecord) -> Option<vg_wire::WorkflowGraph> {
    if let Some(graph) = state.workflow_graphs.get(record.scan_id) {
        return Some(graph);
    }
    let entries = load_entries(state, record).await?;
    let mut builder = GraphBuilder::new();
    for entry in &entries {
        builder.apply_entry(&record.config.target_name, entry);
    }
    let graph = builder.finish();
    state.workflow_graphs.set(record.scan_id, graph.clone());
    Some(graph)
}

async fn scan_workflow(State(state): State<AppState>, AxumPath(id): AxumPath<ScanId>) -> impl IntoResponse {
    let Some(record) = load_record(&state, id).await else {
        return not_found(id);
    };
    match rebuild_workflow(&state, &record).await {
        Some(graph) => Json(graph).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("no report entries for scan {id}")),
    }
}

async fn scan_workflow_mermaid(State(state): State<AppState>, AxumPath(id): AxumPath<ScanId>) -> impl IntoResponse {
    let Some(record) = load_record(&state, id).await else {
        return not_found(id);
    };
    match rebuild_workflow(&state, &record).await {
        Some(graph) => ([(header::CONTENT_TYPE, "text/plain")], workflow::to_mermaid(&graph)).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("no report entries for scan {id}")),
    }
}

async fn scan_workflow_clear(State(state): State<AppState>, AxumPath(id): AxumPath<ScanId>) -> impl IntoResponse {
    state.workflow_graphs.clear(id);
    StatusCode::OK
}

/// `DELETE /scan/{id}/cancel` (spec §6): idempotent cancel. Transitions
/// the in-memory record to `cancelled` directly rather than waiting on
/// the SSE consumer's defensive promotion, since an explicit cancel wins
/// races toward `cancelled` (spec §5).
async fn scan_cancel(State(state): State<AppState>, AxumPath(id): AxumPath<ScanId>) -> impl IntoResponse {
    let Some(handle) = state.registry.get(id) else {
        return not_found(id);
    };
    let now = SystemClock.epoch_ms();
    let transitioned = {
        let mut record = handle.lock();
        if record.status.is_terminal() {
            false
        } else {
            record.transition_to(ScanStatus::Cancelled, now)
        }
    };
    if !transitioned {
        return error_response(StatusCode::BAD_REQUEST, "scan already terminal");
    }
    let snapshot = handle.lock().clone();
    let _ = state.registry.store().upsert(&snapshot).await;

    let url = format!("{}/scans/{}", state.runner_base_url, id);
    if let Err(err) = state.http.delete(&url).send().await {
        tracing::warn!(scan_id = %id, error = %err, "forwarding cancel to runner failed");
    }

    Json(ScanSnapshot::from(&snapshot)).into_response()
}

/// `DELETE /scan/{id}` (spec §6, §8): cancels if active, removes the row,
/// the in-memory entry, and every blob under `{scan_id}/`.
async fn scan_delete(State(state): State<AppState>, AxumPath(id): AxumPath<ScanId>) -> impl IntoResponse {
    if let Some(handle) = state.registry.get(id) {
        let now = SystemClock.epoch_ms();
        let should_forward = {
            let mut record = handle.lock();
            let was_active = !record.status.is_terminal();
            if was_active {
                record.transition_to(ScanStatus::Cancelled, now);
            }
            was_active
        };
        if should_forward {
            let url = format!("{}/scans/{}", state.runner_base_url, id);
            if let Err(err) = state.http.delete(&url).send().await {
                tracing::warn!(scan_id = %id, error = %err, "forwarding cancel to runner failed");
            }
        }
        state.registry.forget(id);
    }
    let _ = state.registry.store().delete(id).await;
    let _ = state.blob_store.delete_prefix(&format!("{id}/")).await;
    state.workflow_graphs.clear(id);
    StatusCode::OK
}

async fn scan_progress_ws(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<ScanId>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws::run(socket, state.registry, id))
}

/// `GET /plugins/{kind}` pass-through (spec §4.1 "listPlugins"); the
/// Controller has no plugin knowledge of its own, it just forwards to the
/// Runner that owns the `ENGINE` binary.
async fn list_plugins(State(state): State<AppState>, AxumPath(kind): AxumPath<String>) -> impl IntoResponse {
    let url = format!("{}/plugins/{}", state.runner_base_url, kind);
    match state.http.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => match resp.json::<PluginListing>().await {
            Ok(listing) => Json(listing).into_response(),
            Err(err) => error_response(StatusCode::BAD_GATEWAY, err.to_string()),
        },
        Ok(resp) => error_response(StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY), "runner rejected plugin listing"),
        Err(err) => error_response(StatusCode::BAD_GATEWAY, err.to_string()),
    }
}

async fn version(State(state): State<AppState>) -> impl IntoResponse {
    let url = format!("{}/version", state.runner_base_url);
    match state.http.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => match resp.json::<VersionInfo>().await {
            Ok(info) => Json(info).into_response(),
            Err(err) => error_response(StatusCode::BAD_GATEWAY, err.to_string()),
        },
        Ok(resp) => error_response(StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY), "runner rejected version request"),
        Err(err) => error_response(StatusCode::BAD_GATEWAY, err.to_string()),
    }
}

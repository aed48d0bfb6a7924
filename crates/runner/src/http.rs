// SPDX-License-Identifier: MIT

//! Runner HTTP/SSE surface (spec §4.3).

use crate::manager::{ManagerError, RunnerScanState, ScanManager};
use axum::extract::{Path as AxumPath, State};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::http::StatusCode;
use axum::{Json, Router};
use futures_util::stream::Stream;
use std::sync::Arc;
use std::time::Duration;
use vg_core::{Clock, ScanId, SystemClock};
use vg_wire::{PluginListing, ScanSnapshot, StartScanRequest, StartScanResponse, VersionInfo};

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ScanManager<SystemClock>>,
    pub engine_bin: String,
    pub reports_dir: std::path::PathBuf,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/scans", post(start_scan).get(list_scans))
        .route("/scans/:id/progress", get(progress_sse))
        .route("/scans/:id/status", get(scan_status))
        .route("/scans/:id", delete(cancel_scan))
        .route("/plugins/:kind", get(list_plugins))
        .route("/reports/:filename", get(get_report))
        .route("/health", get(health))
        .route("/version", get(version))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

fn to_snapshot(scan_id: ScanId, config: vg_core::ScanConfig, state: RunnerScanState) -> ScanSnapshot {
    ScanSnapshot {
        scan_id,
        status: state.status,
        progress: state.progress,
        current_probe: state.current_probe,
        completed_probes: state.completed_probes,
        total_probes: state.total_probes,
        current_iteration: 0,
        total_iterations: 0,
        passed: state.passed,
        failed: state.failed,
        elapsed_ms: state
            .started_at_ms
            .map(|start| SystemClock.epoch_ms().saturating_sub(start)),
        estimated_remaining_ms: None,
        error_message: state.error_message,
        target_type: config.target_type,
        target_name: config.target_name,
        created_at_ms: state.created_at_ms,
        started_at_ms: state.started_at_ms,
        completed_at_ms: state.completed_at_ms,
    }
}

async fn start_scan(
    State(state): State<AppState>,
    Json(req): Json<StartScanRequest>,
) -> impl IntoResponse {
    if let Err(e) = req.config.validate() {
        return (StatusCode::BAD_REQUEST, Json(StartScanResponse {
            scan_id: req.scan_id,
            status: vg_core::ScanStatus::Failed,
            message: e.to_string(),
        }))
            .into_response();
    }
    match state.manager.start(req.scan_id, req.config) {
        Ok(initial) => (
            StatusCode::OK,
            Json(StartScanResponse {
                scan_id: req.scan_id,
                status: initial.status,
                message: "scan started".to_string(),
            }),
        )
            .into_response(),
        Err(ManagerError::EngineUnavailable(bin)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(vg_wire::ErrorBody {
                detail: format!("ENGINE binary unavailable: {bin}"),
            }),
        )
            .into_response(),
        Err(ManagerError::AlreadyActive(id)) => (
            StatusCode::BAD_REQUEST,
            Json(vg_wire::ErrorBody {
                detail: format!("scan {id} already active"),
            }),
        )
            .into_response(),
        Err(other) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(vg_wire::ErrorBody { detail: other.to_string() }),
        )
            .into_response(),
    }
}

async fn scan_status(State(state): State<AppState>, AxumPath(id): AxumPath<ScanId>) -> impl IntoResponse {
    match state.manager.snapshot(id) {
        Some((config, scan_state)) => Json(to_snapshot(id, config, scan_state)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(vg_wire::ErrorBody { detail: format!("scan {id} not found") }),
        )
            .into_response(),
    }
}

async fn list_scans(State(state): State<AppState>) -> impl IntoResponse {
    let ids: Vec<ScanId> = state.manager.list_scan_ids();
    Json(ids)
}

async fn cancel_scan(State(state): State<AppState>, AxumPath(id): AxumPath<ScanId>) -> impl IntoResponse {
    match state.manager.cancel(id).await {
        Ok(true) => StatusCode::OK.into_response(),
        Ok(false) => (
            StatusCode::BAD_REQUEST,
            Json(vg_wire::ErrorBody { detail: format!("scan {id} already terminal") }),
        )
            .into_response(),
        Err(ManagerError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(vg_wire::ErrorBody { detail: format!("scan {id} not found") }),
        )
            .into_response(),
        Err(other) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(vg_wire::ErrorBody { detail: other.to_string() }),
        )
            .into_response(),
    }
}

async fn progress_sse(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<ScanId>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, std::convert::Infallible>>>, StatusCode> {
    let mut rx = state
        .manager
        .take_progress_stream(id)
        .await
        .map_err(|e| match e {
            ManagerError::NotFound(_) => StatusCode::NOT_FOUND,
            ManagerError::ConsumerTaken(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        })?;

    let stream = async_stream::stream! {
        while let Some(slot) = rx.recv().await {
            let Some(event) = slot else { break };
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(SseEvent::default().event(event.kind()).data(data));
        }
    };

    Ok(Sse::new(stream).keep_alive(axum::response::sse::KeepAlive::default()))
}

/// `GET /plugins/{kind}` (spec §4.1 "listPlugins", §4.3). `kind` is passed
/// straight through to `ENGINE --list_{kind}` with a bounded timeout.
async fn list_plugins(State(state): State<AppState>, AxumPath(kind): AxumPath<String>) -> impl IntoResponse {
    if !matches!(kind.as_str(), "probes" | "detectors" | "generators" | "buffs") {
        return (
            StatusCode::BAD_REQUEST,
            Json(vg_wire::ErrorBody { detail: format!("unknown plugin kind {kind}") }),
        )
            .into_response();
    }
    let arg = format!("--list_{kind}");
    match run_bounded(&state.engine_bin, &[arg], Duration::from_secs(30)).await {
        Ok(stdout) => Json(PluginListing {
            kind,
            names: stdout.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect(),
        })
        .into_response(),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(vg_wire::ErrorBody { detail: err }),
        )
            .into_response(),
    }
}

async fn version(State(state): State<AppState>) -> impl IntoResponse {
    match run_bounded(&state.engine_bin, &["--version".to_string()], Duration::from_secs(5)).await {
        Ok(stdout) => Json(VersionInfo { version: stdout.trim().to_string() }).into_response(),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(vg_wire::ErrorBody { detail: err }),
        )
            .into_response(),
    }
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// `GET /reports/{filename}`: rejects path traversal (spec §4.3).
async fn get_report(State(state): State<AppState>, AxumPath(filename): AxumPath<String>) -> impl IntoResponse {
    if filename.contains("..") || filename.contains('/') {
        return (StatusCode::BAD_REQUEST, "invalid filename").into_response();
    }
    let path = state.reports_dir.join(&filename);
    match tokio::fs::read(&path).await {
        Ok(bytes) => bytes.into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

async fn run_bounded(bin: &str, args: &[String], timeout: Duration) -> Result<String, String> {
    let fut = tokio::process::Command::new(bin).args(args).output();
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(output)) if output.status.success() => {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        Ok(Ok(output)) => Err(format!(
            "{bin} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )),
        Ok(Err(err)) => Err(err.to_string()),
        Err(_) => Err(format!("{bin} timed out after {timeout:?}")),
    }
}

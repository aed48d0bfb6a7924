// SPDX-License-Identifier: MIT

//! Scan Manager (spec §4.1): spawns/supervises one `ENGINE` child per
//! scan, owns its event queue, detects terminal conditions, uploads
//! artifacts. Mirrors `active_scans`-style process-local singleton state
//! the way the teacher isolates its daemon state behind an accessor module
//! (spec §9 "Global mutable state").

use crate::process::ChildProcess;
use crate::{argv, upload};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use vg_core::{Clock, ProgressEvent, RecentOutput, ScanConfig, ScanId, ScanStatus};
use vg_storage::BlobStore;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("ENGINE binary {0} not found")]
    EngineUnavailable(String),
    #[error("scan {0} is already active")]
    AlreadyActive(ScanId),
    #[error("scan {0} not found")]
    NotFound(ScanId),
    #[error("scan {0} already has an active progress consumer")]
    ConsumerTaken(ScanId),
}

/// In-process snapshot the Runner's own HTTP surface answers `status`
/// queries from. Distinct from `vg_core::ScanRecord`, which is the
/// Controller's canonical, persisted record.
#[derive(Debug, Clone)]
pub struct RunnerScanState {
    pub status: ScanStatus,
    pub progress: u8,
    pub current_probe: Option<String>,
    pub completed_probes: u32,
    pub total_probes: u32,
    pub passed: u32,
    pub failed: u32,
    pub error_message: Option<String>,
    pub created_at_ms: u64,
    pub started_at_ms: Option<u64>,
    pub completed_at_ms: Option<u64>,
    pub recent_output: RecentOutput,
    pub jsonl_key: Option<String>,
    pub html_key: Option<String>,
}

impl RunnerScanState {
    fn new(created_at_ms: u64) -> Self {
        Self {
            status: ScanStatus::Pending,
            progress: 0,
            current_probe: None,
            completed_probes: 0,
            total_probes: 0,
            passed: 0,
            failed: 0,
            error_message: None,
            created_at_ms,
            started_at_ms: None,
            completed_at_ms: None,
            recent_output: RecentOutput::default(),
            jsonl_key: None,
            html_key: None,
        }
    }
}

struct ActiveScan {
    config: ScanConfig,
    state: Mutex<RunnerScanState>,
    receiver: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<Option<ProgressEvent>>>>,
    child: tokio::sync::Mutex<Option<ChildProcess>>,
}

pub struct ScanManager<C: Clock> {
    engine_bin: String,
    reports_dir: std::path::PathBuf,
    generator_host_override: Option<String>,
    blob_store: BlobStore,
    clock: C,
    active: Mutex<HashMap<ScanId, Arc<ActiveScan>>>,
}

impl<C: Clock + Clone + Send + Sync + 'static> ScanManager<C> {
    pub fn new(
        engine_bin: String,
        reports_dir: std::path::PathBuf,
        generator_host_override: Option<String>,
        blob_store: BlobStore,
        clock: C,
    ) -> Self {
        Self {
            engine_bin,
            reports_dir,
            generator_host_override,
            blob_store,
            clock,
            active: Mutex::new(HashMap::new()),
        }
    }

    fn engine_present(&self) -> bool {
        which(&self.engine_bin).is_some()
    }

    /// *start(scan_id, config) -> state* (spec §4.1). Never blocks on
    /// child termination.
    pub fn start(&self, scan_id: ScanId, config: ScanConfig) -> Result<RunnerScanState, ManagerError> {
        if self.active.lock().contains_key(&scan_id) {
            return Err(ManagerError::AlreadyActive(scan_id));
        }
        if !self.engine_present() {
            return Err(ManagerError::EngineUnavailable(self.engine_bin.clone()));
        }

        let args = argv::build(&config, self.generator_host_override.as_deref());
        let now = self.clock.epoch_ms();
        let mut child = ChildProcess::spawn(&self.engine_bin, &args, &[])
            .map_err(|e| ManagerError::EngineUnavailable(e.to_string()))?;
        let lines = child.take_line_stream();

        let state = RunnerScanState::new(now);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let active = Arc::new(ActiveScan {
            config: config.clone(),
            state: Mutex::new(state.clone()),
            receiver: tokio::sync::Mutex::new(Some(event_rx)),
            child: tokio::sync::Mutex::new(Some(child)),
        });
        self.active.lock().insert(scan_id, active.clone());

        tokio::spawn(run_reader(
            scan_id,
            active,
            lines,
            event_tx,
            self.blob_store.clone(),
            self.reports_dir.clone(),
            self.clock.clone(),
        ));

        Ok(state)
    }

    pub fn status(&self, scan_id: ScanId) -> Option<RunnerScanState> {
        let active = self.active.lock().get(&scan_id)?.clone();
        Some(active.state.lock().clone())
    }

    /// `(config, state)` pair; HTTP handlers compose these into the wire
    /// `ScanSnapshot` shape alongside `target_type`/`target_name`.
    pub fn snapshot(&self, scan_id: ScanId) -> Option<(ScanConfig, RunnerScanState)> {
        let active = self.active.lock().get(&scan_id)?.clone();
        Some((active.config.clone(), active.state.lock().clone()))
    }

    pub fn list_scan_ids(&self) -> Vec<ScanId> {
        self.active.lock().keys().copied().collect()
    }

    /// Take ownership of the per-scan event receiver; spec §4.1 "at most
    /// one active consumer at a time". A second caller is denied rather
    /// than tee'd.
    pub async fn take_progress_stream(
        &self,
        scan_id: ScanId,
    ) -> Result<mpsc::UnboundedReceiver<Option<ProgressEvent>>, ManagerError> {
        let active = self
            .active
            .lock()
            .get(&scan_id)
            .cloned()
            .ok_or(ManagerError::NotFound(scan_id))?;
        active
            .receiver
            .lock()
            .await
            .take()
            .ok_or(ManagerError::ConsumerTaken(scan_id))
    }

    /// *cancel(scan_id) -> bool*, idempotent (spec §4.1).
    pub async fn cancel(&self, scan_id: ScanId) -> Result<bool, ManagerError> {
        let active = self
            .active
            .lock()
            .get(&scan_id)
            .cloned()
            .ok_or(ManagerError::NotFound(scan_id))?;

        let mut already_terminal = false;
        {
            let mut state = active.state.lock();
            if state.status.is_terminal() {
                already_terminal = true;
            } else {
                state.status = ScanStatus::Cancelled;
                state.completed_at_ms.get_or_insert(self.clock.epoch_ms());
            }
        }
        if already_terminal {
            return Ok(false);
        }

        let mut guard = active.child.lock().await;
        if let Some(child) = guard.as_mut() {
            child.cancel().await;
        }
        Ok(true)
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_reader<C: Clock>(
    scan_id: ScanId,
    active: Arc<ActiveScan>,
    mut lines: mpsc::UnboundedReceiver<String>,
    event_tx: mpsc::UnboundedSender<Option<ProgressEvent>>,
    blob_store: BlobStore,
    reports_dir: std::path::PathBuf,
    clock: C,
) {
    let mut parser = vg_parser::Parser::new();
    let mut jsonl_path: Option<String> = None;
    let mut html_path: Option<String> = None;
    let mut saw_error = false;

    {
        let mut state = active.state.lock();
        state.status = ScanStatus::Running;
        state.started_at_ms.get_or_insert(clock.epoch_ms());
    }

    while let Some(line) = lines.recv().await {
        let event = parser.feed_line(&line);
        {
            let mut state = active.state.lock();
            state.recent_output.push(line.clone());
            apply_event(&mut state, &event, &mut jsonl_path, &mut html_path);
            if matches!(event, ProgressEvent::Error { .. }) {
                saw_error = true;
            }
        }
        let _ = event_tx.send(Some(event));
    }

    let exit_status = {
        let mut guard = active.child.lock().await;
        match guard.as_mut() {
            Some(child) => child.wait().await.ok(),
            None => None,
        }
    };

    let (terminal_event, final_status) = {
        let state = active.state.lock();
        if saw_error || state.status == ScanStatus::Failed {
            (None, ScanStatus::Failed)
        } else {
            match exit_status {
                Some(status) if status.success() => (None, ScanStatus::Completed),
                Some(status) => {
                    let tail = state.recent_output.last_n(20).join("\n");
                    let code = status.code().unwrap_or(-1);
                    (
                        Some(ProgressEvent::Error {
                            message: format!("ENGINE exited with code {code}:\n{tail}"),
                            raw_line: String::new(),
                        }),
                        ScanStatus::Failed,
                    )
                }
                None => (None, ScanStatus::Failed),
            }
        }
    };

    if let Some(event) = terminal_event {
        {
            let mut state = active.state.lock();
            state.error_message = match &event {
                ProgressEvent::Error { message, .. } => Some(message.clone()),
                _ => state.error_message.clone(),
            };
        }
        let _ = event_tx.send(Some(event));
    }

    if final_status != ScanStatus::Cancelled {
        let mut state = active.state.lock();
        if !state.status.is_terminal() {
            state.status = final_status;
            state.completed_at_ms.get_or_insert(clock.epoch_ms());
        }
        if final_status == ScanStatus::Completed {
            state.progress = 100;
        }
    }

    let keys = upload::upload_artifacts(
        &blob_store,
        &reports_dir,
        scan_id,
        jsonl_path.as_deref(),
        html_path.as_deref(),
    )
    .await;

    {
        let mut state = active.state.lock();
        state.jsonl_key = keys.get("jsonl").cloned();
        state.html_key = keys.get("html").cloned();
        if state.status == ScanStatus::Completed {
            let _ = event_tx.send(Some(ProgressEvent::Complete {
                passed: state.passed,
                failed: state.failed,
                report_keys: keys.clone().into_iter().collect(),
            }));
        }
    }

    // End-of-stream sentinel (spec §4.1 "the queue is thus finite and closeable").
    let _ = event_tx.send(None);
}

fn apply_event(
    state: &mut RunnerScanState,
    event: &ProgressEvent,
    jsonl_path: &mut Option<String>,
    html_path: &mut Option<String>,
) {
    match event {
        ProgressEvent::Progress {
            probe,
            percent,
            current,
            total,
            ..
        } => {
            if probe.is_some() {
                state.current_probe = probe.clone();
            }
            state.progress = *percent;
            if let (Some(c), Some(t)) = (current, total) {
                state.completed_probes = *c;
                state.total_probes = *t;
            }
        }
        ProgressEvent::ProbeCount { completed, total, .. } => {
            state.completed_probes = *completed;
            state.total_probes = *total;
        }
        ProgressEvent::CurrentProbe { probe, .. } => {
            state.current_probe = Some(probe.clone());
        }
        ProgressEvent::Result {
            total_passed,
            total_failed,
            ..
        } => {
            state.passed = *total_passed;
            state.failed = *total_failed;
        }
        ProgressEvent::Report { report_type, path, .. } => match report_type {
            vg_core::ReportType::Jsonl => *jsonl_path = Some(path.clone()),
            vg_core::ReportType::Html => *html_path = Some(path.clone()),
        },
        ProgressEvent::Error { message, .. } => {
            state.status = ScanStatus::Failed;
            state.error_message = Some(message.clone());
        }
        ProgressEvent::Status { .. } | ProgressEvent::Output { .. } | ProgressEvent::Complete { .. } => {}
    }
}

/// Minimal `$PATH` lookup; avoids pulling in a crate just for a
/// pre-flight existence check (spec §4.1 "ENGINE installed").
fn which(bin: &str) -> Option<std::path::PathBuf> {
    if bin.contains('/') {
        return std::path::Path::new(bin).exists().then(|| bin.into());
    }
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(bin))
            .find(|candidate| candidate.is_file())
    })
}

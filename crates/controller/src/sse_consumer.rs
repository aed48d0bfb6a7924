// SPDX-License-Identifier: MIT

//! SSE consumer (spec §4.4): reads the Runner's `GET /scans/{id}/progress`
//! stream, updates the in-memory `ScanRecord`, persists on every
//! terminal-affecting event, and defensively promotes status if the
//! stream closes early.

use futures_util::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use vg_core::{Clock, ProgressEvent, ScanId, ScanRecord, ScanStatus, SystemClock};
use vg_storage::Store;

const RETRY_ATTEMPTS: u32 = 3;

pub async fn run(
    http: reqwest::Client,
    engine_service_url: String,
    scan_id: ScanId,
    record: Arc<Mutex<ScanRecord>>,
    store: Arc<Store>,
) {
    let url = format!("{}/scans/{}/progress", engine_service_url, scan_id);

    let mut connected = false;
    for attempt in 1..=RETRY_ATTEMPTS {
        match http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                connected = true;
                consume_stream(resp, &record, &store).await;
                break;
            }
            Ok(resp) => {
                tracing::warn!(scan_id = %scan_id, attempt, status = %resp.status(), "SSE connect non-2xx");
            }
            Err(err) => {
                tracing::warn!(scan_id = %scan_id, attempt, error = %err, "SSE connect failed");
            }
        }
        tokio::time::sleep(Duration::from_secs(2 * attempt as u64)).await;
    }

    if !connected {
        let now = SystemClock.epoch_ms();
        let mut r = record.lock();
        if r.transition_to(ScanStatus::Failed, now) {
            r.error_message.get_or_insert_with(|| "Runner unreachable".to_string());
        }
        let snapshot = r.clone();
        drop(r);
        let _ = store.upsert(&snapshot).await;
        return;
    }

    // Defensive promotion: the stream ended but status never reached a
    // terminal state (spec §4.4 "promotes status to completed...").
    let now = SystemClock.epoch_ms();
    let mut r = record.lock();
    if !r.status.is_terminal() {
        r.progress = 100;
        r.transition_to(ScanStatus::Completed, now);
        let snapshot = r.clone();
        drop(r);
        let _ = store.upsert(&snapshot).await;
    }
}

async fn consume_stream(resp: reqwest::Response, record: &Arc<Mutex<ScanRecord>>, store: &Arc<Store>) {
    let mut buf = String::new();
    let mut bytes_stream = resp.bytes_stream();

    while let Some(chunk) = bytes_stream.next().await {
        let Ok(chunk) = chunk else { break };
        buf.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(frame_end) = buf.find("\n\n") {
            let frame = buf[..frame_end].to_string();
            buf.drain(..frame_end + 2);
            if let Some(event) = parse_frame(&frame) {
                let terminal_affecting = matches!(
                    event,
                    ProgressEvent::Report { .. } | ProgressEvent::Complete { .. } | ProgressEvent::Error { .. }
                );
                let should_persist = apply_event(record, &event) || terminal_affecting;
                if should_persist {
                    let snapshot = record.lock().clone();
                    let _ = store.upsert(&snapshot).await;
                }
            }
        }
    }
}

fn parse_frame(frame: &str) -> Option<ProgressEvent> {
    let data_line = frame.lines().find(|l| l.starts_with("data:"))?;
    let data = data_line.trim_start_matches("data:").trim();
    serde_json::from_str(data).ok()
}

/// Applies `event` to `record`; returns whether the event is terminal
/// for status-transition purposes (i.e. `status=cancelled` via error, or
/// an explicit `complete`/`error`).
fn apply_event(record: &Arc<Mutex<ScanRecord>>, event: &ProgressEvent) -> bool {
    let now = SystemClock.epoch_ms();
    let mut r = record.lock();
    match event {
        ProgressEvent::Status { .. } => false,
        ProgressEvent::Progress { probe, percent, current, total, .. } => {
            if probe.is_some() {
                r.current_probe = probe.clone();
            }
            r.progress = *percent;
            if let (Some(c), Some(t)) = (current, total) {
                r.completed_probes = *c;
                r.total_probes = *t;
            }
            if r.status == ScanStatus::Pending {
                r.transition_to(ScanStatus::Running, now);
            }
            false
        }
        ProgressEvent::ProbeCount { completed, total, .. } => {
            r.completed_probes = *completed;
            r.total_probes = *total;
            false
        }
        ProgressEvent::CurrentProbe { probe, .. } => {
            r.current_probe = Some(probe.clone());
            false
        }
        ProgressEvent::Result { total_passed, total_failed, .. } => {
            r.passed = *total_passed;
            r.failed = *total_failed;
            false
        }
        ProgressEvent::Report { report_type, path, .. } => {
            match report_type {
                vg_core::ReportType::Jsonl => r.jsonl_path = Some(path.clone()),
                vg_core::ReportType::Html => r.html_path = Some(path.clone()),
            }
            true
        }
        ProgressEvent::Complete { passed, failed, report_keys } => {
            r.passed = *passed;
            r.failed = *failed;
            r.jsonl_key = report_keys.get("jsonl").cloned();
            r.html_key = report_keys.get("html").cloned();
            r.progress = 100;
            r.transition_to(ScanStatus::Completed, now);
            true
        }
        ProgressEvent::Error { message, .. } => {
            r.error_message = Some(message.clone());
            r.transition_to(ScanStatus::Failed, now);
            true
        }
        ProgressEvent::Output { line, .. } => {
            r.recent_output.push(line.clone());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sse_frame() {
        let frame = "event: progress\ndata: {\"event_type\":\"progress\",\"probe\":\"dan.Dan_11_0\",\"percent\":50,\"current\":null,\"total\":null,\"elapsed\":null,\"remaining\":null,\"raw_line\":\"probes.dan.Dan_11_0:  50%\"}";
        let event = parse_frame(frame).unwrap();
        assert!(matches!(event, ProgressEvent::Progress { .. }));
    }
}

// SPDX-License-Identifier: MIT

//! WebSocket fan-out (spec §4.4, §5): polls the in-memory `ScanRecord` at
//! >=1Hz and pushes snapshots until the scan reaches a terminal state,
//! then sends one final `Terminal` frame and closes.

use axum::extract::ws::{Message, WebSocket};
use std::sync::Arc;
use std::time::Duration;
use vg_wire::rest::ScanSnapshot;
use vg_wire::WsMessage;

use crate::registry::Registry;

const POLL_INTERVAL: Duration = Duration::from_millis(800);

pub async fn run(mut socket: WebSocket, registry: Arc<Registry>, scan_id: vg_core::ScanId) {
    let Some(handle) = registry.get(scan_id) else {
        let _ = socket.close().await;
        return;
    };

    let mut interval = tokio::time::interval(POLL_INTERVAL);
    loop {
        interval.tick().await;

        let (snapshot, terminal) = {
            let record = handle.lock();
            (ScanSnapshot::from(&*record), record.status.is_terminal())
        };

        let message = if terminal {
            WsMessage::Terminal(snapshot)
        } else {
            WsMessage::Snapshot(snapshot)
        };

        let Ok(payload) = serde_json::to_string(&message) else {
            break;
        };
        if socket.send(Message::Text(payload)).await.is_err() {
            break;
        }
        if terminal {
            break;
        }
    }
    let _ = socket.close().await;
}

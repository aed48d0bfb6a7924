// SPDX-License-Identifier: MIT

//! WebSocket fan-out message shape (spec §4.4).

use crate::rest::ScanSnapshot;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WsMessage {
    /// Periodic snapshot (>=1/s) of the in-memory record.
    Snapshot(ScanSnapshot),
    /// Final snapshot sent right before the socket closes.
    Terminal(ScanSnapshot),
}

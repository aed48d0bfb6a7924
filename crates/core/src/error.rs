// SPDX-License-Identifier: MIT

//! Error taxonomy (spec §7), shared by both the Runner and the Controller
//! so HTTP handlers on either side map to status codes the same way.

use thiserror::Error;

/// Stable taxonomy of control-plane failures. Each variant carries the
/// HTTP status it maps to (see [`ControlPlaneError::status_code`]) and a
/// `detail` string safe to return to a client.
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    /// Submit denied because `max_concurrent_scans` is already reached.
    #[error("capacity exceeded: {0}")]
    Capacity(String),

    /// Scan config failed schema/range validation, or argv construction failed.
    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    /// `ENGINE` is not installed / not reachable during the Runner's pre-flight check.
    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Unknown scan id, or a requested artifact does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Runner HTTP call returned non-2xx, or the SSE connection failed after retries.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// `DELETE` on a scan already in a terminal state.
    #[error("cancel disallowed: scan already terminal")]
    CancelDisallowed,

    /// Blob-store I/O failure; uploads are retried, reads surface as `NotFound`.
    #[error("storage transient error: {0}")]
    StorageTransient(String),

    /// The child `ENGINE` process exited with a non-zero code.
    #[error("engine exited with status {exit_code}: {tail}")]
    ChildExitedNonZero { exit_code: i32, tail: String },
}

impl ControlPlaneError {
    /// The HTTP status this error maps to at the handler boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            ControlPlaneError::Capacity(_) => 429,
            ControlPlaneError::ConfigInvalid(_) => 400,
            ControlPlaneError::EngineUnavailable(_) => 503,
            ControlPlaneError::NotFound(_) => 404,
            ControlPlaneError::Upstream(_) => 502,
            ControlPlaneError::CancelDisallowed => 400,
            ControlPlaneError::StorageTransient(_) => 404,
            ControlPlaneError::ChildExitedNonZero { .. } => 200, // recorded on the record, not an HTTP failure
        }
    }

    /// The stable `detail` string returned in `{detail}` response bodies.
    pub fn detail(&self) -> String {
        self.to_string()
    }
}

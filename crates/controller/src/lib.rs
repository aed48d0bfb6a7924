// SPDX-License-Identifier: MIT

//! vg-controller: the scan registry, Runner SSE consumer, WebSocket
//! fan-out, report access layer consumer, aggregate statistics, and the
//! workflow analyzer (spec §4.4, §4.6, §4.7). Exposes the `/api/v1/...`
//! read/write surface (spec §6).

pub mod config;
pub mod history;
pub mod http;
pub mod probe_knowledge;
pub mod registry;
pub mod report_access;
pub mod sse_consumer;
pub mod statistics;
pub mod workflow;
pub mod ws;

pub use config::Config;
pub use http::{router, AppState};
pub use registry::Registry;

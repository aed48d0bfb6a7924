// SPDX-License-Identifier: MIT

//! SSE frame encoding shared by the Runner (writer) and the Controller
//! (reader), spec §4.3 / §6: one event kind per frame,
//! `event: <kind>\ndata: <json>\n\n`.

use vg_core::ProgressEvent;

/// Render one [`ProgressEvent`] as a complete SSE frame.
pub fn encode_frame(event: &ProgressEvent) -> String {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    format!("event: {}\ndata: {}\n\n", event.kind(), data)
}

/// Parse one SSE frame's `data:` payload back into a [`ProgressEvent`].
/// Used by the Controller's SSE consumer (spec §4.4).
pub fn decode_data(data: &str) -> Result<ProgressEvent, serde_json::Error> {
    serde_json::from_str(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_frame_encoding() {
        let event = ProgressEvent::ProbeCount {
            completed: 1,
            total: 4,
            raw_line: "1  1/4  []".to_string(),
        };
        let frame = encode_frame(&event);
        assert!(frame.starts_with("event: probe_count\n"));
        assert!(frame.ends_with("\n\n"));
        let data_line = frame.lines().nth(1).unwrap().trim_start_matches("data: ");
        let decoded = decode_data(data_line).unwrap();
        assert!(matches!(decoded, ProgressEvent::ProbeCount { completed: 1, total: 4, .. }));
    }
}

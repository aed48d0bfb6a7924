// SPDX-License-Identifier: MIT

//! JSON-Lines report artifact types (spec §3 `ReportEntry`, `BlobKey`).

use serde::{Deserialize, Serialize};

/// One line of a `garak.{scan_id}.report.jsonl` artifact. `ENGINE` controls
/// the shape; we only interpret the fields this system cares about and
/// keep the rest as an opaque JSON object (spec §1 "never replay or
/// reinterpret ENGINE's reports").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    pub entry_type: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl ReportEntry {
    /// Parse one JSON-Lines line. Malformed lines are the caller's concern
    /// to discard (spec §4.5 "malformed lines are dropped, not fatal").
    pub fn parse_line(line: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(line)?;
        let mut obj = match value {
            serde_json::Value::Object(m) => m,
            other => {
                return Err(serde::de::Error::custom(format!(
                    "expected JSON object, got {other}"
                )))
            }
        };
        let entry_type = obj
            .remove("entry_type")
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();
        Ok(Self {
            entry_type,
            fields: obj,
        })
    }

    /// `attempt` entries carry `probe_classname` and `status`
    /// (2 == passed, 1 == failed) per spec §4.5.
    pub fn attempt_status(&self) -> Option<i64> {
        self.fields.get("status").and_then(|v| v.as_i64())
    }

    pub fn probe_classname(&self) -> Option<&str> {
        self.fields.get("probe_classname").and_then(|v| v.as_str())
    }

    /// `PASS`/`FAIL`/`unknown`, rendered for the per-attempt breakdown
    /// (spec §4.5 "probe_attempts... {uuid, seq, status, ...}").
    pub fn status_label(&self) -> &'static str {
        match self.attempt_status() {
            Some(2) => "PASS",
            Some(1) => "FAIL",
            _ => "unknown",
        }
    }

    pub fn uuid_field(&self) -> String {
        self.fields
            .get("uuid")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    pub fn seq(&self) -> u32 {
        self.fields.get("seq").and_then(|v| v.as_u64()).unwrap_or(0) as u32
    }

    /// "first turn's `content.text` or stringified content" (spec §4.5).
    pub fn prompt_text(&self) -> String {
        match self.fields.get("prompt") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(value @ serde_json::Value::Object(_)) => {
                first_turn_text(value).unwrap_or_else(|| value.to_string())
            }
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }

    pub fn output_texts(&self) -> Vec<String> {
        match self.fields.get("outputs") {
            Some(serde_json::Value::Array(items)) => items.iter().map(turn_text).collect(),
            _ => Vec::new(),
        }
    }

    pub fn triggers(&self) -> Vec<String> {
        self.fields
            .get("triggers")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().filter_map(|t| t.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    }

    pub fn detector_results(&self) -> serde_json::Value {
        self.fields
            .get("detector_results")
            .cloned()
            .unwrap_or(serde_json::Value::Null)
    }

    pub fn goal(&self) -> Option<String> {
        self.fields.get("goal").and_then(|v| v.as_str()).map(str::to_string)
    }
}

fn first_turn_text(prompt: &serde_json::Value) -> Option<String> {
    prompt
        .get("turns")?
        .as_array()?
        .first()?
        .get("content")?
        .get("text")?
        .as_str()
        .map(str::to_string)
}

fn turn_text(turn: &serde_json::Value) -> String {
    match turn {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(_) => turn
            .get("text")
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| turn.to_string()),
        other => other.to_string(),
    }
}

/// Storage handle for one uploaded artifact (spec §3 `BlobKey`, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Report,
    Hitlog,
    ReportHtml,
}

impl ArtifactKind {
    fn suffix(&self) -> &'static str {
        match self {
            ArtifactKind::Report => "report.jsonl",
            ArtifactKind::Hitlog => "hitlog.jsonl",
            ArtifactKind::ReportHtml => "report.html",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ArtifactKind::Report | ArtifactKind::Hitlog => "application/x-ndjson",
            ArtifactKind::ReportHtml => "text/html",
        }
    }
}

/// Build the blob key `{scan_id}/garak.{scan_id}.<suffix>` (spec §4.5, §6).
pub fn artifact_key(scan_id: &crate::id::ScanId, kind: ArtifactKind) -> String {
    format!("{scan_id}/garak.{scan_id}.{}", kind.suffix())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_attempt_line() {
        let line = r#"{"entry_type":"attempt","probe_classname":"dan.Dan_11_0","status":2}"#;
        let entry = ReportEntry::parse_line(line).unwrap();
        assert_eq!(entry.entry_type, "attempt");
        assert_eq!(entry.attempt_status(), Some(2));
        assert_eq!(entry.probe_classname(), Some("dan.Dan_11_0"));
    }

    #[test]
    fn rejects_malformed_line() {
        assert!(ReportEntry::parse_line("not json").is_err());
    }

    #[test]
    fn builds_expected_key() {
        let id = crate::id::ScanId::new();
        let key = artifact_key(&id, ArtifactKind::Report);
        assert_eq!(key, format!("{id}/garak.{id}.report.jsonl"));
    }

    #[test]
    fn extracts_first_turn_prompt_text() {
        let line = r#"{"entry_type":"attempt","prompt":{"turns":[{"role":"user","content":{"text":"hello"}}]}}"#;
        let entry = ReportEntry::parse_line(line).unwrap();
        assert_eq!(entry.prompt_text(), "hello");
    }

    #[test]
    fn falls_back_to_stringified_prompt_when_no_turns() {
        let line = r#"{"entry_type":"attempt","prompt":"raw prompt"}"#;
        let entry = ReportEntry::parse_line(line).unwrap();
        assert_eq!(entry.prompt_text(), "raw prompt");
    }

    #[test]
    fn collects_output_texts_from_mixed_turn_shapes() {
        let line = r#"{"entry_type":"attempt","outputs":["plain", {"text":"nested"}]}"#;
        let entry = ReportEntry::parse_line(line).unwrap();
        assert_eq!(entry.output_texts(), vec!["plain".to_string(), "nested".to_string()]);
    }

    #[test]
    fn status_label_maps_numeric_status() {
        let pass = ReportEntry::parse_line(r#"{"entry_type":"attempt","status":2}"#).unwrap();
        let fail = ReportEntry::parse_line(r#"{"entry_type":"attempt","status":1}"#).unwrap();
        let unknown = ReportEntry::parse_line(r#"{"entry_type":"attempt"}"#).unwrap();
        assert_eq!(pass.status_label(), "PASS");
        assert_eq!(fail.status_label(), "FAIL");
        assert_eq!(unknown.status_label(), "unknown");
    }
}

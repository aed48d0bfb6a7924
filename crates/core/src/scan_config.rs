// SPDX-License-Identifier: MIT

//! Immutable scan request spec (spec §3, `ScanConfig`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Immutable request spec for one scan. Validated once at submit time and
/// never mutated afterward; `vg-runner`'s argv builder consumes it by
/// reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    pub target_type: String,
    pub target_name: String,
    pub probes: Vec<String>,
    #[serde(default)]
    pub detectors: Vec<String>,
    #[serde(default)]
    pub buffs: Vec<String>,
    /// 1..=500
    pub generations: u32,
    /// 0.0..=1.0
    pub eval_threshold: f64,
    pub seed: Option<u64>,
    pub parallel_requests: Option<u32>,
    pub parallel_attempts: Option<u32>,
    #[serde(default)]
    pub generator_options: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub probe_options: HashMap<String, serde_json::Value>,
    pub probe_tags: Option<Vec<String>>,
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub deprefix: bool,
    #[serde(default)]
    pub extended_detectors: bool,
    #[serde(default)]
    pub skip_unknown: bool,
    #[serde(default)]
    pub continue_on_error: bool,
    /// 0..=3
    #[serde(default)]
    pub verbose: u8,
    /// 1..=3600 seconds
    pub timeout_per_probe: Option<u32>,
    /// 0.0..=1.0
    pub report_threshold: Option<f64>,
    /// 0.0..=1.0
    pub hit_rate: Option<f64>,
    #[serde(default)]
    pub collect_timing: bool,
    pub exclude_probes: Option<Vec<String>>,
    pub exclude_detectors: Option<Vec<String>>,
    pub output_dir: Option<String>,
    #[serde(default)]
    pub no_report: bool,
    pub config_file: Option<String>,
}

/// Errors raised by [`ScanConfig::validate`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScanConfigError {
    #[error("target_type must not be empty")]
    MissingTargetType,
    #[error("target_name must not be empty")]
    MissingTargetName,
    #[error("probes must not be empty")]
    MissingProbes,
    #[error("generations must be in 1..=500, got {0}")]
    GenerationsOutOfRange(u32),
    #[error("eval_threshold must be in 0.0..=1.0, got {0}")]
    EvalThresholdOutOfRange(f64),
    #[error("verbose must be in 0..=3, got {0}")]
    VerboseOutOfRange(u8),
    #[error("timeout_per_probe must be in 1..=3600, got {0}")]
    TimeoutOutOfRange(u32),
    #[error("report_threshold must be in 0.0..=1.0, got {0}")]
    ReportThresholdOutOfRange(f64),
    #[error("hit_rate must be in 0.0..=1.0, got {0}")]
    HitRateOutOfRange(f64),
}

impl ScanConfig {
    /// Range/schema validation (`CONFIG_INVALID`, spec §7). The HTTP body
    /// shape itself is validated upstream of this crate (out of scope,
    /// spec §1); this is the domain-level range checking.
    pub fn validate(&self) -> Result<(), ScanConfigError> {
        if self.target_type.trim().is_empty() {
            return Err(ScanConfigError::MissingTargetType);
        }
        if self.target_name.trim().is_empty() {
            return Err(ScanConfigError::MissingTargetName);
        }
        if self.probes.is_empty() {
            return Err(ScanConfigError::MissingProbes);
        }
        if !(1..=500).contains(&self.generations) {
            return Err(ScanConfigError::GenerationsOutOfRange(self.generations));
        }
        if !(0.0..=1.0).contains(&self.eval_threshold) {
            return Err(ScanConfigError::EvalThresholdOutOfRange(self.eval_threshold));
        }
        if self.verbose > 3 {
            return Err(ScanConfigError::VerboseOutOfRange(self.verbose));
        }
        if let Some(t) = self.timeout_per_probe {
            if !(1..=3600).contains(&t) {
                return Err(ScanConfigError::TimeoutOutOfRange(t));
            }
        }
        if let Some(r) = self.report_threshold {
            if !(0.0..=1.0).contains(&r) {
                return Err(ScanConfigError::ReportThresholdOutOfRange(r));
            }
        }
        if let Some(h) = self.hit_rate {
            if !(0.0..=1.0).contains(&h) {
                return Err(ScanConfigError::HitRateOutOfRange(h));
            }
        }
        Ok(())
    }
}

/// Minimal builders shared across this crate's and downstream crates' tests.
#[cfg(any(test, feature = "test-support"))]
pub mod tests_support {
    use super::*;

    pub fn minimal() -> ScanConfig {
        ScanConfig {
            target_type: "ollama".into(),
            target_name: "llama3.2:3b".into(),
            probes: vec!["dan".into()],
            detectors: vec![],
            buffs: vec![],
            generations: 2,
            eval_threshold: 0.5,
            seed: None,
            parallel_requests: None,
            parallel_attempts: None,
            generator_options: HashMap::new(),
            probe_options: HashMap::new(),
            probe_tags: None,
            system_prompt: None,
            deprefix: false,
            extended_detectors: false,
            skip_unknown: false,
            continue_on_error: false,
            verbose: 0,
            timeout_per_probe: None,
            report_threshold: None,
            hit_rate: None,
            collect_timing: false,
            exclude_probes: None,
            exclude_detectors: None,
            output_dir: None,
            no_report: false,
            config_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ScanConfig {
        ScanConfig {
            target_type: "ollama".into(),
            target_name: "llama3.2:3b".into(),
            probes: vec!["dan".into()],
            detectors: vec![],
            buffs: vec![],
            generations: 2,
            eval_threshold: 0.5,
            seed: None,
            parallel_requests: None,
            parallel_attempts: None,
            generator_options: HashMap::new(),
            probe_options: HashMap::new(),
            probe_tags: None,
            system_prompt: None,
            deprefix: false,
            extended_detectors: false,
            skip_unknown: false,
            continue_on_error: false,
            verbose: 0,
            timeout_per_probe: None,
            report_threshold: None,
            hit_rate: None,
            collect_timing: false,
            exclude_probes: None,
            exclude_detectors: None,
            output_dir: None,
            no_report: false,
            config_file: None,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn rejects_empty_probes() {
        let mut c = base();
        c.probes.clear();
        assert_eq!(c.validate(), Err(ScanConfigError::MissingProbes));
    }

    #[test]
    fn rejects_generations_out_of_range() {
        let mut c = base();
        c.generations = 0;
        assert_eq!(c.validate(), Err(ScanConfigError::GenerationsOutOfRange(0)));
        c.generations = 501;
        assert_eq!(c.validate(), Err(ScanConfigError::GenerationsOutOfRange(501)));
    }

    #[test]
    fn rejects_eval_threshold_out_of_range() {
        let mut c = base();
        c.eval_threshold = 1.5;
        assert!(c.validate().is_err());
    }
}

// SPDX-License-Identifier: MIT

//! Runner environment configuration (spec §6 "Environment"), read once at
//! startup — no config crate, same `std::env::var` idiom the teacher uses.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not valid: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Path or name of the `ENGINE` executable (spec §4.1). Default `garak`.
    pub engine_bin: String,
    pub bind_addr: String,
    pub reports_dir: std::path::PathBuf,
    pub storage_backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub s3_access_key_id: Option<String>,
    pub s3_secret_access_key: Option<String>,
    /// Pre-flight sanity cap; the Controller holds the authoritative cap.
    pub max_concurrent_scans: usize,
    /// Generator-host override forwarded to `ENGINE` as `OLLAMA_HOST`
    /// unless the submitted config already sets a host.
    pub generator_host_override: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Local,
    Object,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let storage_backend = match std::env::var("STORAGE_BACKEND").ok().as_deref() {
            None | Some("local") => StorageBackend::Local,
            Some("object") => StorageBackend::Object,
            Some(other) => {
                return Err(ConfigError::Invalid(
                    "STORAGE_BACKEND",
                    format!("expected local|object, got {other}"),
                ))
            }
        };
        let max_concurrent_scans = std::env::var("MAX_CONCURRENT_SCANS")
            .ok()
            .map(|v| v.parse::<usize>())
            .transpose()
            .map_err(|e| ConfigError::Invalid("MAX_CONCURRENT_SCANS", e.to_string()))?
            .unwrap_or(5);

        Ok(Self {
            engine_bin: std::env::var("ENGINE_BIN").unwrap_or_else(|_| "garak".into()),
            bind_addr: std::env::var("RUNNER_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8081".into()),
            reports_dir: std::env::var("REPORTS_DIR")
                .unwrap_or_else(|_| "/tmp/vg-reports".into())
                .into(),
            storage_backend,
            s3_bucket: std::env::var("S3_BUCKET").ok(),
            s3_region: std::env::var("S3_REGION").ok(),
            s3_endpoint: std::env::var("S3_ENDPOINT").ok(),
            s3_access_key_id: std::env::var("S3_ACCESS_KEY_ID").ok(),
            s3_secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY").ok(),
            max_concurrent_scans,
            generator_host_override: std::env::var("OLLAMA_HOST").ok(),
        })
    }
}

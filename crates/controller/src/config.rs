// SPDX-License-Identifier: MIT

//! Controller environment configuration (spec §6 "Environment"), read
//! once at startup.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not valid: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Local,
    Object,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub engine_service_url: String,
    pub max_concurrent_scans: usize,
    pub bind_addr: String,
    pub database_url: String,
    /// Local fallback spool the report reader checks before falling back
    /// to the Runner's HTTP surface (spec §4.5 step 3).
    pub reports_dir: std::path::PathBuf,
    pub storage_backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub s3_access_key_id: Option<String>,
    pub s3_secret_access_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let max_concurrent_scans = std::env::var("MAX_CONCURRENT_SCANS")
            .ok()
            .map(|v| v.parse::<usize>())
            .transpose()
            .map_err(|e| ConfigError::Invalid("MAX_CONCURRENT_SCANS", e.to_string()))?
            .unwrap_or(5);

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

        Ok(Self {
            engine_service_url: std::env::var("ENGINE_SERVICE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8081".into()),
            max_concurrent_scans,
            bind_addr: std::env::var("CONTROLLER_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".into()),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://vg-controller.db".into()),
            reports_dir: std::env::var("REPORTS_DIR")
                .unwrap_or_else(|_| "/tmp/vg-reports".into())
                .into(),
            storage_backend,
            s3_bucket: std::env::var("S3_BUCKET").ok(),
            s3_region: std::env::var("S3_REGION").ok(),
            s3_endpoint: std::env::var("S3_ENDPOINT").ok(),
            s3_access_key_id: std::env::var("S3_ACCESS_KEY_ID").ok(),
            s3_secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY").ok(),
        })
    }
}

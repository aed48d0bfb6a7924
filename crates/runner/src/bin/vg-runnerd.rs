// SPDX-License-Identifier: MIT

use std::sync::Arc;
use vg_core::SystemClock;
use vg_runner::config::Config;
use vg_runner::http::{router, AppState};
use vg_runner::ScanManager;
use vg_storage::BlobStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    tracing::info!(bind_addr = %config.bind_addr, engine_bin = %config.engine_bin, "starting vg-runnerd");

    let blob_store = match config.storage_backend {
        vg_runner::config::StorageBackend::Local => BlobStore::local(&config.reports_dir)?,
        vg_runner::config::StorageBackend::Object => BlobStore::s3(
            config.s3_bucket.as_deref().unwrap_or_default(),
            config.s3_region.as_deref(),
            config.s3_endpoint.as_deref(),
            config.s3_access_key_id.as_deref(),
            config.s3_secret_access_key.as_deref(),
        )?,
    };

    let manager = Arc::new(ScanManager::new(
        config.engine_bin.clone(),
        config.reports_dir.clone(),
        config.generator_host_override.clone(),
        blob_store,
        SystemClock,
    ));

    let state = AppState {
        manager,
        engine_bin: config.engine_bin.clone(),
        reports_dir: config.reports_dir.clone(),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

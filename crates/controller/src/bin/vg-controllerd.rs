// SPDX-License-Identifier: MIT

use std::sync::Arc;
use vg_controller::config::{Config, StorageBackend};
use vg_controller::http::{router, AppState};
use vg_controller::registry::Registry;
use vg_controller::workflow::WorkflowGraphs;
use vg_storage::{BlobStore, ReportReader, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        bind_addr = %config.bind_addr,
        engine_service_url = %config.engine_service_url,
        max_concurrent_scans = config.max_concurrent_scans,
        "starting vg-controllerd"
    );

    let store = Arc::new(Store::connect(&config.database_url).await?);

    let blob_store = match config.storage_backend {
        StorageBackend::Local => BlobStore::local(&config.reports_dir)?,
        StorageBackend::Object => BlobStore::s3(
            config.s3_bucket.as_deref().unwrap_or_default(),
            config.s3_region.as_deref(),
            config.s3_endpoint.as_deref(),
            config.s3_access_key_id.as_deref(),
            config.s3_secret_access_key.as_deref(),
        )?,
    };

    let report_reader = Arc::new(ReportReader::new(blob_store.clone(), config.reports_dir.clone()));
    let registry = Arc::new(Registry::new(
        config.engine_service_url.clone(),
        config.max_concurrent_scans,
        store,
    ));

    let state = AppState {
        registry,
        report_reader,
        blob_store,
        workflow_graphs: Arc::new(WorkflowGraphs::new()),
        runner_base_url: config.engine_service_url,
        http: reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?,
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

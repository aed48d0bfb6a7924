// SPDX-License-Identifier: MIT

//! Scan registry (spec §4.4): the canonical in-memory `active_scans` map,
//! capacity enforcement, and the submit path. Mutated only by lifecycle
//! handlers and the SSE consumer task (spec §5 "Shared resources");
//! HTTP read handlers take a snapshot.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use vg_core::{Clock, ControlPlaneError, ScanConfig, ScanId, ScanRecord, ScanStatus, SystemClock};
use vg_storage::Store;
use vg_wire::StartScanRequest;

/// `active_scans`: live `ScanRecord`s, independent of the persisted copy
/// (spec §9 "Global mutable state" — isolated behind this module).
#[derive(Default)]
pub struct ActiveScans {
    by_id: HashMap<ScanId, Arc<Mutex<ScanRecord>>>,
}

impl ActiveScans {
    fn running_or_pending(&self) -> usize {
        self.by_id
            .values()
            .filter(|r| {
                let status = r.lock().status;
                matches!(status, ScanStatus::Pending | ScanStatus::Running)
            })
            .count()
    }
}

pub struct Registry {
    engine_service_url: String,
    max_concurrent_scans: usize,
    http: reqwest::Client,
    store: Arc<Store>,
    active: Mutex<ActiveScans>,
}

impl Registry {
    pub fn new(engine_service_url: String, max_concurrent_scans: usize, store: Arc<Store>) -> Self {
        Self {
            engine_service_url,
            max_concurrent_scans,
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            store,
            active: Mutex::new(ActiveScans::default()),
        }
    }

    pub fn max_concurrent_scans(&self) -> usize {
        self.max_concurrent_scans
    }

    pub fn engine_service_url(&self) -> &str {
        &self.engine_service_url
    }

    /// Submit path, spec §4.4 steps i-vi. Returns the new record's handle;
    /// callers spawn the SSE consumer separately (keeps this fn testable
    /// without a live Runner).
    pub async fn submit(&self, config: ScanConfig) -> Result<Arc<Mutex<ScanRecord>>, ControlPlaneError> {
        config
            .validate()
            .map_err(|e| ControlPlaneError::ConfigInvalid(e.to_string()))?;

        {
            let active = self.active.lock();
            let running = active.running_or_pending();
            if running >= self.max_concurrent_scans {
                return Err(ControlPlaneError::Capacity(format!(
                    "{running}/{} scans already running or pending",
                    self.max_concurrent_scans
                )));
            }
        }

        let scan_id = ScanId::new();
        let now = SystemClock.epoch_ms();
        let record = ScanRecord::new(scan_id, config.clone(), now);
        let handle = Arc::new(Mutex::new(record.clone()));

        let resp = self
            .http
            .post(format!("{}/scans", self.engine_service_url))
            .json(&StartScanRequest { scan_id, config })
            .send()
            .await
            .map_err(|e| ControlPlaneError::Upstream(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ControlPlaneError::Upstream(format!(
                "Runner rejected scan: {}",
                resp.status()
            )));
        }

        self.active.lock().by_id.insert(scan_id, handle.clone());
        self.store
            .upsert(&record)
            .await
            .map_err(|e| ControlPlaneError::StorageTransient(e.to_string()))?;

        Ok(handle)
    }

    pub fn get(&self, scan_id: ScanId) -> Option<Arc<Mutex<ScanRecord>>> {
        self.active.lock().by_id.get(&scan_id).cloned()
    }

    pub fn snapshot(&self, scan_id: ScanId) -> Option<ScanRecord> {
        self.get(scan_id).map(|h| h.lock().clone())
    }

    /// `delete(scan_id)`: removes the in-memory entry (spec §8).
    /// Persistence-row and blob removal are the HTTP handler's job, since
    /// they need the blob store / database handles this module doesn't own.
    pub fn forget(&self, scan_id: ScanId) {
        self.active.lock().by_id.remove(&scan_id);
    }

    pub fn active_scan_ids(&self) -> Vec<ScanId> {
        self.active.lock().by_id.keys().copied().collect()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_arc(&self) -> Arc<Store> {
        self.store.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vg_core::scan_config::tests_support::minimal;

    #[tokio::test]
    async fn capacity_denies_submit_at_cap() {
        let store = Arc::new(Store::connect("sqlite::memory:").await.unwrap());
        let registry = Registry::new("http://127.0.0.1:1".into(), 0, store);
        let err = registry.submit(minimal()).await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::Capacity(_)));
    }
}

// SPDX-License-Identifier: MIT

//! vg-storage: the blob store abstraction, the multi-layer report
//! reader/cache (spec §4.5), and `scans`/`db_meta` persistence (spec §6).

pub mod blobstore;
pub mod persistence;
pub mod probe_stats;
pub mod report_reader;

pub use blobstore::{BackendKind, BlobStore, BlobStoreError};
pub use persistence::{PersistenceError, Store};
pub use report_reader::ReportReader;

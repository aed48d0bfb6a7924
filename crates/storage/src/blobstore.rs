// SPDX-License-Identifier: MIT

//! Pluggable blob store (spec §4.5): object store preferred, local
//! filesystem as a fallback backend. Both backends are the same
//! `object_store::ObjectStore` trait object so callers never branch on
//! backend kind.

use bytes::Bytes;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("blob store I/O error: {0}")]
    Io(#[from] object_store::Error),
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// Selected once at startup per `STORAGE_BACKEND` (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Object,
}

/// Capability surface spec §4.5 names: {get, get_stream, put, put_file,
/// exists, delete, list_keys}.
#[derive(Clone)]
pub struct BlobStore {
    inner: Arc<dyn ObjectStore>,
    kind: BackendKind,
}

impl BlobStore {
    pub fn new(inner: Arc<dyn ObjectStore>, kind: BackendKind) -> Self {
        Self { inner, kind }
    }

    pub fn local(root: &Path) -> Result<Self, BlobStoreError> {
        std::fs::create_dir_all(root).map_err(|e| BlobStoreError::InvalidKey(e.to_string()))?;
        let fs = object_store::local::LocalFileSystem::new_with_prefix(root)
            .map_err(BlobStoreError::Io)?;
        Ok(Self::new(Arc::new(fs), BackendKind::Local))
    }

    /// S3-compatible backend (spec §4.5 "two backends... an S3-compatible
    /// object store"). `endpoint` is optional, for MinIO-style deployments.
    pub fn s3(
        bucket: &str,
        region: Option<&str>,
        endpoint: Option<&str>,
        access_key_id: Option<&str>,
        secret_access_key: Option<&str>,
    ) -> Result<Self, BlobStoreError> {
        let mut builder = object_store::aws::AmazonS3Builder::new().with_bucket_name(bucket);
        if let Some(region) = region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = endpoint {
            builder = builder.with_endpoint(endpoint).with_allow_http(true);
        }
        if let (Some(key), Some(secret)) = (access_key_id, secret_access_key) {
            builder = builder.with_access_key_id(key).with_secret_access_key(secret);
        }
        let s3 = builder.build().map_err(BlobStoreError::Io)?;
        Ok(Self::new(Arc::new(s3), BackendKind::Object))
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    fn path(key: &str) -> ObjectPath {
        ObjectPath::from(key)
    }

    pub async fn get(&self, key: &str) -> Result<Bytes, BlobStoreError> {
        let result = self.inner.get(&Self::path(key)).await?;
        Ok(result.bytes().await?)
    }

    /// Streamed read; callers fold chunks (e.g. line-by-line JSON-Lines
    /// parsing) without buffering the whole artifact.
    pub async fn get_stream(
        &self,
        key: &str,
    ) -> Result<impl futures_core::Stream<Item = Result<Bytes, object_store::Error>>, BlobStoreError>
    {
        let result = self.inner.get(&Self::path(key)).await?;
        Ok(result.into_stream())
    }

    pub async fn put(&self, key: &str, bytes: Bytes) -> Result<(), BlobStoreError> {
        self.inner
            .put(&Self::path(key), PutPayload::from_bytes(bytes))
            .await?;
        Ok(())
    }

    pub async fn put_file(&self, key: &str, local_path: &Path) -> Result<(), BlobStoreError> {
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|e| BlobStoreError::InvalidKey(e.to_string()))?;
        self.put(key, Bytes::from(bytes)).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool, BlobStoreError> {
        match self.inner.head(&Self::path(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), BlobStoreError> {
        match self.inner.delete(&Self::path(key)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// List every key under `prefix` (used by `delete(scan_id)`, spec §8).
    pub async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, BlobStoreError> {
        use futures_util::StreamExt;
        let mut stream = self.inner.list(Some(&Self::path(prefix)));
        let mut keys = Vec::new();
        while let Some(meta) = stream.next().await {
            keys.push(meta?.location.to_string());
        }
        Ok(keys)
    }

    /// Delete every blob under `{scan_id}/` (spec §8 "delete(scan_id)
    /// removes ... every blob under prefix `{scan_id}/`").
    pub async fn delete_prefix(&self, prefix: &str) -> Result<(), BlobStoreError> {
        for key in self.list_keys(prefix).await? {
            self.delete(&key).await?;
        }
        Ok(())
    }

    /// Retry a fallible upload up to 3 times with linear backoff (spec §4.5
    /// "retry up to 3 times with linear backoff on failure").
    pub async fn put_file_with_retry(
        &self,
        key: &str,
        local_path: &Path,
    ) -> Result<(), BlobStoreError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.put_file(key, local_path).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= 3 => return Err(e),
                Err(e) => {
                    tracing::warn!(key, attempt, error = %e, "artifact upload failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(300 * attempt as u64)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::local(dir.path()).unwrap();
        store.put("scan-1/garak.scan-1.report.jsonl", Bytes::from_static(b"{}\n")).await.unwrap();
        assert!(store.exists("scan-1/garak.scan-1.report.jsonl").await.unwrap());
        let bytes = store.get("scan-1/garak.scan-1.report.jsonl").await.unwrap();
        assert_eq!(&bytes[..], b"{}\n");
    }

    #[tokio::test]
    async fn delete_prefix_removes_all_scan_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::local(dir.path()).unwrap();
        store.put("scan-1/garak.scan-1.report.jsonl", Bytes::from_static(b"a")).await.unwrap();
        store.put("scan-1/garak.scan-1.report.html", Bytes::from_static(b"b")).await.unwrap();
        store.put("scan-2/garak.scan-2.report.jsonl", Bytes::from_static(b"c")).await.unwrap();
        store.delete_prefix("scan-1/").await.unwrap();
        assert!(!store.exists("scan-1/garak.scan-1.report.jsonl").await.unwrap());
        assert!(store.exists("scan-2/garak.scan-2.report.jsonl").await.unwrap());
    }

    #[tokio::test]
    async fn missing_key_is_not_found_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::local(dir.path()).unwrap();
        assert!(!store.exists("nope").await.unwrap());
    }
}

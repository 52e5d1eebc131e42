//! Object store backends.

use async_trait::async_trait;
use flywheel_core::ports::ObjectStore;
use flywheel_core::{Error, Result};
use std::path::PathBuf;
use tracing::{debug, info};

/// Filesystem-backed store. Keys become paths under a root directory;
/// useful for local runs and tests.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.split('/').any(|seg| seg == "..") {
            return Err(Error::Publish(format!("Invalid object key: {}", key)));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Publish(format!("Failed to create {}: {}", parent.display(), e)))?;
        }
        let size = bytes.len();
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Error::Publish(format!("Failed to write {}: {}", path.display(), e)))?;
        debug!(key, size, path = %path.display(), "Stored object");
        Ok(())
    }
}

/// HTTP store: objects are uploaded with a PUT to `{base_url}/{key}`.
/// PUT is naturally idempotent, so a retried publish replaces the same
/// object.
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), key);
        let size = bytes.len();

        let mut request = self
            .client
            .put(&url)
            .header("Content-Type", content_type)
            .body(bytes);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Publish(format!("Upload to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::Publish(format!(
                "Upload to {} failed with status {}",
                url,
                response.status()
            )));
        }

        info!(key, size, "Uploaded object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fs_store_writes_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        store
            .put("builds/amd64/app-abc123.tar.gz", b"artifact".to_vec(), "application/gzip")
            .await
            .unwrap();

        let written = std::fs::read(dir.path().join("builds/amd64/app-abc123.tar.gz")).unwrap();
        assert_eq!(written, b"artifact");
    }

    #[tokio::test]
    async fn test_fs_store_overwrite_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        store.put("k", b"one".to_vec(), "text/plain").await.unwrap();
        store.put("k", b"two".to_vec(), "text/plain").await.unwrap();

        assert_eq!(std::fs::read(dir.path().join("k")).unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_fs_store_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        let err = store
            .put("../escape", b"x".to_vec(), "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Publish(_)));
    }
}

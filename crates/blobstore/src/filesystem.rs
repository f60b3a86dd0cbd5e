use std::path::PathBuf;

use async_trait::async_trait;
use xqueue_core::error::BlobError;

use crate::BlobStore;

/// Filesystem-backed blob store. Suitable for single-node deployments; paths
/// are joined onto `root_dir` and created on demand.
pub struct FilesystemBlobStore {
    root_dir: PathBuf,
    base_url: String,
}

impl FilesystemBlobStore {
    pub fn new(root_dir: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root_dir: root_dir.into(),
            base_url: base_url.into(),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root_dir.join(path)
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn save(&self, path: &str, bytes: &[u8]) -> Result<(), BlobError> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BlobError::Io(e.to_string()))?;
        }
        tokio::fs::write(&full, bytes)
            .await
            .map_err(|e| BlobError::Io(e.to_string()))
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        let full = self.resolve(path);
        tokio::fs::read(&full).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BlobError::NotFound(path.to_owned())
            } else {
                BlobError::Io(e.to_string())
            }
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

//! Object storage for generated illustrations

use async_trait::async_trait;
use opine_common::{Error, Result};
use std::path::PathBuf;

/// External object store collaborator
///
/// `put` persists bytes under a relative path and returns the public URL
/// the stored object is reachable at.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<String>;
}

/// Filesystem-backed object store
///
/// Writes under the media directory inside the root folder; the directory
/// is served statically by the HTTP router, so the public URL is simply
/// the configured base joined with the relative path.
pub struct LocalObjectStore {
    media_dir: PathBuf,
    public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(media_dir: PathBuf, public_base_url: String) -> Self {
        Self {
            media_dir,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<String> {
        let path = path.trim_start_matches('/');

        // Reject traversal outside the media directory
        if path.split('/').any(|seg| seg == "..") {
            return Err(Error::InvalidInput(format!("Invalid object path: {}", path)));
        }

        let full_path = self.media_dir.join(path);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full_path, bytes).await?;

        tracing::debug!(
            path = %full_path.display(),
            bytes = bytes.len(),
            content_type,
            "Stored object"
        );

        Ok(format!("{}/{}", self.public_base_url, path))
    }
}

//! Local filesystem artifact storage.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::config::StorageConfig;
use super::traits::{ArtifactStorage, StorageError};

/// Copies artifacts under `<root>/<job_id>/<name>`.
///
/// Expects `root` to be served at `public_base_url` by something else
/// (a reverse proxy or static file server).
pub struct LocalStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            root: config.root,
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}

#[async_trait]
impl ArtifactStorage for LocalStorage {
    fn name(&self) -> &str {
        "local"
    }

    async fn put(&self, source: &Path, name: &str, job_id: &str) -> Result<String, StorageError> {
        for part in [name, job_id] {
            if !is_plain_name(part) {
                return Err(StorageError::InvalidName {
                    name: part.to_string(),
                });
            }
        }

        if !fs::try_exists(source).await.unwrap_or(false) {
            return Err(StorageError::SourceNotFound {
                path: source.to_path_buf(),
            });
        }

        let dir = self.root.join(job_id);
        fs::create_dir_all(&dir).await?;
        let destination = dir.join(name);
        let bytes = fs::copy(source, &destination).await?;

        tracing::debug!(
            job_id = %job_id,
            artifact = %name,
            bytes,
            "Artifact stored"
        );

        Ok(format!("{}/{}/{}", self.public_base_url, job_id, name))
    }
}

//! Trait definitions for the storage module.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while storing an artifact.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Source file does not exist.
    #[error("Source file not found: {path}")]
    SourceNotFound { path: PathBuf },

    /// Artifact name is not a plain file name.
    #[error("Invalid artifact name: {name}")]
    InvalidName { name: String },

    /// I/O error while writing the artifact.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A backend that keeps output artifacts and hands out retrieval URLs.
#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    /// Returns the name of this storage backend.
    fn name(&self) -> &str;

    /// Store `source` as `name` under `job_id` and return its retrieval URL.
    async fn put(&self, source: &Path, name: &str, job_id: &str) -> Result<String, StorageError>;
}

//! Placement of conversion outputs behind a retrieval URL.

mod config;
mod local;
mod traits;

pub use config::StorageConfig;
pub use local::LocalStorage;
pub use traits::{ArtifactStorage, StorageError};

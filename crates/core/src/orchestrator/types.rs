//! Types for the job orchestrator.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::callback::CallbackStats;
use crate::job::{CustomData, JobStoreError};
use crate::pool::{PoolError, PoolStatus};

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Job not found.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Orchestrator is not running.
    #[error("orchestrator is not running")]
    NotRunning,

    /// Job store error.
    #[error("job store error: {0}")]
    Store(#[from] JobStoreError),

    /// Work could not be queued.
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),
}

/// Intake parameters for a new job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateJobRequest {
    /// Conversion settings, passed to the executor unchanged.
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
    /// Where to POST the final snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    /// Opaque data echoed back in snapshots.
    #[serde(default)]
    pub custom_data: CustomData,
}

impl CreateJobRequest {
    pub fn new(settings: BTreeMap<String, String>) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }
}

/// Where a job's input comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobInput {
    /// Already on local disk.
    File { path: PathBuf },
    /// Must be downloaded before conversion.
    Url { url: String },
}

/// Input and output locations for one conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
}

/// Current status of the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    /// Whether the orchestrator is running.
    pub running: bool,
    /// Job store backend name.
    pub store: String,
    /// Records currently held by the store.
    pub jobs: usize,
    /// Download, convert and callback pools.
    pub pools: Vec<PoolStatus>,
    /// Callback delivery counters.
    pub callbacks: CallbackStats,
}

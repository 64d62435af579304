//! Orchestrator configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the job orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Per-job scratch space: `<work_dir>/<job_id>/{input,output}`.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Public base URL of this service, handed to executors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_url: Option<String>,

    /// How long shutdown waits for running tasks (seconds).
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("./data/work")
}

fn default_shutdown_grace() -> u64 {
    10
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            context_url: None,
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }
}

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the reaper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaperConfig {
    /// Run the periodic sweep at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Age after which records and files are removed, in seconds.
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,

    /// Seconds between sweeps.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Directories to sweep. Empty means the work and storage directories.
    #[serde(default)]
    pub roots: Vec<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_ttl() -> u64 {
    86_400 // 1 day
}

fn default_interval() -> u64 {
    600 // 10 minutes
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_ttl(),
            interval_secs: default_interval(),
            roots: Vec::new(),
        }
    }
}

impl ReaperConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

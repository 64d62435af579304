//! Pool sizing and the three-pool bundle.

use serde::{Deserialize, Serialize};

use super::{PoolStatus, WorkerPool};

/// Concurrency of each pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolsConfig {
    /// Concurrent input downloads (I/O-bound).
    #[serde(default = "default_download")]
    pub download: usize,

    /// Concurrent conversions. Primary throughput control.
    #[serde(default = "default_convert")]
    pub convert: usize,

    /// Concurrent callback deliveries.
    #[serde(default = "default_callback")]
    pub callback: usize,
}

fn default_download() -> usize {
    2
}

fn default_convert() -> usize {
    4
}

fn default_callback() -> usize {
    2
}

impl Default for PoolsConfig {
    fn default() -> Self {
        Self {
            download: default_download(),
            convert: default_convert(),
            callback: default_callback(),
        }
    }
}

impl PoolsConfig {
    pub fn with_convert(mut self, convert: usize) -> Self {
        self.convert = convert;
        self
    }
}

/// The download, convert and callback pools, sized independently.
#[derive(Clone)]
pub struct WorkerPools {
    pub download: WorkerPool,
    pub convert: WorkerPool,
    pub callback: WorkerPool,
}

impl WorkerPools {
    /// Spawn all three pools. Must be called inside a runtime.
    pub fn new(config: &PoolsConfig) -> Self {
        Self {
            download: WorkerPool::new("download", config.download),
            convert: WorkerPool::new("convert", config.convert),
            callback: WorkerPool::new("callback", config.callback),
        }
    }

    pub fn statuses(&self) -> Vec<PoolStatus> {
        vec![
            self.download.status(),
            self.convert.status(),
            self.callback.status(),
        ]
    }

    pub fn shutdown(&self) {
        self.download.shutdown();
        self.convert.shutdown();
        self.callback.shutdown();
    }
}

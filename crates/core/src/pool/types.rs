//! Types for the pool module.

use serde::{Deserialize, Serialize};

/// Status of a worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Pool name (e.g., "download", "convert", "callback").
    pub name: String,
    /// Number of tasks currently running.
    pub active_jobs: usize,
    /// Maximum concurrent tasks.
    pub max_concurrent: usize,
    /// Number of tasks waiting for a worker.
    pub queued_jobs: usize,
    /// Number of delayed submissions whose timer has not fired yet.
    pub scheduled_jobs: usize,
    /// Total tasks completed since startup.
    pub total_processed: u64,
    /// Total tasks that panicked since startup.
    pub total_failed: u64,
}

/// Error type for pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The pool no longer accepts work.
    #[error("Pool {0} is shut down")]
    ShutDown(String),
}

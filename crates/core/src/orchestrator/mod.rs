//! Job orchestrator.
//!
//! Ties job creation, dispatch, completion and cleanup together:
//! - **Download**: URL inputs are fetched on the download pool first
//! - **Convert**: the executor runs on the convert pool (the throughput knob)
//! - **Callback**: terminal snapshots are posted on the callback pool
//! - **Reaper**: expired records and files are swept on a timer

mod config;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::Orchestrator;
pub use types::{CreateJobRequest, JobInput, OrchestratorError, OrchestratorStatus, WorkItem};

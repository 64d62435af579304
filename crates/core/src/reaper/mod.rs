//! Periodic eviction of expired job records and on-disk artifacts.
//!
//! Record deletion and file deletion are independent sweeps that share one
//! cutoff per run. Both are idempotent, so a run that fails halfway is
//! completed by the next one.

mod config;
mod sweep;
mod task;

pub use config::ReaperConfig;
pub use task::{ReapReport, Reaper};

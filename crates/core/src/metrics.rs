//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Jobs (created, finished by state)
//! - Downloads and conversions
//! - Callback delivery
//! - Reaper sweeps

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Jobs
// =============================================================================

/// Jobs accepted total.
pub static JOBS_CREATED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("convoy_jobs_created_total", "Total jobs accepted").unwrap()
});

/// Jobs finished total by terminal state.
pub static JOBS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("convoy_jobs_finished_total", "Total jobs that reached a terminal state"),
        &["state"], // "processed", "error"
    )
    .unwrap()
});

/// Job failures by error code.
pub static JOB_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("convoy_job_errors_total", "Total failed jobs by error code"),
        &["code"],
    )
    .unwrap()
});

// =============================================================================
// Downloads & Conversions
// =============================================================================

/// Input downloads by result.
pub static DOWNLOADS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("convoy_downloads_total", "Total input downloads"),
        &["result"], // "success", "failed", "too_large"
    )
    .unwrap()
});

/// Conversion duration in seconds.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("convoy_conversion_duration_seconds", "Duration of conversions")
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0, 3600.0]),
        &["result"], // "success", "failed", "panicked"
    )
    .unwrap()
});

// =============================================================================
// Callbacks
// =============================================================================

/// Callback HTTP attempts by result.
pub static CALLBACK_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("convoy_callback_attempts_total", "Total callback delivery attempts"),
        &["result"], // "success", "failure"
    )
    .unwrap()
});

/// Callbacks dropped after the last attempt.
pub static CALLBACKS_ABANDONED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "convoy_callbacks_abandoned_total",
        "Total callbacks given up after exhausting retries",
    )
    .unwrap()
});

// =============================================================================
// Reaper
// =============================================================================

/// Job records removed by the reaper.
pub static REAPED_RECORDS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("convoy_reaped_records_total", "Total expired job records removed").unwrap()
});

/// Files and directories removed by the reaper.
pub static REAPED_ENTRIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "convoy_reaped_entries_total",
        "Total expired files and directories removed",
    )
    .unwrap()
});

/// Per-entry errors during reaper sweeps.
pub static REAPER_ERRORS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("convoy_reaper_errors_total", "Total errors during reaper sweeps").unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Jobs
        Box::new(JOBS_CREATED.clone()),
        Box::new(JOBS_FINISHED.clone()),
        Box::new(JOB_ERRORS.clone()),
        // Downloads & conversions
        Box::new(DOWNLOADS.clone()),
        Box::new(CONVERSION_DURATION.clone()),
        // Callbacks
        Box::new(CALLBACK_ATTEMPTS.clone()),
        Box::new(CALLBACKS_ABANDONED.clone()),
        // Reaper
        Box::new(REAPED_RECORDS.clone()),
        Box::new(REAPED_ENTRIES.clone()),
        Box::new(REAPER_ERRORS.clone()),
    ]
}

//! Reaper task: one cutoff per run, records first, then files.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::ReaperConfig;
use super::sweep::sweep_root;
use crate::job::JobStore;
use crate::metrics;

/// Outcome of one reaper run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReapReport {
    /// Job records deleted from the store.
    pub records_removed: usize,
    /// Files and directories deleted from the roots.
    pub entries_removed: usize,
    /// Store or per-entry failures, each logged.
    pub errors: usize,
}

/// Evicts records and files older than the TTL.
pub struct Reaper {
    store: Arc<dyn JobStore>,
    ttl: Duration,
    interval: Duration,
    roots: Vec<PathBuf>,
}

impl Reaper {
    pub fn new(config: &ReaperConfig, store: Arc<dyn JobStore>, roots: Vec<PathBuf>) -> Self {
        Self {
            store,
            ttl: config.ttl(),
            interval: config.interval(),
            roots,
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Sweep with `cutoff = now - ttl`.
    pub async fn run_once(&self) -> ReapReport {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.run_with_cutoff(cutoff).await
    }

    /// Remove records created before `cutoff`, then files modified before it.
    ///
    /// Blocking store and filesystem work runs off the async workers.
    pub async fn run_with_cutoff(&self, cutoff: DateTime<Utc>) -> ReapReport {
        let store = Arc::clone(&self.store);
        let roots = self.roots.clone();

        let result = tokio::task::spawn_blocking(move || {
            let mut report = ReapReport::default();

            match store.remove_older_than(cutoff) {
                Ok(removed) => report.records_removed = removed,
                Err(e) => {
                    error!(store = %store.name(), error = %e, "Failed to remove expired records");
                    report.errors += 1;
                }
            }

            let file_cutoff = SystemTime::from(cutoff);
            for root in &roots {
                sweep_root(root, file_cutoff, &mut report);
            }
            report
        })
        .await;

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                error!("Reaper run aborted: {}", e);
                ReapReport {
                    errors: 1,
                    ..Default::default()
                }
            }
        };

        metrics::REAPED_RECORDS.inc_by(report.records_removed as u64);
        metrics::REAPED_ENTRIES.inc_by(report.entries_removed as u64);
        metrics::REAPER_ERRORS.inc_by(report.errors as u64);

        if report == ReapReport::default() {
            debug!("Reaper run found nothing to remove");
        } else {
            info!(
                records = report.records_removed,
                entries = report.entries_removed,
                errors = report.errors,
                "Reaper run finished"
            );
        }
        report
    }

    /// Run every `interval` until shutdown is signalled. The first run is immediate.
    pub fn spawn(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            info!(
                ttl_secs = self.ttl.as_secs(),
                interval_secs = self.interval.as_secs(),
                roots = self.roots.len(),
                "Reaper started"
            );
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Reaper received shutdown signal");
                        break;
                    }
                    _ = interval.tick() => {
                        let report = self.run_once().await;
                        if report.errors > 0 {
                            warn!(errors = report.errors, "Reaper run had errors");
                        }
                    }
                }
            }
            info!("Reaper stopped");
        })
    }
}

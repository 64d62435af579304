//! Depth-first removal of expired files and directories.

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

use super::ReapReport;

struct Entry {
    path: PathBuf,
    is_dir: bool,
    modified: SystemTime,
}

/// Remove everything under `root` last modified before `cutoff`.
///
/// Directory mtimes are read before any child is touched, so removing an
/// expired child never makes its parent look fresh. A directory that still
/// holds fresh entries is kept. `root` itself is never removed. Per-entry
/// errors are logged and counted; the sweep always runs to the end.
pub(crate) fn sweep_root(root: &Path, cutoff: SystemTime, report: &mut ReapReport) {
    if !root.exists() {
        tracing::debug!(root = %root.display(), "Reaper root does not exist, skipping");
        return;
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "Failed to read entry during sweep");
                report.errors += 1;
                continue;
            }
        };

        match entry.metadata() {
            Ok(meta) => match meta.modified() {
                Ok(modified) => entries.push(Entry {
                    path: entry.into_path(),
                    is_dir: meta.is_dir(),
                    modified,
                }),
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "No modification time");
                    report.errors += 1;
                }
            },
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "Failed to stat entry");
                report.errors += 1;
            }
        }
    }

    remove_expired(entries, cutoff, report, remove_entry);
}

fn remove_entry(path: &Path, is_dir: bool) -> io::Result<()> {
    if is_dir {
        std::fs::remove_dir(path)
    } else {
        std::fs::remove_file(path)
    }
}

fn remove_expired(
    entries: Vec<Entry>,
    cutoff: SystemTime,
    report: &mut ReapReport,
    mut remove: impl FnMut(&Path, bool) -> io::Result<()>,
) {
    // Walk order is parents first; reversed, children go before their parent.
    for entry in entries.into_iter().rev() {
        if entry.modified >= cutoff {
            continue;
        }

        match remove(&entry.path, entry.is_dir) {
            Ok(()) => {
                tracing::debug!(path = %entry.path.display(), "Expired entry removed");
                report.entries_removed += 1;
            }
            Err(e) if entry.is_dir && e.kind() == ErrorKind::DirectoryNotEmpty => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %entry.path.display(), error = %e, "Failed to remove expired entry");
                report.errors += 1;
            }
        }
    }
}

//! Job records, their lifecycle and persistence.

mod handle;
mod memory_store;
mod sqlite_store;
mod store;
mod types;

pub use handle::JobHandle;
pub use memory_store::MemoryJobStore;
pub use sqlite_store::SqliteJobStore;
pub use store::{JobStore, JobStoreError};
pub use types::{
    CustomData, CustomValue, CustomValues, JobError, JobRecord, JobSnapshot, JobState,
};

/// Numeric codes carried by failed jobs.
pub mod error_codes {
    /// Conversion failed or panicked.
    pub const CONVERSION_FAILED: u32 = 1000;
    /// Conversion exceeded its timeout.
    pub const CONVERSION_TIMEOUT: u32 = 1001;
    /// Input file missing when the conversion started.
    pub const INPUT_MISSING: u32 = 1002;
    /// Output artifact could not be stored.
    pub const UPLOAD_FAILED: u32 = 1100;
    /// Input download failed (HTTP status or transport).
    pub const DOWNLOAD_FAILED: u32 = 1200;
    /// Input larger than the configured limit.
    pub const DOWNLOAD_TOO_LARGE: u32 = 1201;
}

pub mod callback;
pub mod config;
pub mod converter;
pub mod download;
pub mod job;
pub mod metrics;
pub mod orchestrator;
pub mod pool;
pub mod reaper;
pub mod storage;
pub mod testing;

pub use callback::{CallbackConfig, CallbackDispatcher, CallbackError, CallbackStats};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
    StoreBackend,
};
pub use converter::{
    CommandExecutor, ConversionContext, ConversionError, ConversionExecutor, ConverterConfig,
};
pub use download::{DownloadConfig, DownloadError, Downloader};
pub use job::{
    error_codes, CustomData, CustomValue, CustomValues, JobError, JobHandle, JobRecord,
    JobSnapshot, JobState, JobStore, JobStoreError, MemoryJobStore, SqliteJobStore,
};
pub use orchestrator::{
    CreateJobRequest, JobInput, Orchestrator, OrchestratorConfig, OrchestratorError,
    OrchestratorStatus, WorkItem,
};
pub use pool::{PoolError, PoolStatus, PoolsConfig, WorkerPool, WorkerPools};
pub use reaper::{ReapReport, Reaper, ReaperConfig};
pub use storage::{ArtifactStorage, LocalStorage, StorageConfig, StorageError};

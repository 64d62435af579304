use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use convoy_core::{
    CallbackDispatcher, CommandExecutor, Config, Downloader, JobStore, LocalStorage,
    MemoryJobStore, Orchestrator, Reaper, SanitizedConfig, SqliteJobStore, StoreBackend,
    WorkerPools,
};
use tracing::info;

/// The orchestrator as wired by the server.
pub type ServiceOrchestrator = Orchestrator<CommandExecutor>;

/// Shared application state
pub struct AppState {
    config: Config,
    orchestrator: Arc<ServiceOrchestrator>,
}

impl AppState {
    pub fn new(config: Config, orchestrator: Arc<ServiceOrchestrator>) -> Self {
        Self {
            config,
            orchestrator,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    /// Directory that local `path` inputs must resolve under, if any.
    pub fn intake_dir(&self) -> Option<&Path> {
        self.config.server.intake_dir.as_deref()
    }

    pub fn orchestrator(&self) -> &ServiceOrchestrator {
        self.orchestrator.as_ref()
    }
}

/// Create the job store selected by `[store] backend`.
pub fn build_store(config: &Config) -> Result<Arc<dyn JobStore>> {
    let store: Arc<dyn JobStore> = match config.store.backend {
        StoreBackend::Memory => Arc::new(MemoryJobStore::new()),
        StoreBackend::Sqlite => Arc::new(
            SqliteJobStore::new(&config.store.path).with_context(|| {
                format!("Failed to open job store at {:?}", config.store.path)
            })?,
        ),
    };
    info!("Job store initialized ({})", store.name());
    Ok(store)
}

/// Wire pools, executor, downloader, callbacks and reaper around `store`.
///
/// Must be called inside a runtime; the orchestrator is returned stopped.
pub fn build_orchestrator(config: &Config, store: Arc<dyn JobStore>) -> Result<ServiceOrchestrator> {
    let pools = WorkerPools::new(&config.pools);
    info!(
        download = config.pools.download,
        convert = config.pools.convert,
        callback = config.pools.callback,
        "Worker pools started"
    );

    let storage = Arc::new(LocalStorage::new(config.storage.clone()));
    let executor = CommandExecutor::new(config.converter.clone(), storage);
    info!("Using converter program {:?}", config.converter.program);

    let downloader =
        Downloader::new(config.download.clone()).context("Failed to create downloader")?;
    let callbacks = CallbackDispatcher::new(&config.callback, pools.callback.clone())
        .context("Failed to create callback dispatcher")?;

    let orchestrator = Orchestrator::new(
        config.orchestrator.clone(),
        Arc::clone(&store),
        executor,
        pools,
        downloader,
        callbacks,
    );

    if config.reaper.enabled {
        let reaper = Reaper::new(&config.reaper, store, config.reaper_roots());
        info!("Reaper enabled for {:?}", reaper.roots());
        Ok(orchestrator.with_reaper(reaper))
    } else {
        info!("Reaper disabled in config");
        Ok(orchestrator)
    }
}

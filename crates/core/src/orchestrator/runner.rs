//! Job orchestrator implementation.
//!
//! Lifecycle of one job:
//! - `create_job` writes a `Queued` record
//! - URL inputs are downloaded on the download pool; a failure moves the job
//!   straight to `Error`
//! - the convert pool moves it to `Processing`, runs the executor, then to
//!   `Processed` or `Error`
//! - finalization makes sure the job is no longer alive and posts the
//!   callback, on every exit path

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::callback::CallbackDispatcher;
use crate::converter::{ConversionContext, ConversionExecutor};
use crate::download::{DownloadError, Downloader};
use crate::job::{
    error_codes, JobHandle, JobRecord, JobSnapshot, JobState, JobStore, JobStoreError,
};
use crate::metrics;
use crate::pool::{panic_message, PoolError, WorkerPool, WorkerPools};
use crate::reaper::Reaper;

use super::config::OrchestratorConfig;
use super::types::{CreateJobRequest, JobInput, OrchestratorError, OrchestratorStatus, WorkItem};

/// State shared with tasks running on the pools.
struct Shared<E> {
    config: OrchestratorConfig,
    store: Arc<dyn JobStore>,
    executor: E,
    pools: WorkerPools,
    downloader: Downloader,
    callbacks: CallbackDispatcher,
}

/// The job orchestrator.
///
/// The store, pools and collaborators are injected; `start` and `shutdown`
/// bound their lifetime.
pub struct Orchestrator<E: ConversionExecutor + 'static> {
    shared: Arc<Shared<E>>,
    reaper: Option<Arc<Reaper>>,

    // Runtime state
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
    reaper_task: Mutex<Option<JoinHandle<()>>>,
}

impl<E: ConversionExecutor + 'static> Orchestrator<E> {
    /// Create a new orchestrator.
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn JobStore>,
        executor: E,
        pools: WorkerPools,
        downloader: Downloader,
        callbacks: CallbackDispatcher,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            shared: Arc::new(Shared {
                config,
                store,
                executor,
                pools,
                downloader,
                callbacks,
            }),
            reaper: None,
            running: AtomicBool::new(false),
            shutdown_tx,
            reaper_task: Mutex::new(None),
        }
    }

    /// Run `reaper` on its own timer while the orchestrator is running.
    pub fn with_reaper(mut self, reaper: Reaper) -> Self {
        self.reaper = Some(Arc::new(reaper));
        self
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.shared.store
    }

    pub fn executor(&self) -> &E {
        &self.shared.executor
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the orchestrator (spawns the reaper loop).
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Orchestrator already running");
            return;
        }

        info!(store = %self.shared.store.name(), executor = %self.shared.executor.name(), "Starting job orchestrator");

        if let Some(reaper) = &self.reaper {
            let handle = Arc::clone(reaper).spawn(self.shutdown_tx.subscribe());
            if let Ok(mut slot) = self.reaper_task.lock() {
                *slot = Some(handle);
            }
        }

        info!("Job orchestrator started");
    }

    /// Stop accepting work and wind the pools down within the grace period.
    ///
    /// Queued downloads and conversions are dropped and their jobs settled as
    /// errors. Running tasks get the grace period to finish; first callback
    /// attempts go out before the callback pool stops, pending retries do not.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Orchestrator not running");
            return;
        }

        info!("Stopping job orchestrator");

        // Signal shutdown to the reaper
        let _ = self.shutdown_tx.send(());
        let pools = &self.shared.pools;
        pools.download.shutdown();
        pools.convert.shutdown();

        let reaper_task = self.reaper_task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = reaper_task {
            if let Err(e) = handle.await {
                error!("Reaper task failed: {}", e);
            }
        }

        let grace = Duration::from_secs(self.shared.config.shutdown_grace_secs);
        let deadline = Instant::now() + grace;
        if wait_idle(&[&pools.download, &pools.convert], deadline).await {
            wait_idle(&[&pools.callback], deadline).await;
        }
        pools.callback.shutdown();

        info!("Job orchestrator stopped");
    }

    /// Current status of the orchestrator and its pools.
    pub fn status(&self) -> OrchestratorStatus {
        let jobs = match self.shared.store.count() {
            Ok(count) => count,
            Err(e) => {
                warn!("Failed to count jobs: {}", e);
                0
            }
        };

        OrchestratorStatus {
            running: self.is_running(),
            store: self.shared.store.name().to_string(),
            jobs,
            pools: self.shared.pools.statuses(),
            callbacks: self.shared.callbacks.stats(),
        }
    }

    /// Write a new `Queued` record and return its id.
    pub fn create_job(&self, request: CreateJobRequest) -> Result<String, OrchestratorError> {
        let record = JobRecord::new(request.settings, request.callback_url, request.custom_data);
        let id = record.id.clone();
        self.shared.store.put(record)?;

        metrics::JOBS_CREATED.inc();
        debug!(job_id = %id, "Job created");
        Ok(id)
    }

    /// Client-visible snapshot of a job.
    pub fn get(&self, id: &str) -> Result<JobSnapshot, OrchestratorError> {
        match self.shared.store.get(id) {
            Ok(record) => Ok(record.snapshot()),
            Err(JobStoreError::NotFound(_)) => Err(OrchestratorError::JobNotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Create a job and queue its input in one step.
    pub fn accept(
        &self,
        request: CreateJobRequest,
        input: JobInput,
    ) -> Result<String, OrchestratorError> {
        self.ensure_running()?;
        let id = self.create_job(request)?;
        self.submit(&id, input)?;
        Ok(id)
    }

    /// Queue a created job: local files go to the convert pool, URLs to the
    /// download pool first.
    pub fn submit(&self, id: &str, input: JobInput) -> Result<(), OrchestratorError> {
        self.ensure_running()?;
        let result = match input {
            JobInput::File { path } => {
                let item = WorkItem {
                    input_path: path,
                    output_dir: self.shared.output_dir(id),
                };
                Shared::enqueue_convert(&self.shared, id.to_string(), item)
            }
            JobInput::Url { url } => Shared::enqueue_download(&self.shared, id.to_string(), url),
        };
        result.map_err(|e| rejected(id, e))
    }

    /// Queue a conversion for a job whose input is already in place.
    pub fn dispatch(&self, id: &str, item: WorkItem) -> Result<(), OrchestratorError> {
        self.ensure_running()?;
        Shared::enqueue_convert(&self.shared, id.to_string(), item).map_err(|e| rejected(id, e))
    }

    fn ensure_running(&self) -> Result<(), OrchestratorError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(OrchestratorError::NotRunning)
        }
    }

}

/// The rejected task's guard has already settled the job.
fn rejected(id: &str, e: PoolError) -> OrchestratorError {
    warn!(job_id = %id, error = %e, "Job rejected by pool");
    e.into()
}

/// Poll until the pools have nothing queued or running, or `deadline` passes.
async fn wait_idle(pools: &[&WorkerPool], deadline: Instant) -> bool {
    loop {
        let busy: usize = pools
            .iter()
            .map(|pool| {
                let status = pool.status();
                status.active_jobs + status.queued_jobs
            })
            .sum();
        if busy == 0 {
            return true;
        }
        if Instant::now() >= deadline {
            warn!(busy, "Shutdown grace period elapsed with tasks still pending");
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

impl<E: ConversionExecutor + 'static> Shared<E> {
    fn job_dir(&self, id: &str) -> std::path::PathBuf {
        self.config.work_dir.join(id)
    }

    fn output_dir(&self, id: &str) -> std::path::PathBuf {
        self.job_dir(id).join("output")
    }

    fn enqueue_download(this: &Arc<Self>, id: String, url: String) -> Result<(), PoolError> {
        let guard = JobGuard::new(this, &id);
        let task = Arc::clone(this);
        this.pools
            .download
            .submit(format!("download:{}", id), task.acquire(id, url, guard))
    }

    fn enqueue_convert(this: &Arc<Self>, id: String, item: WorkItem) -> Result<(), PoolError> {
        let guard = JobGuard::new(this, &id);
        let task = Arc::clone(this);
        this.pools
            .convert
            .submit(format!("convert:{}", id), task.convert(id, item, guard))
    }

    /// Download step. Failures end the job without passing `Processing`.
    async fn acquire(self: Arc<Self>, id: String, url: String, mut guard: JobGuard<E>) {
        guard.start();
        let input_dir = self.job_dir(&id).join("input");
        debug!(job_id = %id, url = %url, "Downloading input");

        match self.downloader.fetch(&url, &input_dir).await {
            Ok(input_path) => {
                metrics::DOWNLOADS.with_label_values(&["success"]).inc();
                // The conversion task settles the job from here, queued or not.
                guard.release();
                let item = WorkItem {
                    input_path,
                    output_dir: self.output_dir(&id),
                };
                if let Err(e) = Self::enqueue_convert(&self, id.clone(), item) {
                    warn!(job_id = %id, error = %e, "Downloaded job not queued for conversion");
                }
            }
            Err(e) => {
                let result = match e {
                    DownloadError::TooLarge { .. } => "too_large",
                    _ => "failed",
                };
                metrics::DOWNLOADS.with_label_values(&[result]).inc();
                warn!(job_id = %id, url = %url, error = %e, "Input download failed");
                self.record_error(&id, e.code(), &e.to_string());
            }
        }
    }

    /// Conversion step, run on the convert pool.
    async fn convert(self: Arc<Self>, id: String, item: WorkItem, mut guard: JobGuard<E>) {
        let record = match self.store.get(&id) {
            Ok(record) => record,
            Err(e) => {
                warn!(job_id = %id, error = %e, "Dispatched job cannot be loaded");
                guard.release();
                return;
            }
        };

        if let Err(e) = self.store.update_state(&id, JobState::Processing) {
            warn!(job_id = %id, error = %e, "Dispatched job cannot start processing");
            guard.release();
            return;
        }

        // From here on the job is alive and owned by this task.
        guard.start();

        if let Err(e) = tokio::fs::create_dir_all(&item.output_dir).await {
            self.record_error(
                &id,
                error_codes::CONVERSION_FAILED,
                &format!("cannot create output directory: {}", e),
            );
            return;
        }

        let ctx = ConversionContext {
            job_id: id.clone(),
            settings: record.settings,
            input_path: item.input_path,
            output_dir: item.output_dir,
            context_url: self.config.context_url.clone(),
        };
        let handle = JobHandle::new(id.clone(), Arc::clone(&self.store));

        info!(job_id = %id, executor = %self.executor.name(), "Conversion started");
        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.executor.execute(ctx, handle))
            .catch_unwind()
            .await;
        let elapsed = started.elapsed().as_secs_f64();

        match outcome {
            Ok(Ok(())) => {
                metrics::CONVERSION_DURATION
                    .with_label_values(&["success"])
                    .observe(elapsed);
                match self.store.update_state(&id, JobState::Processed) {
                    Ok(()) => {}
                    Err(JobStoreError::InvalidTransition { from, .. }) => {
                        debug!(job_id = %id, state = %from, "Executor already settled the job");
                    }
                    Err(e) => error!(job_id = %id, error = %e, "Failed to mark job processed"),
                }
            }
            Ok(Err(e)) => {
                metrics::CONVERSION_DURATION
                    .with_label_values(&["failed"])
                    .observe(elapsed);
                warn!(job_id = %id, code = e.code(), error = %e, "Conversion failed");
                self.record_error(&id, e.code(), &e.job_message());
            }
            Err(panic) => {
                metrics::CONVERSION_DURATION
                    .with_label_values(&["panicked"])
                    .observe(elapsed);
                let message = format!("conversion panicked: {}", panic_message(panic.as_ref()));
                error!(job_id = %id, "{}", message);
                self.record_error(&id, error_codes::CONVERSION_FAILED, &message);
            }
        }
    }

    /// Move a live job to `Error`. A job that is already terminal keeps its outcome.
    fn record_error(&self, id: &str, code: u32, message: &str) {
        match self.store.update_error(id, code, message) {
            Ok(()) => {}
            Err(JobStoreError::InvalidTransition { from, .. }) => {
                debug!(job_id = %id, state = %from, code, "Job already terminal, error not recorded");
            }
            Err(e) => error!(job_id = %id, code, error = %e, "Failed to record job error"),
        }
    }

    /// Make the job terminal if it is not, then post its snapshot.
    fn finalize(&self, id: &str) {
        let mut record = match self.store.get(id) {
            Ok(record) => record,
            Err(e) => {
                warn!(job_id = %id, error = %e, "Cannot finalize job");
                return;
            }
        };

        if record.is_alive() {
            warn!(job_id = %id, state = %record.state, "Job still alive at finalization");
            self.record_error(id, error_codes::CONVERSION_FAILED, "conversion ended without a result");
            record = match self.store.get(id) {
                Ok(record) => record,
                Err(e) => {
                    warn!(job_id = %id, error = %e, "Cannot finalize job");
                    return;
                }
            };
        }

        metrics::JOBS_FINISHED
            .with_label_values(&[record.state.as_str()])
            .inc();
        if let Some(err) = &record.error {
            metrics::JOB_ERRORS
                .with_label_values(&[err.code.to_string().as_str()])
                .inc();
        }
        info!(job_id = %id, state = %record.state, "Job finished");

        if let Some(url) = &record.callback_url {
            if let Err(e) = self.callbacks.deliver(url, record.snapshot()) {
                warn!(job_id = %id, error = %e, "Callback not queued");
            }
        }
    }
}

/// Settles a job when the task carrying it ends, however it ends.
///
/// Created when the task is queued, so a task dropped before it ever ran
/// still leaves its job terminal and posts the callback.
struct JobGuard<E: ConversionExecutor + 'static> {
    shared: Arc<Shared<E>>,
    id: String,
    started: bool,
    released: bool,
}

impl<E: ConversionExecutor + 'static> JobGuard<E> {
    fn new(shared: &Arc<Shared<E>>, id: &str) -> Self {
        Self {
            shared: Arc::clone(shared),
            id: id.to_string(),
            started: false,
            released: false,
        }
    }

    fn start(&mut self) {
        self.started = true;
    }

    /// Leave the job to another owner; dropping the guard does nothing.
    fn release(&mut self) {
        self.released = true;
    }
}

impl<E: ConversionExecutor + 'static> Drop for JobGuard<E> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if !self.started {
            debug!(job_id = %self.id, "Queued task dropped before it ran");
            self.shared
                .record_error(&self.id, error_codes::CONVERSION_FAILED, "job not run: shutdown");
        }
        self.shared.finalize(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::CallbackConfig;
    use crate::download::DownloadConfig;
    use crate::job::{CustomValue, MemoryJobStore};
    use crate::pool::PoolsConfig;
    use crate::testing::MockExecutor;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn build(work: &TempDir, executor: MockExecutor) -> Orchestrator<MockExecutor> {
        let pools = WorkerPools::new(&PoolsConfig::default());
        let callbacks =
            CallbackDispatcher::new(&CallbackConfig::default(), pools.callback.clone()).unwrap();
        Orchestrator::new(
            OrchestratorConfig::default().with_work_dir(work.path()),
            Arc::new(MemoryJobStore::new()),
            executor,
            pools,
            Downloader::new(DownloadConfig::default()).unwrap(),
            callbacks,
        )
    }

    async fn wait_terminal(orchestrator: &Orchestrator<MockExecutor>, id: &str) -> JobSnapshot {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let snapshot = orchestrator.get(id).unwrap();
            if !snapshot.is_alive() {
                return snapshot;
            }
            assert!(Instant::now() < deadline, "job {} never finished", id);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_create_job_is_queued() {
        let work = TempDir::new().unwrap();
        let orchestrator = build(&work, MockExecutor::new());

        let id = orchestrator
            .create_job(CreateJobRequest::new(BTreeMap::new()))
            .unwrap();
        let snapshot = orchestrator.get(&id).unwrap();
        assert_eq!(snapshot.state, JobState::Queued);
        assert!(snapshot.is_alive());
    }

    #[tokio::test]
    async fn test_get_unknown_job() {
        let work = TempDir::new().unwrap();
        let orchestrator = build(&work, MockExecutor::new());
        assert!(matches!(
            orchestrator.get("missing"),
            Err(OrchestratorError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_dispatch_requires_running() {
        let work = TempDir::new().unwrap();
        let orchestrator = build(&work, MockExecutor::new());
        let id = orchestrator.create_job(CreateJobRequest::default()).unwrap();

        let item = WorkItem {
            input_path: work.path().join("in"),
            output_dir: work.path().join("out"),
        };
        assert!(matches!(
            orchestrator.dispatch(&id, item),
            Err(OrchestratorError::NotRunning)
        ));
        assert_eq!(orchestrator.get(&id).unwrap().state, JobState::Queued);
    }

    #[tokio::test]
    async fn test_dispatch_success_sets_processed() {
        let work = TempDir::new().unwrap();
        let executor = MockExecutor::new().with_custom_value("pages", "10");
        let orchestrator = build(&work, executor);
        orchestrator.start();

        let id = orchestrator.create_job(CreateJobRequest::default()).unwrap();
        let item = WorkItem {
            input_path: work.path().join("in.docx"),
            output_dir: work.path().join(&id).join("output"),
        };
        orchestrator.dispatch(&id, item.clone()).unwrap();

        let snapshot = wait_terminal(&orchestrator, &id).await;
        assert_eq!(snapshot.state, JobState::Processed);
        assert_eq!(
            snapshot.custom_values.get("pages"),
            Some(&CustomValue::from("10"))
        );
        assert!(item.output_dir.is_dir());

        let calls = orchestrator.executor().recorded_calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].input_path, item.input_path);

        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_second_dispatch_is_ignored() {
        let work = TempDir::new().unwrap();
        let orchestrator = build(&work, MockExecutor::new());
        orchestrator.start();

        let id = orchestrator.create_job(CreateJobRequest::default()).unwrap();
        let item = WorkItem {
            input_path: work.path().join("in"),
            output_dir: work.path().join("out"),
        };
        orchestrator.dispatch(&id, item.clone()).unwrap();
        wait_terminal(&orchestrator, &id).await;
        orchestrator.dispatch(&id, item).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(orchestrator.executor().call_count().await, 1);
        assert_eq!(orchestrator.get(&id).unwrap().state, JobState::Processed);

        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_rejected_dispatch_settles_job() {
        let work = TempDir::new().unwrap();
        let orchestrator = build(&work, MockExecutor::new());
        orchestrator.start();
        orchestrator.shared.pools.convert.shutdown();

        let id = orchestrator.create_job(CreateJobRequest::default()).unwrap();
        let item = WorkItem {
            input_path: work.path().join("in"),
            output_dir: work.path().join("out"),
        };
        assert!(matches!(
            orchestrator.dispatch(&id, item),
            Err(OrchestratorError::Pool(_))
        ));

        let snapshot = orchestrator.get(&id).unwrap();
        assert_eq!(snapshot.state, JobState::Error);
        assert_eq!(
            snapshot.error,
            Some(crate::job::JobError::new(1000, "job not run: shutdown"))
        );
        assert_eq!(orchestrator.executor().call_count().await, 0);

        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work() {
        let work = TempDir::new().unwrap();
        let orchestrator = build(&work, MockExecutor::new());
        orchestrator.start();
        orchestrator.shutdown().await;

        let status = orchestrator.status();
        assert!(!status.running);
        assert!(matches!(
            orchestrator.accept(
                CreateJobRequest::default(),
                JobInput::Url {
                    url: "http://127.0.0.1:9/x".to_string()
                }
            ),
            Err(OrchestratorError::NotRunning)
        ));
        assert_eq!(status.jobs, 0);
    }
}

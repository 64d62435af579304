//! Semaphore-bounded worker pool fed by an unbounded queue.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use super::types::{PoolError, PoolStatus};

/// A unit of work waiting for a worker.
struct Submission {
    label: String,
    task: BoxFuture<'static, ()>,
}

/// Tracks statistics for a worker pool.
#[derive(Default)]
struct PoolStats {
    active: AtomicU64,
    queued: AtomicU64,
    scheduled: AtomicU64,
    total_processed: AtomicU64,
    total_failed: AtomicU64,
}

impl PoolStats {
    fn to_status(&self, name: &str, max_concurrent: usize) -> PoolStatus {
        PoolStatus {
            name: name.to_string(),
            active_jobs: self.active.load(Ordering::Relaxed) as usize,
            max_concurrent,
            queued_jobs: self.queued.load(Ordering::Relaxed) as usize,
            scheduled_jobs: self.scheduled.load(Ordering::Relaxed) as usize,
            total_processed: self.total_processed.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
        }
    }
}

struct Inner {
    name: String,
    max_concurrent: usize,
    tx: mpsc::UnboundedSender<Submission>,
    stats: Arc<PoolStats>,
    shutdown: CancellationToken,
}

/// Bounded pool of tokio tasks.
///
/// Cheaply cloneable; all clones share one queue. A dispatcher task drains
/// the queue, holding one semaphore permit per running task. A task that
/// panics is counted as failed and does not take the pool down.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<Inner>,
}

impl WorkerPool {
    /// Create a pool and spawn its dispatcher. Must be called inside a runtime.
    pub fn new(name: impl Into<String>, max_concurrent: usize) -> Self {
        let name = name.into();
        let max_concurrent = max_concurrent.max(1);
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(PoolStats::default());
        let shutdown = CancellationToken::new();

        tokio::spawn(run_dispatcher(
            name.clone(),
            rx,
            Arc::new(Semaphore::new(max_concurrent)),
            Arc::clone(&stats),
            shutdown.clone(),
        ));

        tracing::debug!(pool = %name, max_concurrent, "Worker pool started");

        Self {
            inner: Arc::new(Inner {
                name,
                max_concurrent,
                tx,
                stats,
                shutdown,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Queue a task. Never waits for a free worker.
    pub fn submit<F>(&self, label: impl Into<String>, task: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.inner.shutdown.is_cancelled() {
            return Err(PoolError::ShutDown(self.inner.name.clone()));
        }

        self.inner.stats.queued.fetch_add(1, Ordering::Relaxed);
        let submission = Submission {
            label: label.into(),
            task: task.boxed(),
        };
        if self.inner.tx.send(submission).is_err() {
            self.inner.stats.queued.fetch_sub(1, Ordering::Relaxed);
            return Err(PoolError::ShutDown(self.inner.name.clone()));
        }
        Ok(())
    }

    /// Queue a task once `delay` has elapsed.
    ///
    /// The timer is a sleeping task, not a held worker. Pending timers are
    /// dropped when the pool shuts down.
    pub fn submit_after<F>(
        &self,
        delay: Duration,
        label: impl Into<String>,
        task: F,
    ) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.inner.shutdown.is_cancelled() {
            return Err(PoolError::ShutDown(self.inner.name.clone()));
        }

        let label = label.into();
        let pool = self.clone();
        let token = self.inner.shutdown.clone();
        self.inner.stats.scheduled.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(pool = %pool.name(), task = %label, "Delayed task dropped on shutdown");
                }
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = pool.submit(label.clone(), task) {
                        tracing::debug!(task = %label, error = %e, "Delayed task not submitted");
                    }
                }
            }
            pool.inner.stats.scheduled.fetch_sub(1, Ordering::Relaxed);
        });

        Ok(())
    }

    /// Stop accepting work, drop queued tasks and pending timers.
    ///
    /// Tasks already running are left to finish. A dropped task's future is
    /// never polled, but its captured values are dropped.
    pub fn shutdown(&self) {
        if !self.inner.shutdown.is_cancelled() {
            tracing::debug!(pool = %self.inner.name, "Worker pool shutting down");
            self.inner.shutdown.cancel();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    pub fn status(&self) -> PoolStatus {
        self.inner
            .stats
            .to_status(&self.inner.name, self.inner.max_concurrent)
    }
}

async fn run_dispatcher(
    name: String,
    mut rx: mpsc::UnboundedReceiver<Submission>,
    semaphore: Arc<Semaphore>,
    stats: Arc<PoolStats>,
    shutdown: CancellationToken,
) {
    loop {
        let submission = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = rx.recv() => match next {
                Some(submission) => submission,
                None => break,
            },
        };

        let permit = tokio::select! {
            _ = shutdown.cancelled() => {
                drop(submission);
                break;
            }
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        stats.queued.fetch_sub(1, Ordering::Relaxed);
        stats.active.fetch_add(1, Ordering::Relaxed);

        let stats = Arc::clone(&stats);
        let pool = name.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let outcome = AssertUnwindSafe(submission.task).catch_unwind().await;
            stats.active.fetch_sub(1, Ordering::Relaxed);
            match outcome {
                Ok(()) => {
                    stats.total_processed.fetch_add(1, Ordering::Relaxed);
                }
                Err(panic) => {
                    stats.total_failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        pool = %pool,
                        task = %submission.label,
                        "Task panicked: {}",
                        panic_message(panic.as_ref())
                    );
                }
            }
        });
    }

    // Queued tasks are dropped unpolled; whatever they own is released
    // before the queue reads as empty.
    rx.close();
    let mut dropped = 0usize;
    while let Ok(submission) = rx.try_recv() {
        tracing::debug!(pool = %name, task = %submission.label, "Queued task dropped on shutdown");
        drop(submission);
        dropped += 1;
    }
    stats.queued.store(0, Ordering::Relaxed);
    tracing::debug!(pool = %name, dropped, "Worker pool dispatcher stopped");
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    async fn wait_until(pool: &WorkerPool, check: impl Fn(&PoolStatus) -> bool) -> PoolStatus {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let status = pool.status();
            if check(&status) {
                return status;
            }
            if Instant::now() > deadline {
                panic!("Timeout waiting for pool status, last: {:?}", status);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new("convert", 2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for i in 0..8 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.submit(format!("task-{}", i), async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        let status = wait_until(&pool, |s| s.total_processed == 8).await;
        assert_eq!(status.active_jobs, 0);
        assert_eq!(status.queued_jobs, 0);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_submit_does_not_block_when_saturated() {
        let pool = WorkerPool::new("download", 1);
        let started = Instant::now();
        for _ in 0..100 {
            pool.submit("slow", tokio::time::sleep(Duration::from_millis(50)))
                .unwrap();
        }
        assert!(started.elapsed() < Duration::from_millis(50));
        assert!(pool.status().queued_jobs >= 98);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_panicking_task_counts_as_failed() {
        let pool = WorkerPool::new("convert", 1);
        pool.submit("boom", async { panic!("executor blew up") })
            .unwrap();
        pool.submit("fine", async {}).unwrap();

        let status = wait_until(&pool, |s| s.total_processed + s.total_failed == 2).await;
        assert_eq!(status.total_failed, 1);
        assert_eq!(status.total_processed, 1);
    }

    #[tokio::test]
    async fn test_submit_after_waits_for_delay() {
        let pool = WorkerPool::new("callback", 1);
        let fired_at = Arc::new(std::sync::Mutex::new(None));
        let start = Instant::now();

        let slot = Arc::clone(&fired_at);
        pool.submit_after(Duration::from_millis(100), "retry", async move {
            *slot.lock().unwrap() = Some(Instant::now());
        })
        .unwrap();
        assert_eq!(pool.status().scheduled_jobs, 1);

        wait_until(&pool, |s| s.total_processed == 1).await;
        let fired = fired_at.lock().unwrap().unwrap();
        assert!(fired.duration_since(start) >= Duration::from_millis(100));
        assert_eq!(pool.status().scheduled_jobs, 0);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_and_cancels() {
        let pool = WorkerPool::new("callback", 1);
        let ran = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&ran);
        pool.submit_after(Duration::from_millis(50), "retry", async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        pool.shutdown();
        assert!(pool.is_shut_down());
        assert!(matches!(
            pool.submit("late", async {}),
            Err(PoolError::ShutDown(_))
        ));

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(pool.status().scheduled_jobs, 0);
    }

    /// Sets its flag when dropped.
    struct DropFlag(Arc<AtomicUsize>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_shutdown_drops_queued_tasks() {
        let pool = WorkerPool::new("convert", 1);
        let ran = Arc::new(AtomicUsize::new(0));
        let dropped = Arc::new(AtomicUsize::new(0));

        pool.submit("busy", tokio::time::sleep(Duration::from_millis(100)))
            .unwrap();
        for i in 0..3 {
            let flag = DropFlag(Arc::clone(&dropped));
            let ran = Arc::clone(&ran);
            pool.submit(format!("queued-{}", i), async move {
                let _flag = flag;
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        wait_until(&pool, |s| s.active_jobs == 1).await;

        pool.shutdown();
        wait_until(&pool, |s| s.queued_jobs == 0).await;
        assert_eq!(dropped.load(Ordering::SeqCst), 3);
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        let status = wait_until(&pool, |s| s.active_jobs == 0 && s.total_processed == 1).await;
        assert_eq!(status.total_failed, 0);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}

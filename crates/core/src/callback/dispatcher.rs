//! Callback dispatcher implementation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use super::CallbackConfig;
use crate::job::JobSnapshot;
use crate::metrics;
use crate::pool::{PoolError, WorkerPool};

/// Error type for callback setup and enqueueing.
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    /// HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    /// The callback pool no longer accepts work.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Delivery counters since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackStats {
    /// HTTP attempts made, retries included.
    pub attempts: u64,
    /// Snapshots acknowledged with a success status.
    pub delivered: u64,
    /// Snapshots dropped after the last attempt failed.
    pub abandoned: u64,
}

#[derive(Default)]
struct Counters {
    attempts: AtomicU64,
    delivered: AtomicU64,
    abandoned: AtomicU64,
}

/// Posts job snapshots to client callback URLs on the callback pool.
pub struct CallbackDispatcher {
    client: reqwest::Client,
    pool: WorkerPool,
    max_attempts: u32,
    retry_delay: Duration,
    counters: Arc<Counters>,
}

impl CallbackDispatcher {
    pub fn new(config: &CallbackConfig, pool: WorkerPool) -> Result<Self, CallbackError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            pool,
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay(),
            counters: Arc::new(Counters::default()),
        })
    }

    /// Override the delay between attempts.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Enqueue delivery of `snapshot`. Every retry resends this same snapshot.
    pub fn deliver(&self, url: &str, snapshot: JobSnapshot) -> Result<(), CallbackError> {
        let delivery = Delivery {
            client: self.client.clone(),
            pool: self.pool.clone(),
            url: Arc::from(url),
            payload: Arc::new(snapshot),
            attempt: 1,
            max_attempts: self.max_attempts,
            retry_delay: self.retry_delay,
            counters: Arc::clone(&self.counters),
        };

        let label = delivery.label();
        self.pool.submit(label, delivery.run())?;
        Ok(())
    }

    pub fn stats(&self) -> CallbackStats {
        CallbackStats {
            attempts: self.counters.attempts.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            abandoned: self.counters.abandoned.load(Ordering::Relaxed),
        }
    }
}

/// One scheduled POST of a captured snapshot.
#[derive(Clone)]
struct Delivery {
    client: reqwest::Client,
    pool: WorkerPool,
    url: Arc<str>,
    payload: Arc<JobSnapshot>,
    attempt: u32,
    max_attempts: u32,
    retry_delay: Duration,
    counters: Arc<Counters>,
}

impl Delivery {
    fn label(&self) -> String {
        format!("callback:{}#{}", self.payload.id, self.attempt)
    }

    /// Boxed so a retry can schedule another `run` of the same type.
    fn run(self) -> BoxFuture<'static, ()> {
        async move {
            self.counters.attempts.fetch_add(1, Ordering::Relaxed);

            let failure = match self
                .client
                .post(&*self.url)
                .json(self.payload.as_ref())
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => None,
                Ok(response) => Some(format!("HTTP {}", response.status())),
                Err(e) => Some(e.to_string()),
            };

            let Some(reason) = failure else {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                metrics::CALLBACK_ATTEMPTS
                    .with_label_values(&["success"])
                    .inc();
                tracing::debug!(
                    job_id = %self.payload.id,
                    attempt = self.attempt,
                    "Callback delivered"
                );
                return;
            };

            metrics::CALLBACK_ATTEMPTS
                .with_label_values(&["failure"])
                .inc();

            if self.attempt >= self.max_attempts {
                self.counters.abandoned.fetch_add(1, Ordering::Relaxed);
                metrics::CALLBACKS_ABANDONED.inc();
                tracing::warn!(
                    job_id = %self.payload.id,
                    url = %self.url,
                    attempts = self.attempt,
                    reason = %reason,
                    "Giving up on callback"
                );
                return;
            }

            tracing::info!(
                job_id = %self.payload.id,
                attempt = self.attempt,
                reason = %reason,
                retry_in_secs = self.retry_delay.as_secs_f64(),
                "Callback failed, scheduling retry"
            );

            let next = Delivery {
                attempt: self.attempt + 1,
                ..self.clone()
            };
            let label = next.label();
            if let Err(e) = self
                .pool
                .submit_after(self.retry_delay, label, next.run())
            {
                tracing::warn!(job_id = %self.payload.id, error = %e, "Callback retry dropped");
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{CustomData, JobRecord, JobState};
    use std::collections::BTreeMap;
    use std::time::Instant;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn snapshot() -> JobSnapshot {
        let mut record = JobRecord::new(BTreeMap::new(), None, CustomData::new());
        record.state = JobState::Processed;
        record.custom_values.set("pages", "10".into());
        record.snapshot()
    }

    async fn wait_for(dispatcher: &CallbackDispatcher, check: impl Fn(&CallbackStats) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !check(&dispatcher.stats()) {
            if Instant::now() > deadline {
                panic!("Timeout waiting for callback stats: {:?}", dispatcher.stats());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_delivers_snapshot_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let pool = WorkerPool::new("callback", 2);
        let dispatcher = CallbackDispatcher::new(&CallbackConfig::default(), pool).unwrap();
        let snapshot = snapshot();
        dispatcher
            .deliver(&format!("{}/hook", server.uri()), snapshot.clone())
            .unwrap();

        wait_for(&dispatcher, |s| s.delivered == 1).await;

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["id"], snapshot.id.as_str());
        assert_eq!(body["state"], "processed");
        assert_eq!(body["pages"], "10");
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let pool = WorkerPool::new("callback", 1);
        let config = CallbackConfig::default().with_max_attempts(2);
        let dispatcher = CallbackDispatcher::new(&config, pool)
            .unwrap()
            .with_retry_delay(Duration::from_millis(20));
        dispatcher.deliver(&server.uri(), snapshot()).unwrap();

        wait_for(&dispatcher, |s| s.abandoned == 1).await;
        assert_eq!(
            dispatcher.stats(),
            CallbackStats {
                attempts: 2,
                delivered: 0,
                abandoned: 1
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_retried() {
        let pool = WorkerPool::new("callback", 1);
        let dispatcher = CallbackDispatcher::new(&CallbackConfig::default(), pool)
            .unwrap()
            .with_retry_delay(Duration::from_millis(10));
        dispatcher
            .deliver("http://127.0.0.1:9/unreachable", snapshot())
            .unwrap();

        wait_for(&dispatcher, |s| s.abandoned == 1).await;
        assert_eq!(dispatcher.stats().attempts, 3);
    }

    #[tokio::test]
    async fn test_deliver_after_shutdown_fails() {
        let pool = WorkerPool::new("callback", 1);
        let dispatcher = CallbackDispatcher::new(&CallbackConfig::default(), pool.clone()).unwrap();
        pool.shutdown();

        let result = dispatcher.deliver("http://127.0.0.1:9/", snapshot());
        assert!(matches!(result, Err(CallbackError::Pool(_))));
    }
}

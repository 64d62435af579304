//! Mock conversion executor for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::converter::{ConversionContext, ConversionError, ConversionExecutor};
use crate::job::{CustomValue, JobHandle};

/// What the mock does once its delay has elapsed.
#[derive(Debug, Clone)]
enum Outcome {
    Succeed,
    Fail { code: u32, message: String },
    /// Report through the handle, then return `Ok`.
    Report { code: u32, message: String },
    Panic(String),
}

/// Mock implementation of the ConversionExecutor trait.
///
/// Provides controllable behavior for testing:
/// - Record every context it is handed
/// - Set custom values on the job
/// - Fail with a code, report an error through the handle, or panic
/// - Hold each conversion for a fixed delay
///
/// # Example
///
/// ```rust,ignore
/// use convoy_core::testing::MockExecutor;
///
/// let executor = MockExecutor::new()
///     .with_custom_value("pages", "10")
///     .with_delay(Duration::from_millis(50));
///
/// // Hand it to an Orchestrator, run jobs, then:
/// let calls = executor.recorded_calls().await;
/// assert_eq!(calls.len(), 1);
/// ```
#[derive(Debug)]
pub struct MockExecutor {
    custom_values: Vec<(String, CustomValue)>,
    delay: Duration,
    outcome: Outcome,
    /// Contexts seen, in call order.
    calls: Arc<RwLock<Vec<ConversionContext>>>,
    /// If set, the next conversion fails with this error.
    next_error: Arc<RwLock<Option<ConversionError>>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExecutor {
    /// Create a mock that succeeds immediately.
    pub fn new() -> Self {
        Self {
            custom_values: Vec::new(),
            delay: Duration::ZERO,
            outcome: Outcome::Succeed,
            calls: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Set `key` on every job before finishing.
    pub fn with_custom_value(mut self, key: &str, value: impl Into<CustomValue>) -> Self {
        self.custom_values.push((key.to_string(), value.into()));
        self
    }

    /// Simulated conversion time.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail every conversion with `code`.
    pub fn failing(mut self, code: u32, message: &str) -> Self {
        self.outcome = Outcome::Fail {
            code,
            message: message.to_string(),
        };
        self
    }

    /// Call `do_error` on the handle, then return `Ok`.
    pub fn reporting_error(mut self, code: u32, message: &str) -> Self {
        self.outcome = Outcome::Report {
            code,
            message: message.to_string(),
        };
        self
    }

    /// Panic in every conversion.
    pub fn panicking(mut self, message: &str) -> Self {
        self.outcome = Outcome::Panic(message.to_string());
        self
    }

    /// Configure the next conversion to fail with the given error.
    pub async fn set_next_error(&self, error: ConversionError) {
        *self.next_error.write().await = Some(error);
    }

    /// Get all recorded calls.
    pub async fn recorded_calls(&self) -> Vec<ConversionContext> {
        self.calls.read().await.clone()
    }

    /// Get the number of conversions started.
    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    /// Highest number of conversions that ran at the same time.
    pub fn max_concurrent_seen(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

/// Decrements the active count even if the conversion panics.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConversionExecutor for MockExecutor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, ctx: ConversionContext, job: JobHandle) -> Result<(), ConversionError> {
        self.calls.write().await.push(ctx);

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _active = ActiveGuard(Arc::clone(&self.active));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }

        for (key, value) in &self.custom_values {
            job.set_custom_value(key, value.clone());
        }

        match &self.outcome {
            Outcome::Succeed => Ok(()),
            Outcome::Fail { code, message } => Err(ConversionError::coded(*code, message.clone())),
            Outcome::Report { code, message } => {
                job.do_error(*code, message);
                Ok(())
            }
            Outcome::Panic(message) => panic!("{}", message),
        }
    }
}

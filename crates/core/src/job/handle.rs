use std::sync::Arc;

use super::{CustomValue, JobState, JobStore};

/// Handle through which a conversion executor reports on its job.
///
/// This is cheaply cloneable and can be moved into spawned tasks. Store
/// failures are logged but never returned: the executor owns no recovery.
#[derive(Clone)]
pub struct JobHandle {
    id: String,
    store: Arc<dyn JobStore>,
}

impl JobHandle {
    pub fn new(id: impl Into<String>, store: Arc<dyn JobStore>) -> Self {
        Self {
            id: id.into(),
            store,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Attach a value that will be echoed to pollers and callbacks.
    pub fn set_custom_value(&self, key: &str, value: impl Into<CustomValue>) {
        if let Err(e) = self.store.set_custom_value(&self.id, key, value.into()) {
            tracing::warn!(job_id = %self.id, key = %key, error = %e, "Failed to set custom value");
        }
    }

    /// Mark the job as failed. Later success is ignored.
    pub fn do_error(&self, code: u32, message: &str) {
        if let Err(e) = self.store.update_error(&self.id, code, message) {
            tracing::warn!(job_id = %self.id, code, error = %e, "Failed to record job error");
        }
    }

    /// Request a state change. Terminal states stay terminal.
    pub fn set_state(&self, state: JobState) {
        if state == JobState::Error {
            self.do_error(super::error_codes::CONVERSION_FAILED, "conversion failed");
            return;
        }
        if let Err(e) = self.store.update_state(&self.id, state) {
            tracing::warn!(job_id = %self.id, state = %state, error = %e, "Failed to set job state");
        }
    }
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.id)
            .field("store", &self.store.name())
            .finish()
    }
}

//! Job storage trait and shared helpers.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{CustomValue, JobRecord, JobState};

/// Error type for job store operations.
#[derive(Debug, Error)]
pub enum JobStoreError {
    /// No record with this id.
    #[error("job not found: {0}")]
    NotFound(String),

    /// A record with this id already exists.
    #[error("job already exists: {0}")]
    Duplicate(String),

    /// The state machine does not allow this move.
    #[error("invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: JobState,
        to: JobState,
    },

    /// Backend failure (store unavailable, corrupt row, poisoned lock).
    #[error("database error: {0}")]
    Database(String),
}

/// Persistence for job records.
///
/// Mutations on a single id are linearizable; `get` returns a fully formed
/// copy. Every accessor except `get` treats an unknown id as a no-op.
pub trait JobStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Insert a new record.
    fn put(&self, record: JobRecord) -> Result<(), JobStoreError>;

    /// Fetch a copy of a record.
    fn get(&self, id: &str) -> Result<JobRecord, JobStoreError>;

    /// Move a job to `Processing` or `Processed`. Use `update_error` for failures.
    fn update_state(&self, id: &str, state: JobState) -> Result<(), JobStoreError>;

    /// Move a job to `Error`, recording code and message together.
    fn update_error(&self, id: &str, code: u32, message: &str) -> Result<(), JobStoreError>;

    /// Set one custom value (last writer wins per key).
    fn set_custom_value(
        &self,
        id: &str,
        key: &str,
        value: CustomValue,
    ) -> Result<(), JobStoreError>;

    /// Remove every record created strictly before `cutoff`. Returns how many went.
    fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, JobStoreError>;

    /// Number of stored records.
    fn count(&self) -> Result<usize, JobStoreError>;
}

/// Validate a `update_state` request against the state machine.
pub(crate) fn check_transition(
    job_id: &str,
    from: JobState,
    to: JobState,
) -> Result<(), JobStoreError> {
    if to == JobState::Error || !from.can_transition_to(to) {
        return Err(JobStoreError::InvalidTransition {
            job_id: job_id.to_string(),
            from,
            to,
        });
    }
    Ok(())
}

/// Validate a `update_error` request against the state machine.
pub(crate) fn check_error_transition(job_id: &str, from: JobState) -> Result<(), JobStoreError> {
    if !from.can_transition_to(JobState::Error) {
        return Err(JobStoreError::InvalidTransition {
            job_id: job_id.to_string(),
            from,
            to: JobState::Error,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_must_go_through_update_error() {
        let result = check_transition("j", JobState::Processing, JobState::Error);
        assert!(matches!(result, Err(JobStoreError::InvalidTransition { .. })));
        assert!(check_error_transition("j", JobState::Processing).is_ok());
    }

    #[test]
    fn test_terminal_states_are_final() {
        assert!(check_transition("j", JobState::Processed, JobState::Processing).is_err());
        assert!(check_error_transition("j", JobState::Processed).is_err());
        assert!(check_error_transition("j", JobState::Error).is_err());
    }

    #[test]
    fn test_error_display() {
        let err = JobStoreError::InvalidTransition {
            job_id: "job-1".to_string(),
            from: JobState::Processed,
            to: JobState::Processing,
        };
        assert_eq!(
            err.to_string(),
            "invalid transition for job job-1: processed -> processing"
        );
    }
}

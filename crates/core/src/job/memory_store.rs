//! In-process job store.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::store::{check_error_transition, check_transition};
use super::{CustomValue, JobError, JobRecord, JobState, JobStore, JobStoreError};

/// Sharded concurrent map of job records. Single instance, no durability.
///
/// Each mutation holds only the shard lock of its id, so jobs on different
/// shards never contend.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: DashMap<String, JobRecord>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn put(&self, record: JobRecord) -> Result<(), JobStoreError> {
        match self.jobs.entry(record.id.clone()) {
            Entry::Occupied(_) => Err(JobStoreError::Duplicate(record.id)),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    fn get(&self, id: &str) -> Result<JobRecord, JobStoreError> {
        self.jobs
            .get(id)
            .map(|job| job.value().clone())
            .ok_or_else(|| JobStoreError::NotFound(id.to_string()))
    }

    fn update_state(&self, id: &str, state: JobState) -> Result<(), JobStoreError> {
        if let Some(mut job) = self.jobs.get_mut(id) {
            check_transition(id, job.state, state)?;
            job.state = state;
        }
        Ok(())
    }

    fn update_error(&self, id: &str, code: u32, message: &str) -> Result<(), JobStoreError> {
        if let Some(mut job) = self.jobs.get_mut(id) {
            check_error_transition(id, job.state)?;
            job.state = JobState::Error;
            job.error = Some(JobError::new(code, message));
        }
        Ok(())
    }

    fn set_custom_value(
        &self,
        id: &str,
        key: &str,
        value: CustomValue,
    ) -> Result<(), JobStoreError> {
        if let Some(mut job) = self.jobs.get_mut(id) {
            job.custom_values.set(key, value);
        }
        Ok(())
    }

    fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, JobStoreError> {
        let mut removed = 0;
        self.jobs.retain(|job_id, job| {
            if job.created_at < cutoff {
                tracing::debug!(job_id = %job_id, state = %job.state, "Expired job removed");
                removed += 1;
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    fn count(&self) -> Result<usize, JobStoreError> {
        Ok(self.jobs.len())
    }
}

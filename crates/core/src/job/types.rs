//! Job record, state machine and client-visible snapshot.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Lifecycle state of a conversion job.
///
/// ```text
/// Queued -> Processing -> Processed
///    |           |
///    +-----------+------> Error
/// ```
///
/// `Queued -> Error` only happens while the input is being acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Accepted, waiting for a worker.
    Queued,
    /// A conversion worker owns the job.
    Processing,
    /// Conversion finished successfully.
    Processed,
    /// Terminal failure, see the job's error.
    Error,
}

impl JobState {
    /// Lowercase name as exposed to clients and persisted.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Processed => "processed",
            JobState::Error => "error",
        }
    }

    /// True while the job still has work ahead of it.
    pub fn is_alive(&self) -> bool {
        matches!(self, JobState::Queued | JobState::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_alive()
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Queued, JobState::Processing)
                | (JobState::Queued, JobState::Error)
                | (JobState::Processing, JobState::Processed)
                | (JobState::Processing, JobState::Error)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobState::Queued),
            "processing" => Ok(JobState::Processing),
            "processed" => Ok(JobState::Processed),
            "error" => Ok(JobState::Error),
            other => Err(format!("unknown job state: {}", other)),
        }
    }
}

/// Numeric code and message attached to a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub code: u32,
    pub message: String,
}

impl JobError {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Scalar value a worker can attach to a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CustomValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl From<&str> for CustomValue {
    fn from(value: &str) -> Self {
        CustomValue::Text(value.to_string())
    }
}

impl From<String> for CustomValue {
    fn from(value: String) -> Self {
        CustomValue::Text(value)
    }
}

impl From<bool> for CustomValue {
    fn from(value: bool) -> Self {
        CustomValue::Bool(value)
    }
}

impl From<i64> for CustomValue {
    fn from(value: i64) -> Self {
        CustomValue::Int(value)
    }
}

/// Insertion-ordered custom values. Setting an existing key keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomValues(Vec<(String, CustomValue)>);

impl CustomValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `key`.
    pub fn set(&mut self, key: impl Into<String>, value: CustomValue) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&CustomValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CustomValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, CustomValue)> for CustomValues {
    fn from_iter<I: IntoIterator<Item = (String, CustomValue)>>(iter: I) -> Self {
        let mut values = CustomValues::new();
        for (key, value) in iter {
            values.set(key, value);
        }
        values
    }
}

impl Serialize for CustomValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Opaque data attached at intake and passed through unchanged.
pub type CustomData = serde_json::Map<String, serde_json::Value>;

/// Mutable state of one conversion job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    /// Random 128-bit identifier in UUID form.
    pub id: String,
    pub state: JobState,
    /// Millisecond precision, so every store compares cutoffs identically.
    pub created_at: DateTime<Utc>,
    /// Set iff `state == Error`.
    pub error: Option<JobError>,
    pub custom_values: CustomValues,
    /// Conversion settings captured at creation.
    pub settings: BTreeMap<String, String>,
    pub custom_data: CustomData,
    pub callback_url: Option<String>,
}

impl JobRecord {
    /// Create a queued record with a fresh id.
    pub fn new(
        settings: BTreeMap<String, String>,
        callback_url: Option<String>,
        custom_data: CustomData,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            state: JobState::Queued,
            created_at: Utc::now().trunc_subsecs(3),
            error: None,
            custom_values: CustomValues::new(),
            settings,
            callback_url,
            custom_data,
        }
    }

    /// Override the creation time (imports, tests).
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at.trunc_subsecs(3);
        self
    }

    pub fn is_alive(&self) -> bool {
        self.state.is_alive()
    }

    /// Immutable copy of the client-visible state.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            state: self.state,
            error: self.error.clone(),
            custom_values: self.custom_values.clone(),
            custom_data: self.custom_data.clone(),
        }
    }
}

/// Keys owned by the snapshot itself; custom values never shadow them.
const RESERVED_KEYS: &[&str] = &["id", "state", "errorCode", "error", "customData"];

/// Point-in-time view of a job as returned to pollers and callbacks.
///
/// Serializes as a flat object:
/// `{"id": .., "state": "error", "errorCode": "1200", "error": "..", "pages": "10"}`.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub id: String,
    pub state: JobState,
    pub error: Option<JobError>,
    pub custom_values: CustomValues,
    pub custom_data: CustomData,
}

impl JobSnapshot {
    pub fn is_alive(&self) -> bool {
        self.state.is_alive()
    }
}

impl Serialize for JobSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("state", &self.state)?;
        if let Some(error) = &self.error {
            map.serialize_entry("errorCode", &error.code.to_string())?;
            map.serialize_entry("error", &error.message)?;
        }
        for (key, value) in self.custom_values.iter() {
            if !RESERVED_KEYS.contains(&key) {
                map.serialize_entry(key, value)?;
            }
        }
        if !self.custom_data.is_empty() {
            map.serialize_entry("customData", &self.custom_data)?;
        }
        map.end()
    }
}

//! SQLite-backed job store implementation.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{
    params, Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior,
};

use super::store::{check_error_transition, check_transition};
use super::{
    CustomData, CustomValue, CustomValues, JobError, JobRecord, JobState, JobStore, JobStoreError,
};

/// How long a writer waits for another connection's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Durable job store. One row per job plus key/value tables for settings
/// and custom values, cascade-deleted with the job row.
///
/// Several stores (or processes) may share one database file: writes take
/// the database lock up front and wait up to `BUSY_TIMEOUT` for it.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

fn db_err(e: impl std::fmt::Display) -> JobStoreError {
    JobStoreError::Database(e.to_string())
}

/// Smallest whole millisecond not earlier than `cutoff`, so that
/// `created_at_ms < ceil(cutoff)` matches `created_at < cutoff` exactly.
fn cutoff_millis(cutoff: DateTime<Utc>) -> i64 {
    let millis = cutoff.timestamp_millis();
    if cutoff.timestamp_subsec_nanos() % 1_000_000 != 0 {
        millis + 1
    } else {
        millis
    }
}

impl SqliteJobStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, JobStoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(db_err)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(db_err)?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(db_err)?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "Job database opened");
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite job store (useful for testing).
    pub fn in_memory() -> Result<Self, JobStoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), JobStoreError> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                error_code INTEGER,
                error_message TEXT,
                callback_url TEXT,
                custom_data TEXT NOT NULL DEFAULT '{}'
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at);

            CREATE TABLE IF NOT EXISTS job_settings (
                job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (job_id, key)
            );

            CREATE TABLE IF NOT EXISTS job_custom_values (
                job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
                key TEXT NOT NULL,
                position INTEGER NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (job_id, key)
            );
            "#,
        )
        .map_err(db_err)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, JobStoreError> {
        self.conn
            .lock()
            .map_err(|_| JobStoreError::Database("connection lock poisoned".to_string()))
    }

    /// Read-modify-write transaction holding the write lock from the start,
    /// so no other connection can change the row between read and write.
    fn write_tx(conn: &mut Connection) -> Result<Transaction<'_>, JobStoreError> {
        conn.transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)
    }

    fn load_state(tx: &Transaction<'_>, id: &str) -> Result<Option<JobState>, JobStoreError> {
        let state: Option<String> = tx
            .query_row("SELECT state FROM jobs WHERE id = ?", params![id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(db_err)?;

        state
            .map(|s| s.parse::<JobState>().map_err(JobStoreError::Database))
            .transpose()
    }

    fn load_record(tx: &Transaction<'_>, id: &str) -> Result<Option<JobRecord>, JobStoreError> {
        let row = tx
            .query_row(
                "SELECT state, created_at, error_code, error_message, callback_url, custom_data FROM jobs WHERE id = ?",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Option<u32>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(db_err)?;

        let Some((state, created_at, error_code, error_message, callback_url, custom_data)) = row
        else {
            return Ok(None);
        };

        let state: JobState = state.parse().map_err(JobStoreError::Database)?;
        let created_at = DateTime::<Utc>::from_timestamp_millis(created_at).ok_or_else(|| {
            JobStoreError::Database(format!("invalid created_at for job {}", id))
        })?;
        let error = error_code.map(|code| JobError::new(code, error_message.unwrap_or_default()));
        let custom_data: CustomData = serde_json::from_str(&custom_data).map_err(db_err)?;

        let mut stmt = tx
            .prepare("SELECT key, value FROM job_settings WHERE job_id = ?")
            .map_err(db_err)?;
        let settings = stmt
            .query_map(params![id], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(db_err)?
            .collect::<Result<BTreeMap<String, String>, _>>()
            .map_err(db_err)?;

        let mut stmt = tx
            .prepare("SELECT key, value FROM job_custom_values WHERE job_id = ? ORDER BY position")
            .map_err(db_err)?;
        let raw_values = stmt
            .query_map(params![id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        let mut custom_values = CustomValues::new();
        for (key, raw) in raw_values {
            let value: CustomValue = serde_json::from_str(&raw).map_err(db_err)?;
            custom_values.set(key, value);
        }

        Ok(Some(JobRecord {
            id: id.to_string(),
            state,
            created_at,
            error,
            custom_values,
            settings,
            custom_data,
            callback_url,
        }))
    }
}

impl JobStore for SqliteJobStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn put(&self, record: JobRecord) -> Result<(), JobStoreError> {
        let mut conn = self.lock()?;
        let tx = Self::write_tx(&mut conn)?;

        let custom_data = serde_json::to_string(&record.custom_data).map_err(db_err)?;
        let inserted = tx.execute(
            "INSERT INTO jobs (id, state, created_at, error_code, error_message, callback_url, custom_data) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                record.id,
                record.state.as_str(),
                record.created_at.timestamp_millis(),
                record.error.as_ref().map(|e| e.code),
                record.error.as_ref().map(|e| e.message.as_str()),
                record.callback_url,
                custom_data,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(JobStoreError::Duplicate(record.id));
            }
            Err(e) => return Err(db_err(e)),
        }

        for (key, value) in &record.settings {
            tx.execute(
                "INSERT INTO job_settings (job_id, key, value) VALUES (?, ?, ?)",
                params![record.id, key, value],
            )
            .map_err(db_err)?;
        }

        for (position, (key, value)) in record.custom_values.iter().enumerate() {
            let value = serde_json::to_string(value).map_err(db_err)?;
            tx.execute(
                "INSERT INTO job_custom_values (job_id, key, position, value) VALUES (?, ?, ?, ?)",
                params![record.id, key, position as i64, value],
            )
            .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)
    }

    fn get(&self, id: &str) -> Result<JobRecord, JobStoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;
        let record = Self::load_record(&tx, id)?;
        tx.commit().map_err(db_err)?;
        record.ok_or_else(|| JobStoreError::NotFound(id.to_string()))
    }

    fn update_state(&self, id: &str, state: JobState) -> Result<(), JobStoreError> {
        let mut conn = self.lock()?;
        let tx = Self::write_tx(&mut conn)?;

        let Some(current) = Self::load_state(&tx, id)? else {
            return Ok(());
        };
        check_transition(id, current, state)?;

        tx.execute(
            "UPDATE jobs SET state = ? WHERE id = ?",
            params![state.as_str(), id],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)
    }

    fn update_error(&self, id: &str, code: u32, message: &str) -> Result<(), JobStoreError> {
        let mut conn = self.lock()?;
        let tx = Self::write_tx(&mut conn)?;

        let Some(current) = Self::load_state(&tx, id)? else {
            return Ok(());
        };
        check_error_transition(id, current)?;

        tx.execute(
            "UPDATE jobs SET state = ?, error_code = ?, error_message = ? WHERE id = ?",
            params![JobState::Error.as_str(), code, message, id],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)
    }

    fn set_custom_value(
        &self,
        id: &str,
        key: &str,
        value: CustomValue,
    ) -> Result<(), JobStoreError> {
        let mut conn = self.lock()?;
        let tx = Self::write_tx(&mut conn)?;

        if Self::load_state(&tx, id)?.is_none() {
            return Ok(());
        }

        let value = serde_json::to_string(&value).map_err(db_err)?;
        let updated = tx
            .execute(
                "UPDATE job_custom_values SET value = ? WHERE job_id = ? AND key = ?",
                params![value, id, key],
            )
            .map_err(db_err)?;

        if updated == 0 {
            tx.execute(
                "INSERT INTO job_custom_values (job_id, key, position, value)
                 SELECT ?1, ?2, COALESCE(MAX(position) + 1, 0), ?3 FROM job_custom_values WHERE job_id = ?1",
                params![id, key, value],
            )
            .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)
    }

    fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, JobStoreError> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM jobs WHERE created_at < ?",
            params![cutoff_millis(cutoff)],
        )
        .map_err(db_err)
    }

    fn count(&self) -> Result<usize, JobStoreError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(count as usize)
    }
}

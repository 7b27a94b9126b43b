//! SQLite-backed job store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::de::DeserializeOwned;

use super::{Job, JobError, JobState, JobStore, ProvisionedResourceSet};

const JOB_COLUMNS: &str = "id, correlation_id, role, state, request, manifest, \
     provisioned_resources, error_detail, retry_count, created_at, state_timestamp";

/// SQLite-backed job store.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Create a new SQLite job store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, JobError> {
        let conn = Connection::open(path).map_err(|e| JobError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite job store (useful for testing).
    pub fn in_memory() -> Result<Self, JobError> {
        let conn = Connection::open_in_memory().map_err(|e| JobError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), JobError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                correlation_id TEXT NOT NULL UNIQUE,
                role TEXT NOT NULL,
                state TEXT NOT NULL,
                request TEXT NOT NULL,
                manifest TEXT,
                provisioned_resources TEXT NOT NULL,
                error_detail TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                state_timestamp INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs(state, state_timestamp);
            "#,
        )
        .map_err(|e| JobError::Database(e.to_string()))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, JobError> {
        self.conn
            .lock()
            .map_err(|_| JobError::Database("connection mutex poisoned".to_string()))
    }

    /// Write the mutable columns of `job`, optionally only while the stored
    /// state is `expected`. Returns the number of rows changed.
    fn write_job(&self, job: &Job, expected: Option<JobState>) -> Result<usize, JobError> {
        let conn = self.conn()?;

        let manifest_json = job.manifest.as_ref().map(to_json).transpose()?;
        let resources_json = to_json(&job.provisioned_resources)?;

        conn.execute(
            "UPDATE jobs SET state = ?1, manifest = ?2, provisioned_resources = ?3, \
             error_detail = ?4, retry_count = ?5, state_timestamp = ?6 \
             WHERE id = ?7 AND (?8 IS NULL OR state = ?8)",
            params![
                job.state.as_str(),
                manifest_json,
                resources_json,
                job.error_detail,
                job.retry_count,
                job.state_timestamp.timestamp_millis(),
                job.id,
                expected.map(|state| state.as_str()),
            ],
        )
        .map_err(|e| JobError::Database(e.to_string()))
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        let role: String = row.get(2)?;
        let state: String = row.get(3)?;
        let request: String = row.get(4)?;
        let manifest: Option<String> = row.get(5)?;
        let resources: String = row.get(6)?;
        let created_at: String = row.get(9)?;
        let state_timestamp: i64 = row.get(10)?;

        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(9, e))?;

        let state_timestamp = DateTime::<Utc>::from_timestamp_millis(state_timestamp)
            .ok_or_else(|| {
                conversion_error(
                    10,
                    JobError::Database(format!("invalid timestamp {}", state_timestamp)),
                )
            })?;

        Ok(Job {
            id: row.get(0)?,
            correlation_id: row.get(1)?,
            role: role.parse().map_err(|e| conversion_error(2, e))?,
            state: state.parse().map_err(|e| conversion_error(3, e))?,
            request: json_column(4, &request)?,
            manifest: manifest.map(|m| json_column(5, &m)).transpose()?,
            provisioned_resources: json_column::<ProvisionedResourceSet>(6, &resources)?,
            error_detail: row.get(7)?,
            retry_count: row.get(8)?,
            created_at,
            state_timestamp,
        })
    }
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn json_column<T: DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| conversion_error(idx, e))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JobError> {
    serde_json::to_string(value).map_err(|e| JobError::Database(e.to_string()))
}

fn is_correlation_conflict(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(msg)) => {
            e.code == ErrorCode::ConstraintViolation && msg.contains("correlation_id")
        }
        _ => false,
    }
}

impl JobStore for SqliteJobStore {
    fn create(&self, job: &Job) -> Result<(), JobError> {
        let conn = self.conn()?;

        let request_json = to_json(&job.request)?;
        let manifest_json = job.manifest.as_ref().map(to_json).transpose()?;
        let resources_json = to_json(&job.provisioned_resources)?;

        let result = conn.execute(
            &format!(
                "INSERT INTO jobs ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                JOB_COLUMNS
            ),
            params![
                job.id,
                job.correlation_id,
                job.role.as_str(),
                job.state.as_str(),
                request_json,
                manifest_json,
                resources_json,
                job.error_detail,
                job.retry_count,
                job.created_at.to_rfc3339(),
                job.state_timestamp.timestamp_millis(),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_correlation_conflict(&e) => {
                Err(JobError::DuplicateCorrelationId(job.correlation_id.clone()))
            }
            Err(e) => Err(JobError::Database(e.to_string())),
        }
    }

    fn update(&self, job: &Job) -> Result<(), JobError> {
        if self.write_job(job, None)? == 0 {
            return Err(JobError::NotFound(job.id.clone()));
        }
        Ok(())
    }

    fn update_if_state(&self, job: &Job, expected: JobState) -> Result<bool, JobError> {
        Ok(self.write_job(job, Some(expected))? > 0)
    }

    fn get(&self, id: &str) -> Result<Option<Job>, JobError> {
        let conn = self.conn()?;

        conn.query_row(
            &format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS),
            params![id],
            Self::row_to_job,
        )
        .optional()
        .map_err(|e| JobError::Database(e.to_string()))
    }

    fn find_id_by_correlation_id(
        &self,
        correlation_id: &str,
    ) -> Result<Option<String>, JobError> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT id FROM jobs WHERE correlation_id = ?",
            params![correlation_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| JobError::Database(e.to_string()))
    }

    fn next_for_state(&self, state: JobState, limit: usize) -> Result<Vec<Job>, JobError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM jobs WHERE state = ? ORDER BY state_timestamp ASC, rowid ASC LIMIT ?",
                JOB_COLUMNS
            ))
            .map_err(|e| JobError::Database(e.to_string()))?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![state.as_str(), limit], Self::row_to_job)
            .map_err(|e| JobError::Database(e.to_string()))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| JobError::Database(e.to_string()))
    }

    fn count_by_state(&self, state: JobState) -> Result<u64, JobError> {
        let conn = self.conn()?;

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM jobs WHERE state = ?",
                params![state.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| JobError::Database(e.to_string()))?;

        Ok(count.max(0) as u64)
    }
}

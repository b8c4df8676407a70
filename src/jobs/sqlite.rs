//! SQLite-backed job store.

use super::{Job, JobLogEntry, JobStatus, JobStore};
use crate::error::{PodscribeError, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        job_id TEXT NOT NULL UNIQUE,
        podcast TEXT NOT NULL,
        episode TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        elapsed_seconds INTEGER,
        return_code INTEGER,
        output_location TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
    CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at);

    CREATE TABLE IF NOT EXISTS logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        job_id TEXT NOT NULL REFERENCES jobs(job_id) ON DELETE CASCADE,
        timestamp TEXT NOT NULL,
        message TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_logs_job_id ON logs(job_id);
"#;

const JOB_COLUMNS: &str =
    "job_id, podcast, episode, status, created_at, elapsed_seconds, return_code, output_location";

/// SQLite job store.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Open (or create) the job database at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self::init(conn)?;

        info!("Initialized job database at {:?}", path);
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        // Foreign keys are off by default and needed for log cascades.
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| PodscribeError::Store(format!("Failed to acquire lock: {}", e)))
    }

    fn row_to_job(row: &Row<'_>) -> rusqlite::Result<Job> {
        let status: String = row.get(3)?;
        let created_at: String = row.get(4)?;

        Ok(Job {
            job_id: row.get(0)?,
            podcast: row.get(1)?,
            episode: row.get(2)?,
            status: status.parse().map_err(|e: PodscribeError| {
                rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
            })?,
            created_at: parse_timestamp(&created_at),
            elapsed_seconds: row.get(5)?,
            return_code: row.get(6)?,
            output_location: row.get(7)?,
        })
    }

    fn query_jobs(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Job>> {
        let mut stmt = conn.prepare(sql)?;
        let jobs = stmt
            .query_map(params, Self::row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }
}

/// Fixed-width timestamps so that text ordering matches time ordering.
fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl JobStore for SqliteJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.job_id))]
    async fn create_job(&self, job: &Job) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO jobs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)", JOB_COLUMNS),
            params![
                job.job_id,
                job.podcast,
                job.episode,
                job.status.as_str(),
                format_timestamp(&job.created_at),
                job.elapsed_seconds,
                job.return_code,
                job.output_location,
            ],
        )?;
        debug!("Created job {}", job.job_id);
        Ok(())
    }

    #[instrument(skip(self, job), fields(job_id = %job.job_id))]
    async fn update_job(&self, job: &Job) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE jobs
            SET podcast = ?2, episode = ?3, status = ?4, elapsed_seconds = ?5,
                return_code = ?6, output_location = ?7
            WHERE job_id = ?1
            "#,
            params![
                job.job_id,
                job.podcast,
                job.episode,
                job.status.as_str(),
                job.elapsed_seconds,
                job.return_code,
                job.output_location,
            ],
        )?;

        if updated == 0 {
            return Err(PodscribeError::NotFound(job.job_id.clone()));
        }
        Ok(())
    }

    async fn find_job(&self, job_id: &str) -> Result<Option<Job>> {
        let conn = self.conn()?;
        let job = conn
            .query_row(
                &format!("SELECT {} FROM jobs WHERE job_id = ?1", JOB_COLUMNS),
                params![job_id],
                Self::row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    #[instrument(skip(self))]
    async fn delete_job(&self, job_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM jobs WHERE job_id = ?1", params![job_id])?;
        Ok(deleted > 0)
    }

    async fn append_log(&self, entry: &JobLogEntry) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO logs (job_id, timestamp, message) VALUES (?1, ?2, ?3)",
            params![entry.job_id, format_timestamp(&entry.timestamp), entry.message],
        )?;
        Ok(())
    }

    async fn list_logs(&self, job_id: &str) -> Result<Vec<JobLogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT job_id, timestamp, message FROM logs WHERE job_id = ?1 ORDER BY timestamp, id",
        )?;

        let logs = stmt
            .query_map(params![job_id], |row| {
                let timestamp: String = row.get(1)?;
                Ok(JobLogEntry {
                    job_id: row.get(0)?,
                    timestamp: parse_timestamp(&timestamp),
                    message: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(logs)
    }

    async fn find_by_status(&self, status: JobStatus) -> Result<Vec<Job>> {
        let conn = self.conn()?;
        Self::query_jobs(
            &conn,
            &format!("SELECT {} FROM jobs WHERE status = ?1 ORDER BY id", JOB_COLUMNS),
            params![status.as_str()],
        )
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Job>> {
        let conn = self.conn()?;
        Self::query_jobs(
            &conn,
            &format!(
                "SELECT {} FROM jobs ORDER BY created_at DESC, id DESC LIMIT ?1",
                JOB_COLUMNS
            ),
            params![limit as i64],
        )
    }
}

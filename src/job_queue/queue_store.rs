//! Job queue storage and persistence.
//!
//! SQLite-backed storage for queued, completed and dead jobs.

use super::models::*;
use super::schema::JOB_QUEUE_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::{open_in_memory, open_versioned};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Trait for job queue storage operations.
///
/// Timestamps are unix milliseconds supplied by the caller.
pub trait JobQueueStore: Send + Sync {
    /// Insert a new `WAITING` job, available immediately.
    fn enqueue(
        &self,
        job_type: JobType,
        payload: &serde_json::Value,
        options: &EnqueueOptions,
        now_ms: i64,
    ) -> Result<JobId>;

    fn get_job(&self, id: JobId) -> Result<Option<QueuedJob>>;

    /// Atomically claim the next eligible job of `job_type`
    /// (lowest priority first, then oldest), marking it `ACTIVE`.
    fn claim_next(&self, job_type: JobType, now_ms: i64) -> Result<Option<QueuedJob>>;

    fn complete(&self, id: JobId, now_ms: i64) -> Result<()>;

    /// Record a failed attempt and make the job claimable again at `available_at_ms`.
    fn schedule_retry(&self, id: JobId, available_at_ms: i64, error: &str) -> Result<()>;

    /// Record a failed attempt and move the job to the dead-job archive.
    fn bury(&self, id: JobId, error: &str, now_ms: i64) -> Result<()>;

    /// Return an `ACTIVE` job to `WAITING` without consuming an attempt.
    fn release(&self, id: JobId) -> Result<()>;

    /// Replace the stored payload. Returns false if the job no longer exists.
    fn update_payload(&self, id: JobId, payload: &serde_json::Value) -> Result<bool>;

    /// Return every `ACTIVE` job to `WAITING`. Called once at startup.
    fn recover_interrupted(&self) -> Result<usize>;

    fn stats(&self, job_type: JobType) -> Result<QueueStats>;

    fn list_dead(&self, job_type: JobType, limit: usize) -> Result<Vec<DeadJob>>;

    /// Move a dead job back to the queue with a fresh attempt budget.
    fn retry_dead_job(&self, dead_job_id: i64, now_ms: i64) -> Result<Option<JobId>>;
}

/// How many finished rows are kept per job type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionSettings {
    pub completed: usize,
    pub dead: usize,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            completed: 100,
            dead: 500,
        }
    }
}

pub struct SqliteJobQueueStore {
    conn: Arc<Mutex<Connection>>,
    retention: RetentionSettings,
}

const JOB_COLUMNS: &str = "id, job_type, payload, priority, status, attempts_made, max_attempts, \
     backoff_base_ms, available_at_ms, enqueued_at_ms, started_at_ms, finished_at_ms, last_error";

const DEAD_JOB_COLUMNS: &str = "id, original_job_id, job_type, payload, priority, attempts_made, \
     max_attempts, backoff_base_ms, error, enqueued_at_ms, failed_at_ms";

impl SqliteJobQueueStore {
    /// Opens an existing database or creates a new one with the current schema.
    pub fn new<P: AsRef<Path>>(db_path: P, retention: RetentionSettings) -> Result<Self> {
        let conn = open_versioned(db_path, JOB_QUEUE_VERSIONED_SCHEMAS, "job queue")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            retention,
        })
    }

    pub fn in_memory(retention: RetentionSettings) -> Result<Self> {
        Ok(Self {
            conn: Arc::new(Mutex::new(open_in_memory(JOB_QUEUE_VERSIONED_SCHEMAS)?)),
            retention,
        })
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<QueuedJob> {
        let job_type: String = row.get("job_type")?;
        let status: String = row.get("status")?;
        let payload: String = row.get("payload")?;
        Ok(QueuedJob {
            id: row.get("id")?,
            job_type: JobType::from_db_str(&job_type).ok_or_else(|| invalid_column(1, &job_type))?,
            payload: serde_json::from_str(&payload).map_err(|e| json_error(2, e))?,
            priority: row.get("priority")?,
            status: JobStatus::from_db_str(&status).ok_or_else(|| invalid_column(4, &status))?,
            attempts_made: row.get("attempts_made")?,
            max_attempts: row.get("max_attempts")?,
            backoff_base_ms: row.get::<_, i64>("backoff_base_ms")? as u64,
            available_at: row.get("available_at_ms")?,
            enqueued_at: row.get("enqueued_at_ms")?,
            started_at: row.get("started_at_ms")?,
            finished_at: row.get("finished_at_ms")?,
            last_error: row.get("last_error")?,
        })
    }

    fn row_to_dead_job(row: &rusqlite::Row) -> rusqlite::Result<DeadJob> {
        let job_type: String = row.get("job_type")?;
        let payload: String = row.get("payload")?;
        Ok(DeadJob {
            id: row.get("id")?,
            original_job_id: row.get("original_job_id")?,
            job_type: JobType::from_db_str(&job_type).ok_or_else(|| invalid_column(2, &job_type))?,
            payload: serde_json::from_str(&payload).map_err(|e| json_error(3, e))?,
            priority: row.get("priority")?,
            attempts_made: row.get("attempts_made")?,
            max_attempts: row.get("max_attempts")?,
            backoff_base_ms: row.get::<_, i64>("backoff_base_ms")? as u64,
            error: row.get("error")?,
            enqueued_at: row.get("enqueued_at_ms")?,
            failed_at: row.get("failed_at_ms")?,
        })
    }

    fn get_job_with(conn: &Connection, id: JobId) -> Result<Option<QueuedJob>> {
        conn.query_row(
            &format!("SELECT {} FROM job_queue WHERE id = ?1", JOB_COLUMNS),
            params![id],
            Self::row_to_job,
        )
        .optional()
        .context("Failed to load job")
    }

    fn prune_completed(&self, conn: &Connection, job_type: JobType) -> Result<()> {
        conn.execute(
            "DELETE FROM job_queue WHERE job_type = ?1 AND status = 'COMPLETED' AND id NOT IN (
                SELECT id FROM job_queue WHERE job_type = ?1 AND status = 'COMPLETED'
                ORDER BY finished_at_ms DESC, id DESC LIMIT ?2
            )",
            params![job_type.as_str(), self.retention.completed as i64],
        )?;
        Ok(())
    }

    fn prune_dead(&self, conn: &Connection, job_type: JobType) -> Result<()> {
        conn.execute(
            "DELETE FROM dead_jobs WHERE job_type = ?1 AND id NOT IN (
                SELECT id FROM dead_jobs WHERE job_type = ?1
                ORDER BY failed_at_ms DESC, id DESC LIMIT ?2
            )",
            params![job_type.as_str(), self.retention.dead as i64],
        )?;
        Ok(())
    }
}

fn invalid_column(index: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        format!("unexpected value '{}'", value).into(),
    )
}

fn json_error(index: usize, e: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
}

impl JobQueueStore for SqliteJobQueueStore {
    fn enqueue(
        &self,
        job_type: JobType,
        payload: &serde_json::Value,
        options: &EnqueueOptions,
        now_ms: i64,
    ) -> Result<JobId> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO job_queue (job_type, payload, priority, status, attempts_made, max_attempts,
                backoff_base_ms, available_at_ms, enqueued_at_ms)
             VALUES (?1, ?2, ?3, 'WAITING', 0, ?4, ?5, ?6, ?6)",
            params![
                job_type.as_str(),
                serde_json::to_string(payload)?,
                options.priority,
                options.max_attempts.max(1),
                options.backoff.as_millis() as i64,
                now_ms,
            ],
        )
        .context("Failed to enqueue job")?;
        Ok(conn.last_insert_rowid())
    }

    fn get_job(&self, id: JobId) -> Result<Option<QueuedJob>> {
        let conn = self.conn.lock().unwrap();
        Self::get_job_with(&conn, id)
    }

    fn claim_next(&self, job_type: JobType, now_ms: i64) -> Result<Option<QueuedJob>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let job = tx
            .query_row(
                &format!(
                    "SELECT {} FROM job_queue
                     WHERE job_type = ?1 AND status IN ('WAITING', 'DELAYED') AND available_at_ms <= ?2
                     ORDER BY priority ASC, enqueued_at_ms ASC, id ASC
                     LIMIT 1",
                    JOB_COLUMNS
                ),
                params![job_type.as_str(), now_ms],
                Self::row_to_job,
            )
            .optional()?;

        let Some(mut job) = job else {
            return Ok(None);
        };
        tx.execute(
            "UPDATE job_queue SET status = 'ACTIVE', started_at_ms = ?2 WHERE id = ?1",
            params![job.id, now_ms],
        )?;
        tx.commit()?;

        job.status = JobStatus::Active;
        job.started_at = Some(now_ms);
        Ok(Some(job))
    }

    fn complete(&self, id: JobId, now_ms: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE job_queue SET status = 'COMPLETED', finished_at_ms = ?2 WHERE id = ?1",
            params![id, now_ms],
        )?;
        if let Some(job) = Self::get_job_with(&conn, id)? {
            self.prune_completed(&conn, job.job_type)?;
        }
        Ok(())
    }

    fn schedule_retry(&self, id: JobId, available_at_ms: i64, error: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE job_queue
             SET status = 'DELAYED', attempts_made = attempts_made + 1,
                 available_at_ms = ?2, last_error = ?3, started_at_ms = NULL
             WHERE id = ?1",
            params![id, available_at_ms, error],
        )?;
        Ok(())
    }

    fn bury(&self, id: JobId, error: &str, now_ms: i64) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let Some(job) = Self::get_job_with(&tx, id)? else {
            return Ok(());
        };
        tx.execute(
            "INSERT INTO dead_jobs (original_job_id, job_type, payload, priority, attempts_made,
                max_attempts, backoff_base_ms, error, enqueued_at_ms, failed_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                job.id,
                job.job_type.as_str(),
                serde_json::to_string(&job.payload)?,
                job.priority,
                job.attempts_made + 1,
                job.max_attempts,
                job.backoff_base_ms as i64,
                error,
                job.enqueued_at,
                now_ms,
            ],
        )?;
        tx.execute("DELETE FROM job_queue WHERE id = ?1", params![id])?;
        self.prune_dead(&tx, job.job_type)?;
        tx.commit()?;
        Ok(())
    }

    fn release(&self, id: JobId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE job_queue SET status = 'WAITING', started_at_ms = NULL
             WHERE id = ?1 AND status = 'ACTIVE'",
            params![id],
        )?;
        Ok(())
    }

    fn update_payload(&self, id: JobId, payload: &serde_json::Value) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE job_queue SET payload = ?2 WHERE id = ?1",
            params![id, serde_json::to_string(payload)?],
        )?;
        Ok(updated > 0)
    }

    fn recover_interrupted(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let recovered = conn.execute(
            "UPDATE job_queue SET status = 'WAITING', started_at_ms = NULL WHERE status = 'ACTIVE'",
            [],
        )?;
        Ok(recovered)
    }

    fn stats(&self, job_type: JobType) -> Result<QueueStats> {
        let conn = self.conn.lock().unwrap();
        let mut stats = QueueStats::default();
        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM job_queue WHERE job_type = ?1 GROUP BY status")?;
        let rows = stmt.query_map(params![job_type.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            let count = count as u64;
            match JobStatus::from_db_str(&status) {
                Some(JobStatus::Waiting) => stats.waiting = count,
                Some(JobStatus::Delayed) => stats.delayed = count,
                Some(JobStatus::Active) => stats.active = count,
                Some(JobStatus::Completed) => stats.completed = count,
                None => {}
            }
        }
        stats.dead = conn.query_row(
            "SELECT COUNT(*) FROM dead_jobs WHERE job_type = ?1",
            params![job_type.as_str()],
            |row| row.get::<_, i64>(0),
        )? as u64;
        Ok(stats)
    }

    fn list_dead(&self, job_type: JobType, limit: usize) -> Result<Vec<DeadJob>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM dead_jobs WHERE job_type = ?1 ORDER BY failed_at_ms DESC, id DESC LIMIT ?2",
            DEAD_JOB_COLUMNS
        ))?;
        let jobs = stmt
            .query_map(
                params![job_type.as_str(), limit as i64],
                Self::row_to_dead_job,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    fn retry_dead_job(&self, dead_job_id: i64, now_ms: i64) -> Result<Option<JobId>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let dead = tx
            .query_row(
                &format!("SELECT {} FROM dead_jobs WHERE id = ?1", DEAD_JOB_COLUMNS),
                params![dead_job_id],
                Self::row_to_dead_job,
            )
            .optional()?;
        let Some(dead) = dead else {
            return Ok(None);
        };

        tx.execute(
            "INSERT INTO job_queue (job_type, payload, priority, status, attempts_made, max_attempts,
                backoff_base_ms, available_at_ms, enqueued_at_ms)
             VALUES (?1, ?2, ?3, 'WAITING', 0, ?4, ?5, ?6, ?6)",
            params![
                dead.job_type.as_str(),
                serde_json::to_string(&dead.payload)?,
                dead.priority,
                dead.max_attempts,
                dead.backoff_base_ms as i64,
                now_ms,
            ],
        )?;
        let job_id = tx.last_insert_rowid();
        tx.execute("DELETE FROM dead_jobs WHERE id = ?1", params![dead_job_id])?;
        tx.commit()?;
        Ok(Some(job_id))
    }
}

//! Job record persistence (SQLite)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use stemscribe_common::{Error, Job, JobStatus, JobUpdate, Result};
use uuid::Uuid;

use crate::store::JobStore;
use crate::utils::retry_on_lock;

/// Default lock wait before a write gives up
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// SQLite-backed job store
///
/// Writes retry on lock contention (see [`retry_on_lock`]) so a progress
/// update is never silently dropped while other jobs write concurrently.
#[derive(Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    pub fn with_max_lock_wait(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create(&self, job: &Job) -> Result<()> {
        // Prepare all data BEFORE touching the database
        let id = job.id.to_string();
        let status = job.status.as_str();
        let progress = i64::from(job.progress);
        let created_at = job.created_at.to_rfc3339();
        let updated_at = job.updated_at.to_rfc3339();

        retry_on_lock("create_job", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO jobs (
                    id, filename, status, progress, message,
                    output_path, error, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(&job.filename)
            .bind(status)
            .bind(progress)
            .bind(&job.message)
            .bind(&job.output_path)
            .bind(&job.error)
            .bind(&created_at)
            .bind(&updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    Error::DuplicateId(id.clone())
                }
                other => Error::Database(other),
            })?;

            Ok(())
        })
        .await
    }

    async fn get(&self, id: Uuid) -> Result<Job> {
        let row = sqlx::query(
            r#"
            SELECT id, filename, status, progress, message,
                   output_path, error, created_at, updated_at
            FROM jobs
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_job(&row),
            None => Err(Error::NotFound(format!("Job not found: {}", id))),
        }
    }

    async fn update(&self, id: Uuid, update: &JobUpdate) -> Result<()> {
        let id_str = id.to_string();
        let status = update.status.map(|s| s.as_str());
        let progress = update.progress.map(|p| i64::from(p.min(100)));
        let updated_at = Utc::now().to_rfc3339();

        // Single statement: the merge is atomic with respect to readers
        let rows_affected = retry_on_lock("update_job", self.max_lock_wait_ms, || async {
            let result = sqlx::query(
                r#"
                UPDATE jobs SET
                    status = COALESCE(?, status),
                    progress = COALESCE(?, progress),
                    message = COALESCE(?, message),
                    output_path = COALESCE(?, output_path),
                    error = COALESCE(?, error),
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(status)
            .bind(progress)
            .bind(&update.message)
            .bind(&update.output_path)
            .bind(&update.error)
            .bind(&updated_at)
            .bind(&id_str)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

            Ok(result.rows_affected())
        })
        .await?;

        if rows_affected == 0 {
            return Err(Error::NotFound(format!("Job not found: {}", id)));
        }

        Ok(())
    }
}

fn row_to_job(row: &SqliteRow) -> Result<Job> {
    let id: String = row.get("id");
    let id = Uuid::parse_str(&id)
        .map_err(|e| Error::Internal(format!("Failed to parse job id: {}", e)))?;

    let status: String = row.get("status");
    let status: JobStatus = status.parse()?;

    let progress: i64 = row.get("progress");
    let progress = u8::try_from(progress.clamp(0, 100))
        .map_err(|e| Error::Internal(format!("Invalid progress value: {}", e)))?;

    Ok(Job {
        id,
        filename: row.get("filename"),
        status,
        progress,
        message: row.get("message"),
        output_path: row.get("output_path"),
        error: row.get("error"),
        created_at: parse_timestamp(row.get("created_at"), "created_at")?,
        updated_at: parse_timestamp(row.get("updated_at"), "updated_at")?,
    })
}

fn parse_timestamp(value: String, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

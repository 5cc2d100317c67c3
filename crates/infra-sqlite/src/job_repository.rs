// SQLite JobRepository Implementation

use async_trait::async_trait;
use herald_core::domain::{ControlFlag, Job, JobKind, JobStatus, StatusCounts};
use herald_core::error::{AppError, Result};
use herald_core::port::job_repository::abandoned_message;
use herald_core::port::{JobRepository, StaleSweep, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;

// Helper to convert sqlx::Error to AppError with structured information
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "2067" | "1555" => AppError::Database(format!(
                        "Unique constraint violation: {} ({})",
                        db_err.message(),
                        code_str
                    )),
                    "275" => AppError::Database(format!(
                        "Check constraint violation: {} ({})",
                        db_err.message(),
                        code_str
                    )),
                    "5" => AppError::Database(format!(
                        "Database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    "13" => AppError::Database(format!("Database full: {}", db_err.message())),
                    _ => AppError::Database(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        // Connection, pool, protocol errors
        _ => AppError::Database(err.to_string()),
    }
}

pub struct SqliteJobRepository {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    fn not_found(id: &str) -> AppError {
        AppError::NotFound(format!("Job {} not found", id))
    }

    /// Outcome of a lease-guarded finalize: a miss is either an unknown id
    /// or a claim this caller no longer holds.
    async fn finalized(&self, id: &str, rows_affected: u64) -> Result<bool> {
        if rows_affected > 0 {
            return Ok(true);
        }
        match self.find_by_id(id).await? {
            Some(_) => Ok(false),
            None => Err(Self::not_found(id)),
        }
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn insert(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, kind, status, payload_ref, attempt_count, last_error,
                created_at, updated_at, claimed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(job.kind.as_str())
        .bind(job.status.as_str())
        .bind(&job.payload_ref)
        .bind(job.attempt_count)
        .bind(&job.last_error)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.claimed_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn claim_batch(&self, limit: usize, kind: Option<JobKind>) -> Result<Vec<Job>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        // Single statement: selection and the pending -> in_progress flip are
        // one write, and the outer status guard makes a lost race a no-op.
        let now = self.time_provider.now_millis();
        let kind = kind.map(|k| k.as_str());
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = 'in_progress', claimed_at = ?, updated_at = ?, last_error = NULL
            WHERE id IN (
                SELECT id FROM jobs
                WHERE status = 'pending' AND (? IS NULL OR kind = ?)
                ORDER BY created_at ASC, id ASC
                LIMIT ?
            )
              AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(kind)
        .bind(kind)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        // RETURNING order is unspecified
        let mut jobs = rows
            .into_iter()
            .map(JobRow::into_job)
            .collect::<Result<Vec<_>>>()?;
        jobs.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(jobs)
    }

    async fn mark_done(&self, id: &str, lease: i64) -> Result<bool> {
        // A repeat on a done row is an overwrite; anything else needs the live claim
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'done', updated_at = ?, claimed_at = NULL
            WHERE id = ?
              AND (status = 'done' OR (status = 'in_progress' AND claimed_at = ?))
            "#,
        )
        .bind(self.time_provider.now_millis())
        .bind(id)
        .bind(lease)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        self.finalized(id, result.rows_affected()).await
    }

    async fn mark_failed(&self, id: &str, lease: i64, error: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', last_error = ?, updated_at = ?, claimed_at = NULL
            WHERE id = ? AND status = 'in_progress' AND claimed_at = ?
            "#,
        )
        .bind(error)
        .bind(self.time_provider.now_millis())
        .bind(id)
        .bind(lease)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        self.finalized(id, result.rows_affected()).await
    }

    async fn record_attempt(&self, id: &str) -> Result<i32> {
        // Atomic increment without reading
        let count: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE jobs
            SET attempt_count = attempt_count + 1, updated_at = ?
            WHERE id = ?
            RETURNING attempt_count
            "#,
        )
        .bind(self.time_provider.now_millis())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        count.ok_or_else(|| Self::not_found(id))
    }

    async fn release(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending', updated_at = ?, claimed_at = NULL
            WHERE id = ? AND status = 'in_progress'
            "#,
        )
        .bind(self.time_provider.now_millis())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn read_control_flag(&self) -> Result<bool> {
        let enabled: Option<i64> =
            sqlx::query_scalar("SELECT enabled FROM pipeline_control WHERE id = 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        // Missing row: treat as disabled
        Ok(enabled.is_some_and(|v| v != 0))
    }

    async fn load_control_flag(&self) -> Result<Option<ControlFlag>> {
        let row: Option<(i64, i64)> =
            sqlx::query_as("SELECT enabled, updated_at FROM pipeline_control WHERE id = 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(row.map(|(enabled, updated_at)| ControlFlag {
            enabled: enabled != 0,
            updated_at,
        }))
    }

    async fn set_control_flag(&self, enabled: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pipeline_control (id, enabled, updated_at) VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET enabled = excluded.enabled, updated_at = excluded.updated_at
            "#,
        )
        .bind(i64::from(enabled))
        .bind(self.time_provider.now_millis())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(count)
    }

    async fn status_counts(&self) -> Result<StatusCounts> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM jobs GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            counts.set(status.parse::<JobStatus>()?, count);
        }
        Ok(counts)
    }

    async fn find_by_status(&self, status: JobStatus, limit: usize) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT * FROM jobs
            WHERE status = ?
            ORDER BY updated_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(status.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn requeue_stale(
        &self,
        claimed_before: i64,
        max_total_attempts: i32,
    ) -> Result<StaleSweep> {
        let now = self.time_provider.now_millis();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let worn: Vec<(String, i32)> = sqlx::query_as(
            r#"
            SELECT id, attempt_count FROM jobs
            WHERE status = 'in_progress'
              AND (claimed_at IS NULL OR claimed_at < ?)
              AND attempt_count >= ?
            "#,
        )
        .bind(claimed_before)
        .bind(max_total_attempts)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        for (id, attempts) in &worn {
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'failed', last_error = ?, updated_at = ?, claimed_at = NULL
                WHERE id = ? AND status = 'in_progress'
                "#,
            )
            .bind(abandoned_message(*attempts))
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        let requeued = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending', updated_at = ?, claimed_at = NULL
            WHERE status = 'in_progress'
              AND (claimed_at IS NULL OR claimed_at < ?)
              AND attempt_count < ?
            "#,
        )
        .bind(now)
        .bind(claimed_before)
        .bind(max_total_attempts)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(StaleSweep {
            requeued,
            abandoned: worn.len() as u64,
        })
    }

    async fn resume_failed(&self, max_total_attempts: i32) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending', updated_at = ?, claimed_at = NULL
            WHERE status = 'failed' AND attempt_count < ?
            "#,
        )
        .bind(self.time_provider.now_millis())
        .bind(max_total_attempts)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    kind: String,
    status: String,
    payload_ref: String,
    attempt_count: i32,
    last_error: Option<String>,
    created_at: i64,
    updated_at: i64,
    claimed_at: Option<i64>,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        Ok(Job {
            kind: self.kind.parse()?,
            status: self.status.parse()?,
            id: self.id,
            payload_ref: self.payload_ref,
            attempt_count: self.attempt_count,
            last_error: self.last_error,
            created_at: self.created_at,
            updated_at: self.updated_at,
            claimed_at: self.claimed_at,
        })
    }
}

//! Durable storage of preview jobs.
//!
//! The store is the authoritative record of job state; the wake-up queue is
//! only a hint channel. All scheduler and worker mutations go through
//! read-modify-write on single rows here.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::job::PreviewJob;

/// Storage operations the scheduler and worker need.
#[async_trait]
pub trait PreviewJobStore: Send + Sync {
    async fn insert(&self, job: PreviewJob) -> Result<PreviewJob>;

    /// Persist a mutated row. Implementations stamp `updated_at`.
    async fn update(&self, job: PreviewJob) -> Result<PreviewJob>;

    /// Most recently created job for the file, any status.
    async fn find_latest_by_file(&self, file_id: Uuid) -> Result<Option<PreviewJob>>;

    /// Most recent `pending` or `processing` job for the file (dedup check).
    async fn find_in_flight_by_file(&self, file_id: Uuid) -> Result<Option<PreviewJob>>;

    /// Most recent `pending` job for the file (worker re-validation).
    async fn find_pending_by_file(&self, file_id: Uuid) -> Result<Option<PreviewJob>>;

    /// `processing` jobs whose row was last touched before `cutoff` —
    /// evidence a worker died or hung mid-conversion.
    async fn find_stale_processing(&self, cutoff: DateTime<Utc>) -> Result<Vec<PreviewJob>>;

    /// `pending` jobs with no retry time or one that has passed.
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<PreviewJob>>;
}

/// PostgreSQL-backed job store.
pub struct PgPreviewJobStore {
    pool: PgPool,
}

impl PgPreviewJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PreviewJobStore for PgPreviewJobStore {
    async fn insert(&self, job: PreviewJob) -> Result<PreviewJob> {
        let inserted = sqlx::query_as::<_, PreviewJob>(
            r#"
            INSERT INTO preview_jobs (
                id, file_id, requested_by_id, status, attempts, max_attempts,
                last_error, artifact_path, started_at, completed_at, next_retry_at,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id, file_id, requested_by_id, status, attempts, max_attempts,
                      last_error, artifact_path, started_at, completed_at, next_retry_at,
                      created_at, updated_at
            "#,
        )
        .bind(job.id)
        .bind(job.file_id)
        .bind(job.requested_by_id)
        .bind(job.status)
        .bind(job.attempts)
        .bind(job.max_attempts)
        .bind(&job.last_error)
        .bind(&job.artifact_path)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.next_retry_at)
        .bind(job.created_at)
        .bind(job.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(inserted)
    }

    async fn update(&self, job: PreviewJob) -> Result<PreviewJob> {
        let updated = sqlx::query_as::<_, PreviewJob>(
            r#"
            UPDATE preview_jobs SET
                status = $1, requested_by_id = $2, attempts = $3, max_attempts = $4,
                last_error = $5, artifact_path = $6, started_at = $7, completed_at = $8,
                next_retry_at = $9, updated_at = NOW()
            WHERE id = $10
            RETURNING id, file_id, requested_by_id, status, attempts, max_attempts,
                      last_error, artifact_path, started_at, completed_at, next_retry_at,
                      created_at, updated_at
            "#,
        )
        .bind(job.status)
        .bind(job.requested_by_id)
        .bind(job.attempts)
        .bind(job.max_attempts)
        .bind(&job.last_error)
        .bind(&job.artifact_path)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.next_retry_at)
        .bind(job.id)
        .fetch_one(&self.pool)
        .await?;

        Ok(updated)
    }

    async fn find_latest_by_file(&self, file_id: Uuid) -> Result<Option<PreviewJob>> {
        let job = sqlx::query_as::<_, PreviewJob>(
            r#"
            SELECT id, file_id, requested_by_id, status, attempts, max_attempts,
                   last_error, artifact_path, started_at, completed_at, next_retry_at,
                   created_at, updated_at
            FROM preview_jobs
            WHERE file_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn find_in_flight_by_file(&self, file_id: Uuid) -> Result<Option<PreviewJob>> {
        let job = sqlx::query_as::<_, PreviewJob>(
            r#"
            SELECT id, file_id, requested_by_id, status, attempts, max_attempts,
                   last_error, artifact_path, started_at, completed_at, next_retry_at,
                   created_at, updated_at
            FROM preview_jobs
            WHERE file_id = $1
              AND status IN ('pending', 'processing')
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn find_pending_by_file(&self, file_id: Uuid) -> Result<Option<PreviewJob>> {
        let job = sqlx::query_as::<_, PreviewJob>(
            r#"
            SELECT id, file_id, requested_by_id, status, attempts, max_attempts,
                   last_error, artifact_path, started_at, completed_at, next_retry_at,
                   created_at, updated_at
            FROM preview_jobs
            WHERE file_id = $1
              AND status = 'pending'
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn find_stale_processing(&self, cutoff: DateTime<Utc>) -> Result<Vec<PreviewJob>> {
        let jobs = sqlx::query_as::<_, PreviewJob>(
            r#"
            SELECT id, file_id, requested_by_id, status, attempts, max_attempts,
                   last_error, artifact_path, started_at, completed_at, next_retry_at,
                   created_at, updated_at
            FROM preview_jobs
            WHERE status = 'processing'
              AND updated_at < $1
            ORDER BY updated_at ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<PreviewJob>> {
        let jobs = sqlx::query_as::<_, PreviewJob>(
            r#"
            SELECT id, file_id, requested_by_id, status, attempts, max_attempts,
                   last_error, artifact_path, started_at, completed_at, next_retry_at,
                   created_at, updated_at
            FROM preview_jobs
            WHERE status = 'pending'
              AND (next_retry_at IS NULL OR next_retry_at <= $1)
            ORDER BY created_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }
}

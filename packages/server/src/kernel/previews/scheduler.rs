//! Preview scheduler: admission, status lookup, retry, and recovery.
//!
//! The scheduler owns the job lifecycle on the producer side. It enforces
//! the one-in-flight-per-file invariant at admission time with a
//! lookup-before-insert check, and guarantees liveness with the periodic
//! recovery sweep regardless of wake-up queue pressure.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::job::{PreviewJob, PreviewJobStatus};
use super::queue::{PreviewJobTask, WakeQueue};
use super::store::PreviewJobStore;

/// Tuning knobs for the preview pipeline.
#[derive(Debug, Clone)]
pub struct PreviewConfig {
    /// Capacity of the in-memory wake-up queue. Zero disables the hint path.
    pub queue_buffer_size: usize,
    /// Conversion attempts before a job fails terminally.
    pub max_attempts: i32,
    /// Backoff schedule indexed by attempt number, clamped at the last entry.
    pub retry_delays: Vec<Duration>,
    /// A `processing` row untouched for this long is assumed orphaned by a
    /// dead or hung worker and gets reset by the sweep.
    pub stale_after: Duration,
    /// Number of worker tasks draining the queue. Values above 1 void the
    /// at-most-one-conversion-in-flight-per-file guarantee; leave at 1
    /// unless admission-time locking is added.
    pub worker_count: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            queue_buffer_size: 128,
            max_attempts: 3,
            retry_delays: vec![
                Duration::from_secs(30),
                Duration::from_secs(120),
                Duration::from_secs(600),
            ],
            stale_after: Duration::from_secs(600),
            worker_count: 1,
        }
    }
}

impl PreviewConfig {
    /// Reject values that would only surface as misbehavior deep in the
    /// pipeline. Called at the configuration boundary.
    pub fn validate(&self) -> Result<()> {
        if self.retry_delays.is_empty() {
            bail!("retry delay schedule must contain at least one entry");
        }
        if self.max_attempts < 1 {
            bail!("max_attempts must be at least 1");
        }
        Ok(())
    }

    /// Delay before re-offering a job that has failed `attempts` times.
    ///
    /// Indexes the schedule at `attempts - 1` and holds at the final entry
    /// once the schedule is exhausted.
    pub fn retry_delay(&self, attempts: i32) -> Duration {
        let Some(last) = self.retry_delays.last() else {
            return Duration::from_secs(60);
        };
        let idx = (attempts.max(1) as usize) - 1;
        self.retry_delays.get(idx).copied().unwrap_or(*last)
    }
}

/// Owns preview job admission and maintenance.
pub struct PreviewScheduler {
    store: Arc<dyn PreviewJobStore>,
    queue: WakeQueue,
    config: PreviewConfig,
}

impl PreviewScheduler {
    pub fn new(store: Arc<dyn PreviewJobStore>, queue: WakeQueue, config: PreviewConfig) -> Self {
        Self {
            store,
            queue,
            config,
        }
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    /// Request a preview for a file.
    ///
    /// Idempotent with respect to in-flight work: if a `pending` or
    /// `processing` job already exists for the file, that job is returned
    /// unchanged. Otherwise a new row is created and a wake-up hint pushed
    /// (best effort; a full queue is not an error).
    pub async fn enqueue(
        &self,
        file_id: Uuid,
        requested_by_id: Option<Uuid>,
    ) -> Result<PreviewJob> {
        if let Some(existing) = self.store.find_in_flight_by_file(file_id).await? {
            debug!(
                job_id = %existing.id,
                file_id = %file_id,
                status = ?existing.status,
                "preview already in flight, reusing job"
            );
            return Ok(existing);
        }

        let job = PreviewJob::new_for_file(file_id, requested_by_id, self.config.max_attempts);
        let inserted = self.store.insert(job).await?;
        info!(job_id = %inserted.id, file_id = %file_id, "preview job enqueued");

        self.queue.push(PreviewJobTask {
            file_id,
            requested_by_id,
        });

        Ok(inserted)
    }

    /// Most recently created job for the file, if any. Read-only; callers
    /// poll this instead of blocking on conversion.
    pub async fn get_job_by_file_id(&self, file_id: Uuid) -> Result<Option<PreviewJob>> {
        self.store.find_latest_by_file(file_id).await
    }

    /// Explicitly retry a failed preview.
    ///
    /// If the latest job for the file is `failed` with attempts remaining,
    /// it is reopened in place: status back to `pending`, `last_error` and
    /// `next_retry_at` cleared, attempt count preserved so the overall
    /// ceiling still holds. Anything else degrades to [`enqueue`], which
    /// either returns the in-flight job or starts a fresh lineage.
    ///
    /// [`enqueue`]: Self::enqueue
    pub async fn retry(&self, file_id: Uuid, requested_by_id: Option<Uuid>) -> Result<PreviewJob> {
        if let Some(job) = self.store.find_latest_by_file(file_id).await? {
            if job.can_retry() {
                let mut reopened = job;
                reopened.status = PreviewJobStatus::Pending;
                reopened.last_error = None;
                reopened.next_retry_at = None;
                let updated = self.store.update(reopened).await?;
                info!(
                    job_id = %updated.id,
                    file_id = %file_id,
                    attempts = updated.attempts,
                    "failed preview job reopened"
                );
                self.queue.push(PreviewJobTask {
                    file_id,
                    requested_by_id,
                });
                return Ok(updated);
            }
        }

        self.enqueue(file_id, requested_by_id).await
    }

    /// Repair stuck jobs and re-announce due work.
    ///
    /// Invoked periodically by an external trigger (cron or startup hook).
    /// Two independent passes:
    /// 1. `processing` rows untouched past the staleness threshold are reset
    ///    to `pending` and re-announced (crash recovery).
    /// 2. every due `pending` row is re-announced, compensating for hints
    ///    lost to queue overflow.
    pub async fn recover_stale_jobs(&self) -> Result<()> {
        let now = Utc::now();
        let cutoff = now - self.config.stale_after;

        let stale = self.store.find_stale_processing(cutoff).await?;
        for job in stale {
            warn!(
                job_id = %job.id,
                file_id = %job.file_id,
                updated_at = %job.updated_at,
                "resetting stale processing job"
            );
            let mut reset = job;
            reset.status = PreviewJobStatus::Pending;
            reset.next_retry_at = None;
            let updated = self.store.update(reset).await?;
            self.queue.push(PreviewJobTask {
                file_id: updated.file_id,
                requested_by_id: updated.requested_by_id,
            });
        }

        let due = self.store.find_due(now).await?;
        if !due.is_empty() {
            debug!(count = due.len(), "re-announcing due preview jobs");
        }
        for job in due {
            self.queue.push(PreviewJobTask {
                file_id: job.file_id,
                requested_by_id: job.requested_by_id,
            });
        }

        Ok(())
    }
}

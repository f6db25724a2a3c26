//! Sequential preview worker.
//!
//! A single consumer drains the wake-up queue one task at a time, so at
//! most one conversion call is in flight process-wide. The conversion
//! backend is assumed expensive and rate-limited; sequencing here is the
//! deliberate bound on load against it.
//!
//! A hung conversion blocks the worker until the backend returns; there is
//! no per-call timeout. The staleness sweep repairs the row in that case,
//! not the stuck call.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::kernel::files::FileStore;

use super::converter::ConversionBackend;
use super::job::{PreviewJob, PreviewJobStatus};
use super::queue::{PreviewJobTask, WakeReceiver};
use super::scheduler::PreviewConfig;
use super::store::PreviewJobStore;

/// Consumes wake-up hints and drives conversions to a terminal or retry
/// outcome. All conversion-time failures are absorbed into row state plus
/// log events; nothing escapes the loop as an unhandled error.
pub struct PreviewWorker {
    store: Arc<dyn PreviewJobStore>,
    files: Arc<dyn FileStore>,
    backend: Arc<dyn ConversionBackend>,
    config: PreviewConfig,
    intake: Arc<Mutex<WakeReceiver>>,
}

impl PreviewWorker {
    pub fn new(
        store: Arc<dyn PreviewJobStore>,
        files: Arc<dyn FileStore>,
        backend: Arc<dyn ConversionBackend>,
        config: PreviewConfig,
        intake: WakeReceiver,
    ) -> Self {
        Self {
            store,
            files,
            backend,
            config,
            intake: Arc::new(Mutex::new(intake)),
        }
    }

    /// Spawn `config.worker_count` consumer tasks over the shared intake.
    ///
    /// The default of 1 is what upholds the per-file single-flight
    /// invariant; see [`PreviewConfig::worker_count`].
    pub fn spawn(self, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        let count = self.config.worker_count.max(1);
        let worker = Arc::new(self);
        (0..count)
            .map(|index| {
                let worker = Arc::clone(&worker);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { worker.run(index, shutdown).await })
            })
            .collect()
    }

    /// Run the consumer loop until shutdown or all producers are gone.
    pub async fn run(&self, worker_index: usize, shutdown: CancellationToken) {
        info!(worker = worker_index, "preview worker starting");

        loop {
            let task = {
                let mut intake = self.intake.lock().await;
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    task = intake.recv() => task,
                }
            };

            let Some(task) = task else {
                // All senders dropped; nothing will ever arrive again.
                break;
            };

            if let Err(e) = self.process_task(&task).await {
                // Store failure mid-task. The row is repaired by the sweep.
                error!(file_id = %task.file_id, error = %e, "preview task aborted");
            }
        }

        info!(worker = worker_index, "preview worker stopped");
    }

    /// Handle one wake-up hint.
    ///
    /// The hint is advisory: if no pending job exists for the file any more
    /// (already handled, superseded, or removed) this is a silent no-op.
    async fn process_task(&self, task: &PreviewJobTask) -> Result<()> {
        let Some(job) = self.store.find_pending_by_file(task.file_id).await? else {
            debug!(file_id = %task.file_id, "no pending preview job for hint, skipping");
            return Ok(());
        };

        let mut claimed = job;
        claimed.status = PreviewJobStatus::Processing;
        claimed.started_at = Some(Utc::now());
        let claimed = self.store.update(claimed).await?;

        let file = self.files.find_by_id(claimed.file_id).await?;
        let outcome = match file {
            Some(file) => self
                .backend
                .convert(&file)
                .await
                .map_err(|e| e.to_string()),
            None => Err("file not found".to_string()),
        };

        match outcome {
            Ok(artifact_path) => self.complete(claimed, artifact_path).await,
            Err(reason) => self.fail_attempt(claimed, &reason).await,
        }
    }

    async fn complete(&self, mut job: PreviewJob, artifact_path: String) -> Result<()> {
        job.status = PreviewJobStatus::Completed;
        job.completed_at = Some(Utc::now());
        job.artifact_path = Some(artifact_path);
        let job = self.store.update(job).await?;
        info!(
            job_id = %job.id,
            file_id = %job.file_id,
            attempts = job.attempts,
            "preview generated"
        );
        Ok(())
    }

    /// Record a failed attempt: terminal `failed` at the ceiling, otherwise
    /// back to `pending` with the clamped backoff delay.
    async fn fail_attempt(&self, mut job: PreviewJob, reason: &str) -> Result<()> {
        job.attempts += 1;
        job.last_error = Some(reason.to_string());

        if job.attempts >= job.max_attempts {
            job.status = PreviewJobStatus::Failed;
            job.next_retry_at = None;
            let job = self.store.update(job).await?;
            error!(
                job_id = %job.id,
                file_id = %job.file_id,
                attempts = job.attempts,
                error = reason,
                "preview failed permanently"
            );
        } else {
            let delay = self.config.retry_delay(job.attempts);
            job.status = PreviewJobStatus::Pending;
            job.next_retry_at = Some(Utc::now() + delay);
            let job = self.store.update(job).await?;
            warn!(
                job_id = %job.id,
                file_id = %job.file_id,
                attempts = job.attempts,
                retry_in_secs = delay.as_secs(),
                error = reason,
                "preview attempt failed, retry scheduled"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::kernel::previews::testing::{
        MockConversionBackend, TestFileStore, TestJobStore,
    };
    use crate::kernel::previews::{PreviewScheduler, WakeQueue};
    use uuid::Uuid;

    struct Harness {
        store: Arc<TestJobStore>,
        files: Arc<TestFileStore>,
        backend: Arc<MockConversionBackend>,
        scheduler: PreviewScheduler,
        worker: PreviewWorker,
    }

    fn harness(backend: MockConversionBackend, config: PreviewConfig) -> Harness {
        let store = Arc::new(TestJobStore::new());
        let files = Arc::new(TestFileStore::new());
        let backend = Arc::new(backend);
        let (queue, rx) = WakeQueue::bounded(16);
        let scheduler = PreviewScheduler::new(store.clone(), queue, config.clone());
        let worker = PreviewWorker::new(
            store.clone(),
            files.clone(),
            backend.clone(),
            config,
            rx,
        );
        Harness {
            store,
            files,
            backend,
            scheduler,
            worker,
        }
    }

    fn task_for(file_id: Uuid) -> PreviewJobTask {
        PreviewJobTask {
            file_id,
            requested_by_id: None,
        }
    }

    #[tokio::test]
    async fn successful_conversion_completes_job() {
        let h = harness(MockConversionBackend::succeeding(), PreviewConfig::default());
        let file_id = h.files.add_document("quarterly-report.docx");

        let job = h.scheduler.enqueue(file_id, None).await.unwrap();
        h.worker.process_task(&task_for(file_id)).await.unwrap();

        let done = h.store.job(job.id).unwrap();
        assert_eq!(done.status, PreviewJobStatus::Completed);
        assert_eq!(done.attempts, 0);
        assert!(done.started_at.is_some());
        assert!(done.completed_at.is_some());
        let artifact = done.artifact_path.unwrap();
        assert!(artifact.contains(&file_id.to_string()));
        assert_eq!(h.backend.calls(), 1);
    }

    #[tokio::test]
    async fn hint_without_pending_job_is_a_noop() {
        let h = harness(MockConversionBackend::succeeding(), PreviewConfig::default());

        h.worker.process_task(&task_for(Uuid::new_v4())).await.unwrap();

        assert!(h.store.jobs().is_empty());
        assert_eq!(h.backend.calls(), 0);
    }

    #[tokio::test]
    async fn missing_file_consumes_an_attempt() {
        let h = harness(MockConversionBackend::succeeding(), PreviewConfig::default());
        let file_id = Uuid::new_v4(); // never added to the file store

        let job = h.scheduler.enqueue(file_id, None).await.unwrap();
        h.worker.process_task(&task_for(file_id)).await.unwrap();

        let after = h.store.job(job.id).unwrap();
        assert_eq!(after.status, PreviewJobStatus::Pending);
        assert_eq!(after.attempts, 1);
        assert_eq!(after.last_error.as_deref(), Some("file not found"));
        assert!(after.next_retry_at.is_some());
        assert_eq!(h.backend.calls(), 0);
    }

    #[tokio::test]
    async fn fails_twice_then_succeeds_within_ceiling() {
        let h = harness(
            MockConversionBackend::failing_times(2),
            PreviewConfig {
                max_attempts: 3,
                retry_delays: vec![Duration::from_millis(1)],
                ..PreviewConfig::default()
            },
        );
        let file_id = h.files.add_document("slides.pptx");
        let job = h.scheduler.enqueue(file_id, None).await.unwrap();

        // Each failure puts the row back to pending, so the next hint works.
        for _ in 0..3 {
            h.worker.process_task(&task_for(file_id)).await.unwrap();
        }

        let done = h.store.job(job.id).unwrap();
        assert_eq!(done.status, PreviewJobStatus::Completed);
        // The successful third attempt does not increment the failure counter.
        assert_eq!(done.attempts, 2);
        assert!(done.attempts < done.max_attempts);
        assert_eq!(h.backend.calls(), 3);
    }

    #[tokio::test]
    async fn exhausting_attempts_fails_terminally() {
        let h = harness(
            MockConversionBackend::failing(),
            PreviewConfig {
                max_attempts: 2,
                ..PreviewConfig::default()
            },
        );
        let file_id = h.files.add_document("legacy.xls");
        let job = h.scheduler.enqueue(file_id, None).await.unwrap();

        h.worker.process_task(&task_for(file_id)).await.unwrap();
        h.worker.process_task(&task_for(file_id)).await.unwrap();

        let dead = h.store.job(job.id).unwrap();
        assert_eq!(dead.status, PreviewJobStatus::Failed);
        assert_eq!(dead.attempts, 2);
        assert!(dead.next_retry_at.is_none());
        assert!(dead.last_error.is_some());

        // A further hint finds no pending row and does nothing.
        h.worker.process_task(&task_for(file_id)).await.unwrap();
        assert_eq!(h.backend.calls(), 2);
    }

    #[tokio::test]
    async fn failure_schedules_backoff_from_config() {
        let h = harness(
            MockConversionBackend::failing(),
            PreviewConfig {
                max_attempts: 5,
                retry_delays: vec![Duration::from_secs(30), Duration::from_secs(120)],
                ..PreviewConfig::default()
            },
        );
        let file_id = h.files.add_document("budget.xlsx");
        let job = h.scheduler.enqueue(file_id, None).await.unwrap();

        let before = Utc::now();
        h.worker.process_task(&task_for(file_id)).await.unwrap();

        let after = h.store.job(job.id).unwrap();
        let retry_at = after.next_retry_at.unwrap();
        // First failure uses the first schedule entry.
        assert!(retry_at >= before + Duration::from_secs(29));
        assert!(retry_at <= Utc::now() + Duration::from_secs(31));
    }

    #[tokio::test]
    async fn completed_job_is_never_mutated_again() {
        let h = harness(MockConversionBackend::succeeding(), PreviewConfig::default());
        let file_id = h.files.add_document("notes.odt");

        let job = h.scheduler.enqueue(file_id, None).await.unwrap();
        h.worker.process_task(&task_for(file_id)).await.unwrap();
        let done = h.store.job(job.id).unwrap();

        // Neither a sweep nor a retry touches the completed row.
        h.scheduler.recover_stale_jobs().await.unwrap();
        h.scheduler.retry(file_id, None).await.unwrap();

        let still_done = h.store.job(job.id).unwrap();
        assert_eq!(still_done.status, PreviewJobStatus::Completed);
        assert_eq!(still_done.completed_at, done.completed_at);
        assert_eq!(still_done.artifact_path, done.artifact_path);
    }

    #[tokio::test]
    async fn run_loop_drains_hints_until_cancelled() {
        let store = Arc::new(TestJobStore::new());
        let files = Arc::new(TestFileStore::new());
        let backend = Arc::new(MockConversionBackend::succeeding());
        let config = PreviewConfig::default();
        let (queue, rx) = WakeQueue::bounded(16);
        let scheduler = PreviewScheduler::new(store.clone(), queue, config.clone());
        let worker = PreviewWorker::new(store.clone(), files.clone(), backend, config, rx);

        let shutdown = CancellationToken::new();
        let handles = worker.spawn(shutdown.clone());
        assert_eq!(handles.len(), 1);

        let file_id = files.add_document("handbook.docx");
        let job = scheduler.enqueue(file_id, None).await.unwrap();

        let completed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(job) = store.job(job.id) {
                    if job.status == PreviewJobStatus::Completed {
                        break job;
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("worker should complete the job");
        assert!(completed.artifact_path.is_some());

        shutdown.cancel();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("worker should stop on cancellation")
                .unwrap();
        }
    }
}

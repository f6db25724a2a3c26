//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! The preview recovery sweep runs on a fixed interval, independent of
//! wake-up queue pressure. It is the correctness backstop that makes the
//! in-memory queue a pure latency optimization: every pending job is
//! eventually re-offered to the worker even if all hints were dropped.

use std::sync::Arc;

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::kernel::previews::PreviewScheduler;

/// Start all scheduled tasks
pub async fn start_scheduler(previews: Arc<PreviewScheduler>) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    // Preview recovery sweep - runs every 5 minutes
    let sweep_previews = Arc::clone(&previews);
    let sweep_job = Job::new_async("0 */5 * * * *", move |_uuid, _lock| {
        let previews = Arc::clone(&sweep_previews);
        Box::pin(async move {
            if let Err(e) = previews.recover_stale_jobs().await {
                tracing::error!("Preview recovery sweep failed: {}", e);
            }
        })
    })?;

    scheduler.add(sweep_job).await?;
    scheduler.start().await?;

    tracing::info!("Scheduled tasks started (preview recovery sweep every 5 minutes)");
    Ok(scheduler)
}

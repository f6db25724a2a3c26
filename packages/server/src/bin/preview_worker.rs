// Main entry point for the preview worker

use std::sync::Arc;

use anyhow::{Context, Result};
use server_core::kernel::previews::{
    LibreOfficeBackend, PgPreviewJobStore, PreviewScheduler, PreviewWorker, WakeQueue,
};
use server_core::kernel::{scheduled_tasks, PgFileStore};
use server_core::Config;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Dochive preview worker");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    // Wire the preview pipeline
    let store = Arc::new(PgPreviewJobStore::new(pool.clone()));
    let files = Arc::new(PgFileStore::new(pool.clone()));
    let backend = Arc::new(LibreOfficeBackend::new(&config.preview_output_dir));

    let (queue, intake) = WakeQueue::bounded(config.preview.queue_buffer_size);
    let scheduler = Arc::new(PreviewScheduler::new(
        store.clone(),
        queue,
        config.preview.clone(),
    ));

    let shutdown = CancellationToken::new();
    let worker = PreviewWorker::new(store, files, backend, config.preview.clone(), intake);
    let handles = worker.spawn(shutdown.clone());

    // Re-offer any work left over from a previous run before the cron kicks in
    scheduler
        .recover_stale_jobs()
        .await
        .context("Startup recovery sweep failed")?;

    let mut cron = scheduled_tasks::start_scheduler(scheduler.clone()).await?;

    tracing::info!("Preview worker running, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("Shutting down...");
    cron.shutdown().await?;
    shutdown.cancel();
    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}

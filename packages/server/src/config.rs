use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

use crate::common::{parse_duration, parse_duration_list};
use crate::kernel::previews::PreviewConfig;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Directory the conversion backend writes rendered artifacts into.
    pub preview_output_dir: String,
    pub preview: PreviewConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let defaults = PreviewConfig::default();

        let preview = PreviewConfig {
            queue_buffer_size: match env::var("PREVIEW_QUEUE_BUFFER_SIZE") {
                Ok(v) => v
                    .parse()
                    .context("PREVIEW_QUEUE_BUFFER_SIZE must be a valid number")?,
                Err(_) => defaults.queue_buffer_size,
            },
            max_attempts: match env::var("PREVIEW_MAX_ATTEMPTS") {
                Ok(v) => v
                    .parse()
                    .context("PREVIEW_MAX_ATTEMPTS must be a valid number")?,
                Err(_) => defaults.max_attempts,
            },
            retry_delays: match env::var("PREVIEW_RETRY_DELAYS") {
                Ok(v) => parse_duration_list(&v)
                    .context("PREVIEW_RETRY_DELAYS must be a duration list like '30s,2m,10m'")?,
                Err(_) => defaults.retry_delays,
            },
            stale_after: match env::var("PREVIEW_STALE_AFTER") {
                Ok(v) => parse_duration(&v)
                    .context("PREVIEW_STALE_AFTER must be a duration like '10m'")?,
                Err(_) => defaults.stale_after,
            },
            worker_count: match env::var("PREVIEW_WORKER_COUNT") {
                Ok(v) => v
                    .parse()
                    .context("PREVIEW_WORKER_COUNT must be a valid number")?,
                Err(_) => defaults.worker_count,
            },
        };
        preview
            .validate()
            .context("Invalid preview configuration")?;

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            preview_output_dir: env::var("PREVIEW_OUTPUT_DIR")
                .unwrap_or_else(|_| "previews".to_string()),
            preview,
        })
    }
}

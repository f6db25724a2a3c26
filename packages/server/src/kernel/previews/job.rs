//! Preview job model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::db_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "preview_job_status", rename_all = "snake_case")]
pub enum PreviewJobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

/// One row tracking a single preview-generation lineage for a file.
///
/// History may accumulate (several rows per file), but the scheduler keeps
/// at most one row per file in `pending` or `processing` at a time.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct PreviewJob {
    #[builder(default = db_id())]
    pub id: Uuid,

    pub file_id: Uuid,

    /// User that asked for the preview. System-triggered work leaves this unset.
    #[builder(default, setter(strip_option))]
    pub requested_by_id: Option<Uuid>,

    #[builder(default)]
    pub status: PreviewJobStatus,

    /// Conversion attempts made so far. Only a failed attempt increments it.
    #[builder(default = 0)]
    pub attempts: i32,
    #[builder(default = 3)]
    pub max_attempts: i32,

    #[builder(default, setter(strip_option))]
    pub last_error: Option<String>,

    /// Opaque artifact reference from the conversion backend, set on completion.
    #[builder(default, setter(strip_option))]
    pub artifact_path: Option<String>,

    #[builder(default, setter(strip_option))]
    pub started_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub completed_at: Option<DateTime<Utc>>,

    /// Advisory earliest time the recovery sweep should re-offer this job.
    /// The worker never sleeps on it.
    #[builder(default, setter(strip_option))]
    pub next_retry_at: Option<DateTime<Utc>>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl PreviewJob {
    /// Create a fresh pending job for a file.
    pub fn new_for_file(file_id: Uuid, requested_by_id: Option<Uuid>, max_attempts: i32) -> Self {
        let mut job = Self::builder()
            .file_id(file_id)
            .max_attempts(max_attempts)
            .build();
        job.requested_by_id = requested_by_id;
        job
    }

    /// Whether this row blocks admission of a new job for the same file.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self.status,
            PreviewJobStatus::Pending | PreviewJobStatus::Processing
        )
    }

    /// Terminal rows never change again without explicit caller action.
    pub fn is_terminal(&self) -> bool {
        match self.status {
            PreviewJobStatus::Completed => true,
            PreviewJobStatus::Failed => self.attempts >= self.max_attempts,
            _ => false,
        }
    }

    /// Whether an explicit retry may reopen this row in place.
    pub fn can_retry(&self) -> bool {
        self.status == PreviewJobStatus::Failed && self.attempts < self.max_attempts
    }
}

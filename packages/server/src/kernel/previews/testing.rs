//! In-memory doubles for preview scheduling tests.
//!
//! The store and the conversion backend are injected collaborators, so
//! tests swap in these deterministic implementations and never need a
//! database or a real converter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::common::db_id;
use crate::kernel::files::{FileStore, StoredFile};

use super::converter::{ConversionBackend, ConvertError};
use super::job::{PreviewJob, PreviewJobStatus};
use super::store::PreviewJobStore;

/// In-memory [`PreviewJobStore`] with inspection helpers.
#[derive(Default)]
pub struct TestJobStore {
    jobs: RwLock<HashMap<Uuid, PreviewJob>>,
}

impl TestJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows, in no particular order.
    pub fn jobs(&self) -> Vec<PreviewJob> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn job(&self, id: Uuid) -> Option<PreviewJob> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    /// Backdate a row so staleness tests don't have to wait out the
    /// threshold in real time.
    pub fn set_updated_at(&self, id: Uuid, updated_at: DateTime<Utc>) {
        if let Some(job) = self
            .jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&id)
        {
            job.updated_at = updated_at;
        }
    }

    fn latest<F>(&self, file_id: Uuid, pred: F) -> Option<PreviewJob>
    where
        F: Fn(&PreviewJob) -> bool,
    {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|job| job.file_id == file_id && pred(job))
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .cloned()
    }
}

#[async_trait]
impl PreviewJobStore for TestJobStore {
    async fn insert(&self, job: PreviewJob) -> Result<PreviewJob> {
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job.id, job.clone());
        Ok(job)
    }

    async fn update(&self, mut job: PreviewJob) -> Result<PreviewJob> {
        job.updated_at = Utc::now();
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job.id, job.clone());
        Ok(job)
    }

    async fn find_latest_by_file(&self, file_id: Uuid) -> Result<Option<PreviewJob>> {
        Ok(self.latest(file_id, |_| true))
    }

    async fn find_in_flight_by_file(&self, file_id: Uuid) -> Result<Option<PreviewJob>> {
        Ok(self.latest(file_id, PreviewJob::is_in_flight))
    }

    async fn find_pending_by_file(&self, file_id: Uuid) -> Result<Option<PreviewJob>> {
        Ok(self.latest(file_id, |job| job.status == PreviewJobStatus::Pending))
    }

    async fn find_stale_processing(&self, cutoff: DateTime<Utc>) -> Result<Vec<PreviewJob>> {
        Ok(self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|job| job.status == PreviewJobStatus::Processing && job.updated_at < cutoff)
            .cloned()
            .collect())
    }

    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<PreviewJob>> {
        Ok(self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|job| {
                job.status == PreviewJobStatus::Pending
                    && job.next_retry_at.map_or(true, |at| at <= now)
            })
            .cloned()
            .collect())
    }
}

/// In-memory [`FileStore`].
#[derive(Default)]
pub struct TestFileStore {
    files: RwLock<HashMap<Uuid, StoredFile>>,
}

impl TestFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, file: StoredFile) {
        self.files
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(file.id, file);
    }

    /// Add a plausible office document and return its id.
    pub fn add_document(&self, name: &str) -> Uuid {
        let file = StoredFile {
            id: db_id(),
            name: name.to_string(),
            mime_type: "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
                .to_string(),
            storage_path: format!("objects/{name}"),
            size_bytes: 1024,
            created_at: Utc::now(),
        };
        let id = file.id;
        self.add(file);
        id
    }
}

#[async_trait]
impl FileStore for TestFileStore {
    async fn find_by_id(&self, file_id: Uuid) -> Result<Option<StoredFile>> {
        Ok(self
            .files
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&file_id)
            .cloned())
    }
}

/// Scripted [`ConversionBackend`]: fails the first N calls, then succeeds.
pub struct MockConversionBackend {
    fail_first: usize,
    calls: AtomicUsize,
}

impl MockConversionBackend {
    /// Every call succeeds.
    pub fn succeeding() -> Self {
        Self::failing_times(0)
    }

    /// Every call fails.
    pub fn failing() -> Self {
        Self::failing_times(usize::MAX)
    }

    /// The first `n` calls fail, later calls succeed.
    pub fn failing_times(n: usize) -> Self {
        Self {
            fail_first: n,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of conversion calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConversionBackend for MockConversionBackend {
    async fn convert(&self, file: &StoredFile) -> Result<String, ConvertError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            Err(ConvertError::Backend(
                "synthetic conversion failure".to_string(),
            ))
        } else {
            Ok(format!("previews/{}.pdf", file.id))
        }
    }
}

//! Kernel module - scheduler infrastructure and collaborator seams.

pub mod files;
pub mod previews;
pub mod scheduled_tasks;

pub use files::{FileStore, PgFileStore, StoredFile};
pub use previews::{
    ConversionBackend, ConvertError, PgPreviewJobStore, PreviewConfig, PreviewJob,
    PreviewJobStatus, PreviewJobStore, PreviewJobTask, PreviewScheduler, PreviewWorker, WakeQueue,
};

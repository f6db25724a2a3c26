//! Preview-generation job scheduling.
//!
//! This module owns the lifecycle of document preview jobs:
//! - [`PreviewScheduler`] - admission (enqueue/retry), status lookup, and
//!   the stale-job recovery sweep
//! - [`PreviewWorker`] - sequential consumer that drives conversions
//! - [`PreviewJob`] - durable job row with CRUD via [`PreviewJobStore`]
//! - [`WakeQueue`] - bounded in-memory hint channel
//!
//! # Architecture
//!
//! ```text
//! Caller requests a preview
//!     │
//!     └─► PreviewScheduler.enqueue()
//!             ├─► dedup lookup + insert row (store is authoritative)
//!             └─► best-effort push onto WakeQueue (may drop)
//!
//! PreviewWorker (one task, strictly sequential)
//!     │
//!     ├─► re-validate: latest pending job for the file
//!     ├─► mark processing, load file, call ConversionBackend
//!     └─► mark completed, or record failure + backoff
//!
//! Recovery sweep (cron, every few minutes)
//!     ├─► reset processing rows untouched past the staleness threshold
//!     └─► re-announce due pending rows lost to queue overflow
//! ```
//!
//! The wake-up queue is a latency optimization, never the source of truth:
//! every pending row is eventually re-offered by the sweep even if all
//! hints were dropped or the process restarted.

mod converter;
mod job;
mod queue;
mod scheduler;
mod store;
pub mod testing;
mod worker;

pub use converter::{ConversionBackend, ConvertError, LibreOfficeBackend};
pub use job::{PreviewJob, PreviewJobStatus};
pub use queue::{PreviewJobTask, WakeQueue, WakeReceiver};
pub use scheduler::{PreviewConfig, PreviewScheduler};
pub use store::{PgPreviewJobStore, PreviewJobStore};
pub use worker::PreviewWorker;

//! Bounded in-memory wake-up queue.
//!
//! Producers never block: a full queue drops the hint and the recovery
//! sweep re-offers the job later. Correctness never depends on a hint
//! being delivered.

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Transient hint that a file may have a pending preview job.
///
/// Never the source of truth; the worker re-validates against the store
/// before acting, so these can be dropped or duplicated freely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewJobTask {
    pub file_id: Uuid,
    pub requested_by_id: Option<Uuid>,
}

/// Consumer half of the wake-up queue.
pub type WakeReceiver = mpsc::Receiver<PreviewJobTask>;

/// Producer half of the wake-up queue. Cheap to clone.
#[derive(Clone)]
pub struct WakeQueue {
    tx: mpsc::Sender<PreviewJobTask>,
    enabled: bool,
}

impl WakeQueue {
    /// Create a queue with the given capacity.
    ///
    /// A capacity of zero disables the hint path entirely: every push drops
    /// and the sweep becomes the only way work reaches the worker. Tests use
    /// this to exercise the sweep-only path deterministically.
    pub fn bounded(capacity: usize) -> (Self, WakeReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                enabled: capacity > 0,
            },
            rx,
        )
    }

    /// Best-effort push. Never blocks; returns whether the hint was delivered.
    pub fn push(&self, task: PreviewJobTask) -> bool {
        if !self.enabled {
            debug!(file_id = %task.file_id, "wake-up queue disabled, dropping hint");
            return false;
        }

        match self.tx.try_send(task) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(task)) => {
                warn!(
                    file_id = %task.file_id,
                    "wake-up queue full, dropping hint; recovery sweep will re-offer the job"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(task)) => {
                warn!(file_id = %task.file_id, "wake-up queue closed, dropping hint");
                false
            }
        }
    }
}

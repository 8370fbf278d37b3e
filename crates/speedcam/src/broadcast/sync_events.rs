//! Events published by the status synchronizer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::models::{Job, JobId, JobStatus};

#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A fresh snapshot replaced the stored one.
    Snapshot(Arc<Job>),
    /// A poll failed; the next one is scheduled after `retry_in`.
    PollFailed {
        job_id: JobId,
        error: String,
        retry_in: Duration,
    },
    /// The job reached a terminal status and polling ended.
    Stopped { job_id: JobId, status: JobStatus },
    /// Polling was cancelled before the job finished.
    Cancelled { job_id: JobId },
}

impl SyncEvent {
    pub fn job_id(&self) -> &JobId {
        match self {
            SyncEvent::Snapshot(job) => &job.id,
            SyncEvent::PollFailed { job_id, .. }
            | SyncEvent::Stopped { job_id, .. }
            | SyncEvent::Cancelled { job_id } => job_id,
        }
    }

    /// True for the last event a watcher of this id will see.
    pub fn is_final(&self) -> bool {
        matches!(self, SyncEvent::Stopped { .. } | SyncEvent::Cancelled { .. })
    }
}

#[derive(Clone)]
pub struct SyncEventBroadcaster {
    sender: Arc<broadcast::Sender<SyncEvent>>,
}

impl SyncEventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: SyncEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }
}

impl Default for SyncEventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

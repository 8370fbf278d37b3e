//! Upload progress broadcaster for real-time transfer streaming.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::JobId;

/// Phase of an upload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UploadPhase {
    Started,
    Transferring,
    Completed,
    Failed,
}

impl std::fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadPhase::Started => write!(f, "Started"),
            UploadPhase::Transferring => write!(f, "Transferring"),
            UploadPhase::Completed => write!(f, "Completed"),
            UploadPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Progress event for an upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgressEvent {
    /// Name of the file being sent.
    pub filename: String,
    /// Whole percent, 0-100.
    pub percent: u8,
    pub phase: UploadPhase,
    /// Job created by the server (set on completion).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    /// Error message (set on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl UploadProgressEvent {
    fn new(filename: &str, percent: u8, phase: UploadPhase) -> Self {
        Self {
            filename: filename.to_string(),
            percent,
            phase,
            job_id: None,
            error: None,
            timestamp: Utc::now(),
        }
    }
}

/// Broadcasts upload progress events.
#[derive(Clone)]
pub struct UploadProgressBroadcaster {
    sender: Arc<broadcast::Sender<UploadProgressEvent>>,
}

impl UploadProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: UploadProgressEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadProgressEvent> {
        self.sender.subscribe()
    }

    /// Creates a tracker for one upload and announces it at 0%.
    pub fn start_upload(&self, filename: &str) -> UploadProgressTracker {
        let tracker = UploadProgressTracker {
            filename: filename.to_string(),
            percent: AtomicU8::new(0),
            sender: Arc::clone(&self.sender),
        };
        tracker.emit(UploadProgressEvent::new(filename, 0, UploadPhase::Started));
        tracker
    }
}

impl Default for UploadProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Tracks a single upload. Reported percentages never decrease.
pub struct UploadProgressTracker {
    filename: String,
    percent: AtomicU8,
    sender: Arc<broadcast::Sender<UploadProgressEvent>>,
}

impl UploadProgressTracker {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn percent(&self) -> u8 {
        self.percent.load(Ordering::SeqCst)
    }

    /// Records `sent` of `total` bytes. Publishes only when the whole
    /// percentage grows; 100 is reserved for [`completed`](Self::completed).
    pub fn report(&self, sent: u64, total: u64) {
        let percent = if total == 0 {
            99
        } else {
            (sent.min(total).saturating_mul(100) / total).min(99) as u8
        };

        let previous = self.percent.fetch_max(percent, Ordering::SeqCst);
        if percent > previous {
            self.emit(UploadProgressEvent::new(
                &self.filename,
                percent,
                UploadPhase::Transferring,
            ));
        }
    }

    pub fn completed(&self, job_id: &JobId) {
        self.percent.store(100, Ordering::SeqCst);
        let mut event = UploadProgressEvent::new(&self.filename, 100, UploadPhase::Completed);
        event.job_id = Some(job_id.clone());
        self.emit(event);
    }

    /// Clears progress to 0 and publishes the failure.
    pub fn failed(&self, error: &str) {
        self.percent.store(0, Ordering::SeqCst);
        let mut event = UploadProgressEvent::new(&self.filename, 0, UploadPhase::Failed);
        event.error = Some(error.to_string());
        self.emit(event);
    }

    fn emit(&self, event: UploadProgressEvent) {
        let _ = self.sender.send(event);
    }
}

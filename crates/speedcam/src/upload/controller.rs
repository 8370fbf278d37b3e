//! Upload flow: pick a file, send it, hand the new job to the synchronizer.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;

use crate::broadcast::{JobStore, UploadProgressBroadcaster, UploadProgressEvent, UploadProgressTracker};
use crate::error::{Result, StateConflictError, ValidationError};
use crate::gateway::{JobGateway, UploadSource};
use crate::models::Job;
use crate::sync::{PollSubscription, StatusSynchronizer};
use crate::transport::ProgressFn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Selecting,
    Uploading,
    HandedOff,
}

impl std::fmt::Display for UploadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadState::Idle => write!(f, "idle"),
            UploadState::Selecting => write!(f, "selecting"),
            UploadState::Uploading => write!(f, "uploading"),
            UploadState::HandedOff => write!(f, "handed-off"),
        }
    }
}

/// Result of a successful upload: the created job and the subscription that
/// keeps it polled.
#[derive(Debug)]
pub struct HandOff {
    pub job: Arc<Job>,
    pub subscription: PollSubscription,
}

struct Shared {
    state: UploadState,
    selected: Option<UploadSource>,
    tracker: Option<Arc<UploadProgressTracker>>,
    last_error: Option<String>,
    job: Option<Arc<Job>>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    match shared.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            log::warn!("Upload controller lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Drives one upload at a time. Clones share state.
#[derive(Clone)]
pub struct UploadController {
    gateway: JobGateway,
    store: Arc<JobStore>,
    sync: StatusSynchronizer,
    broadcaster: UploadProgressBroadcaster,
    shared: Arc<Mutex<Shared>>,
}

impl UploadController {
    pub fn new(
        gateway: JobGateway,
        store: Arc<JobStore>,
        sync: StatusSynchronizer,
        broadcaster: UploadProgressBroadcaster,
    ) -> Self {
        Self {
            gateway,
            store,
            sync,
            broadcaster,
            shared: Arc::new(Mutex::new(Shared {
                state: UploadState::Idle,
                selected: None,
                tracker: None,
                last_error: None,
                job: None,
            })),
        }
    }

    pub fn state(&self) -> UploadState {
        lock(&self.shared).state
    }

    pub fn selected(&self) -> Option<UploadSource> {
        lock(&self.shared).selected.clone()
    }

    /// Whole percent of the current or last upload.
    pub fn progress(&self) -> u8 {
        lock(&self.shared)
            .tracker
            .as_ref()
            .map(|t| t.percent())
            .unwrap_or(0)
    }

    pub fn last_error(&self) -> Option<String> {
        lock(&self.shared).last_error.clone()
    }

    /// Job created by the last successful upload.
    pub fn job(&self) -> Option<Arc<Job>> {
        lock(&self.shared).job.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadProgressEvent> {
        self.broadcaster.subscribe()
    }

    /// Validates `path` against the upload rules and holds it for [`upload`](Self::upload).
    pub async fn select(&self, path: impl AsRef<Path>) -> Result<UploadSource> {
        self.ensure_not_uploading()?;

        let checked = match UploadSource::from_path(path).await {
            Ok(file) => self.gateway.rules().validate(&file).map(|_| file).map_err(Into::into),
            Err(e) => Err(e),
        };

        let mut shared = lock(&self.shared);
        if shared.state == UploadState::Uploading {
            return Err(StateConflictError::UploadInProgress.into());
        }
        match checked {
            Ok(file) => {
                log::debug!("Selected {} for upload", file.filename);
                shared.state = UploadState::Selecting;
                shared.selected = Some(file.clone());
                shared.tracker = None;
                shared.last_error = None;
                Ok(file)
            }
            Err(e) => {
                shared.last_error = Some(e.user_message());
                Err(e)
            }
        }
    }

    /// Uploads the selected file. On success the job is stored, its polling
    /// started and the controller is handed off; on failure it returns to
    /// selecting with the error retained.
    pub async fn upload(&self) -> Result<HandOff> {
        let (file, tracker) = {
            let mut shared = lock(&self.shared);
            if shared.state == UploadState::Uploading {
                return Err(StateConflictError::UploadInProgress.into());
            }
            let file = shared
                .selected
                .clone()
                .ok_or(ValidationError::NoFileSelected)?;

            let tracker = Arc::new(self.broadcaster.start_upload(&file.filename));
            shared.state = UploadState::Uploading;
            shared.tracker = Some(Arc::clone(&tracker));
            shared.last_error = None;
            (file, tracker)
        };

        let mut guard = UploadGuard {
            shared: &self.shared,
            tracker: &tracker,
            armed: true,
        };

        let observer = Arc::clone(&tracker);
        let progress: ProgressFn = Arc::new(move |sent, total| observer.report(sent, total));

        match self.gateway.create(file, Some(progress)).await {
            Ok(job) => {
                tracker.completed(&job.id);
                let job = self.store.replace_job(job);
                let subscription = self.sync.watch(&job.id);

                let mut shared = lock(&self.shared);
                shared.state = UploadState::HandedOff;
                shared.selected = None;
                shared.job = Some(Arc::clone(&job));
                guard.armed = false;

                log::info!("Uploaded {} as job {}", job.filename, job.id);
                Ok(HandOff { job, subscription })
            }
            Err(e) => {
                let message = e.user_message();
                tracker.failed(&message);

                let mut shared = lock(&self.shared);
                shared.state = UploadState::Selecting;
                shared.last_error = Some(message);
                guard.armed = false;

                log::warn!("Upload failed: {}", e);
                Err(e)
            }
        }
    }

    /// Drops the selection and returns to idle.
    pub fn reset(&self) -> Result<()> {
        let mut shared = lock(&self.shared);
        if shared.state == UploadState::Uploading {
            return Err(StateConflictError::UploadInProgress.into());
        }
        shared.state = UploadState::Idle;
        shared.selected = None;
        shared.tracker = None;
        shared.last_error = None;
        Ok(())
    }

    fn ensure_not_uploading(&self) -> Result<()> {
        if lock(&self.shared).state == UploadState::Uploading {
            return Err(StateConflictError::UploadInProgress.into());
        }
        Ok(())
    }
}

/// Puts the controller back into `selecting` if the upload future is dropped
/// before it finishes.
struct UploadGuard<'a> {
    shared: &'a Mutex<Shared>,
    tracker: &'a UploadProgressTracker,
    armed: bool,
}

impl Drop for UploadGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.tracker.failed("upload cancelled");
        let mut shared = lock(self.shared);
        if shared.state == UploadState::Uploading {
            shared.state = UploadState::Selecting;
        }
        log::debug!("Upload of {} cancelled", self.tracker.filename());
    }
}

//! Broadcasting modules for real-time event streaming and the shared
//! snapshot store they feed.

pub mod job_store;
pub mod sync_events;
pub mod upload_progress;

pub use job_store::{EpochSnapshot, JobStore};
pub use sync_events::{SyncEvent, SyncEventBroadcaster};
pub use upload_progress::{
    UploadPhase, UploadProgressBroadcaster, UploadProgressEvent, UploadProgressTracker,
};

//! Status synchronization: keeps job snapshots current while they are watched.

pub mod policy;
pub mod synchronizer;

pub use policy::{NextPoll, PollPolicy};
pub use synchronizer::{FocusedJob, PollSubscription, StatusSynchronizer, SyncState};

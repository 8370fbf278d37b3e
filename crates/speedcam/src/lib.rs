pub mod broadcast;
pub mod calibration;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod models;
pub mod sync;
pub mod transport;
pub mod upload;

pub use broadcast::{JobStore, SyncEvent, UploadProgressBroadcaster, UploadProgressEvent};
pub use calibration::{CaptureEngine, CaptureSurface, DisplaySize, FileSurface, NullSurface};
pub use client::SpeedcamClient;
pub use config::{load_config, load_or_default, ClientConfig};
pub use error::{ConfigError, Result, SpeedcamError, StateConflictError, ValidationError};
pub use gateway::{JobGateway, Locator, ProcessingConfig, UploadRules, UploadSource};
pub use logging::init_logging;
pub use models::{Calibration, CalibrationRecord, Detection, ImagePoint, Job, JobId, JobStatus};
pub use sync::{FocusedJob, PollSubscription, StatusSynchronizer, SyncState};
pub use transport::{HttpTransport, StubTransport, Transport};
pub use upload::{HandOff, UploadController, UploadState};

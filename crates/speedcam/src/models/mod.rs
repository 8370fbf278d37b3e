//! Wire types exchanged with the analysis server.

pub mod analytics;
pub mod calibration;
pub mod detection;
pub mod job;
pub mod timestamp;

pub use analytics::{AnalyticsSummary, HealthStatus};
pub use calibration::{
    Calibration, CalibrationMode, CalibrationRecord, ImagePoint, CALIBRATION_POINTS,
};
pub use detection::{Detection, DetectionFilter, DetectionSummary};
pub use job::{Ack, Job, JobId, JobStatus, JobStatusSnapshot};

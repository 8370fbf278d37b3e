//! Job (video) records as returned by the server.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::timestamp;

/// Opaque server-assigned job identifier.
///
/// The backend uses integer ids, but the id is treated as opaque text so that
/// string ids are accepted as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl FromStr for JobId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().to_string()))
    }
}

impl Serialize for JobId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Unsigned(u64),
            Signed(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Unsigned(n) => JobId(n.to_string()),
            RawId::Signed(n) => JobId(n.to_string()),
            RawId::Text(s) => JobId(s),
        })
    }
}

/// Server-side processing status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
    /// Any status this client does not know about.
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// Completed and failed jobs are frozen; nothing changes after them.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Statuses during which the record is expected to change soon.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Uploaded | JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Uploaded => write!(f, "uploaded"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Full job record (`GET /videos/{id}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub filename: String,
    pub status: JobStatus,
    /// Percentage 0-100, only meaningful while processing.
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub processed_frames: u64,
    #[serde(default)]
    pub total_frames: Option<u64>,
    /// Video length in seconds.
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub fps: Option<f64>,
    #[serde(default)]
    pub vehicle_count: u64,
    /// Speeds are in km/h.
    #[serde(default)]
    pub avg_speed: Option<f64>,
    #[serde(default)]
    pub max_speed: Option<f64>,
    #[serde(default)]
    pub min_speed: Option<f64>,
    #[serde(default)]
    pub speed_limit: Option<f64>,
    #[serde(default)]
    pub is_calibrated: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default, deserialize_with = "timestamp::deserialize_optional")]
    pub uploaded_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::deserialize_optional")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::deserialize_optional")]
    pub calibrated_at: Option<DateTime<Utc>>,
    /// Raw calibration payload as stored by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibration_data: Option<serde_json::Value>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Error text, present only for failed jobs.
    pub fn failure(&self) -> Option<&str> {
        match self.status {
            JobStatus::Failed => self.error_message.as_deref(),
            _ => None,
        }
    }
}

/// Lightweight status record (`GET /videos/{id}/status`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusSnapshot {
    pub id: JobId,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub processed_frames: u64,
    #[serde(default)]
    pub total_frames: Option<u64>,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Inference device used by the server.
    #[serde(default = "default_device")]
    pub device: String,
}

fn default_device() -> String {
    "cpu".to_string()
}

/// Acknowledgement for mutations that return no resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub message: Option<String>,
}

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gateway::ProcessingConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API root every request path is appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Cadence while a job is uploaded or processing.
    #[serde(default = "default_fast_interval")]
    pub fast_interval_ms: u64,
    /// Cadence for statuses the client does not recognise.
    #[serde(default = "default_idle_interval")]
    pub idle_interval_ms: u64,
    /// Capacity of the synchronizer event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_fast_interval() -> u64 {
    1000
}

fn default_idle_interval() -> u64 {
    5000
}

fn default_event_capacity() -> usize {
    100
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            fast_interval_ms: default_fast_interval(),
            idle_interval_ms: default_idle_interval(),
            event_capacity: default_event_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    /// Bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Bytes handed to the HTTP stack per progress step.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_allowed_extensions() -> Vec<String> {
    [".mp4", ".avi", ".mov", ".mkv", ".wmv"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_file_size() -> u64 {
    500 * 1024 * 1024
}

fn default_chunk_size() -> usize {
    64 * 1024
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: default_allowed_extensions(),
            max_file_size: default_max_file_size(),
            chunk_size: default_chunk_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Meters.
    #[serde(default = "default_reference_distance")]
    pub default_reference_distance: f64,
    /// Marker radius in native image pixels.
    #[serde(default = "default_marker_radius")]
    pub marker_radius: u32,
    /// TrueType/OpenType font used for point labels. Labels are skipped without one.
    #[serde(default)]
    pub label_font_path: Option<String>,
}

fn default_reference_distance() -> f64 {
    10.0
}

fn default_marker_radius() -> u32 {
    6
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            default_reference_distance: default_reference_distance(),
            marker_radius: default_marker_radius(),
            label_font_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

use std::path::PathBuf;
use thiserror::Error;

use crate::models::JobId;

#[derive(Error, Debug)]
pub enum SpeedcamError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Server rejected request (HTTP {status}): {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("State conflict: {0}")]
    StateConflict(#[from] StateConflictError),

    #[error("Failed to decode server response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Failed to process image: {0}")]
    Image(String),

    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SpeedcamError {
    /// True for an HTTP 404 from the server.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SpeedcamError::Http { status: 404, .. })
    }

    /// Job that must be calibrated before the failed operation can proceed.
    pub fn calibration_redirect(&self) -> Option<&JobId> {
        match self {
            SpeedcamError::StateConflict(StateConflictError::CalibrationRequired { job_id }) => {
                Some(job_id)
            }
            _ => None,
        }
    }

    /// Short message suitable for showing to an operator.
    pub fn user_message(&self) -> String {
        match self {
            SpeedcamError::Http { message, .. } => message.clone(),
            SpeedcamError::Network(reason) => format!("Server unreachable: {}", reason),
            other => other.to_string(),
        }
    }
}

impl From<image::ImageError> for SpeedcamError {
    fn from(err: image::ImageError) -> Self {
        SpeedcamError::Image(err.to_string())
    }
}

/// Precondition failures detected locally, before anything reaches the network.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("File type '{extension}' is not allowed (allowed: {allowed})")]
    UnsupportedExtension { extension: String, allowed: String },

    #[error("File is {size} bytes, exceeding the {max} byte limit")]
    FileTooLarge { size: u64, max: u64 },

    #[error("File '{0}' is empty")]
    EmptyFile(String),

    #[error("Path '{0}' has no file name")]
    MissingFileName(PathBuf),

    #[error("Cannot read '{path}': {reason}")]
    UnreadableFile { path: PathBuf, reason: String },

    #[error("No file selected for upload")]
    NoFileSelected,

    #[error("Invalid processing parameter '{field}': {reason}")]
    InvalidProcessingParameter { field: &'static str, reason: String },

    #[error("Calibration needs exactly 4 points, got {0}")]
    IncompleteCalibration(usize),

    #[error("Reference distance must be a positive number of meters, got {0}")]
    InvalidReferenceDistance(f64),

    #[error("Invalid display surface size {width}x{height}")]
    InvalidSurface { width: f64, height: f64 },

    #[error("Reference frame has not been loaded")]
    FrameNotLoaded,
}

/// An operation was attempted against a job or controller in an incompatible state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateConflictError {
    #[error("Job {job_id} must be calibrated before speed calculation can be enabled")]
    CalibrationRequired { job_id: JobId },

    #[error("An upload is already in progress")]
    UploadInProgress,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

pub type Result<T> = std::result::Result<T, SpeedcamError>;

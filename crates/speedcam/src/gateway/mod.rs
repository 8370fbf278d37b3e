//! Typed wrappers around the server's job endpoints.
//!
//! Every method maps to exactly one request. Errors propagate unchanged and
//! nothing is retried here; local preconditions (upload rules, processing
//! parameters, calibration completeness) are checked before anything is sent.

pub mod processing;
pub mod upload;

use std::sync::Arc;

use crate::error::Result;
use crate::models::{
    Ack, AnalyticsSummary, Calibration, CalibrationRecord, Detection, HealthStatus, Job, JobId,
    JobStatusSnapshot,
};
use crate::transport::{join_url, ApiRequest, ApiResponse, ProgressFn, Transport};

pub use processing::ProcessingConfig;
pub use upload::{UploadRules, UploadSource};

/// Multipart field the server expects the video under.
const UPLOAD_FIELD: &str = "file";

/// Where a downloadable artifact lives, relative and absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub path: String,
    pub url: String,
}

#[derive(Clone)]
pub struct JobGateway {
    transport: Arc<dyn Transport>,
    rules: UploadRules,
}

impl JobGateway {
    pub fn new(transport: Arc<dyn Transport>, rules: UploadRules) -> Self {
        Self { transport, rules }
    }

    pub fn rules(&self) -> &UploadRules {
        &self.rules
    }

    /// Uploads a video, creating a job in the `uploaded` state.
    pub async fn create(&self, file: UploadSource, progress: Option<ProgressFn>) -> Result<Job> {
        self.rules.validate(&file)?;

        log::info!("Uploading {} ({} bytes)", file.filename, file.size);
        let response = self
            .transport
            .send(ApiRequest::post_file(
                "/videos/upload",
                UPLOAD_FIELD,
                file,
                progress,
            ))
            .await?;
        response.json()
    }

    pub async fn list(&self) -> Result<Vec<Job>> {
        self.transport.send(ApiRequest::get("/videos")).await?.json()
    }

    pub async fn get(&self, id: &JobId) -> Result<Job> {
        self.transport
            .send(ApiRequest::get(video_path(id, "")))
            .await?
            .json()
    }

    pub async fn status(&self, id: &JobId) -> Result<JobStatusSnapshot> {
        self.transport
            .send(ApiRequest::get(video_path(id, "/status")))
            .await?
            .json()
    }

    pub async fn delete(&self, id: &JobId) -> Result<Ack> {
        let response = self
            .transport
            .send(ApiRequest::delete(video_path(id, "")))
            .await?;
        Ok(ack(&response))
    }

    pub async fn start_processing(&self, id: &JobId, config: &ProcessingConfig) -> Result<Job> {
        config.validate()?;

        let body = serde_json::to_value(config)?;
        self.transport
            .send(ApiRequest::post_json(video_path(id, "/process"), body))
            .await?
            .json()
    }

    /// Stored calibration, or `None` when the job is not calibrated.
    ///
    /// The server signals "not calibrated" with a 404, a `null` body,
    /// `{"calibrated": false}`, or a record without points.
    pub async fn get_calibration(&self, id: &JobId) -> Result<Option<CalibrationRecord>> {
        let response = match self
            .transport
            .send(ApiRequest::get(video_path(id, "/calibration")))
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        if response.is_empty_or_null() {
            return Ok(None);
        }

        // Saved records may arrive wrapped as `{video_id, calibration_data, message}`.
        let mut body: serde_json::Value = response.json()?;
        if let Some(inner) = body.get_mut("calibration_data") {
            body = inner.take();
        }
        if body.is_null() {
            return Ok(None);
        }

        let record: CalibrationRecord = serde_json::from_value(body)?;
        if record.calibrated == Some(false) || record.points.is_empty() {
            return Ok(None);
        }
        Ok(Some(record))
    }

    pub async fn save_calibration(&self, id: &JobId, calibration: &Calibration) -> Result<Ack> {
        let body = serde_json::to_value(calibration)?;
        let response = self
            .transport
            .send(ApiRequest::post_json(video_path(id, "/calibrate"), body))
            .await?;
        Ok(ack(&response))
    }

    pub async fn delete_calibration(&self, id: &JobId) -> Result<Ack> {
        let response = self
            .transport
            .send(ApiRequest::delete(video_path(id, "/calibration")))
            .await?;
        Ok(ack(&response))
    }

    pub async fn detections(&self, id: &JobId) -> Result<Vec<Detection>> {
        self.transport
            .send(ApiRequest::get(video_path(id, "/detections")))
            .await?
            .json()
    }

    /// Encoded still image used as the calibration background.
    pub async fn reference_frame(&self, id: &JobId) -> Result<Vec<u8>> {
        let response = self
            .transport
            .send(ApiRequest::get(video_path(id, "/frame")))
            .await?;
        Ok(response.body)
    }

    pub fn download_locator(&self, id: &JobId) -> Locator {
        self.locator(video_path(id, "/download"))
    }

    pub fn report_locator(&self, id: &JobId) -> Locator {
        self.locator(video_path(id, "/report/csv"))
    }

    pub async fn fetch(&self, locator: &Locator) -> Result<Vec<u8>> {
        let response = self
            .transport
            .send(ApiRequest::get(locator.path.clone()))
            .await?;
        Ok(response.body)
    }

    pub async fn analytics_summary(&self) -> Result<AnalyticsSummary> {
        self.transport
            .send(ApiRequest::get("/analytics/summary"))
            .await?
            .json()
    }

    pub async fn health(&self) -> Result<HealthStatus> {
        self.transport.send(ApiRequest::get("/health")).await?.json()
    }

    fn locator(&self, path: String) -> Locator {
        let url = join_url(self.transport.base_url(), &path);
        Locator { path, url }
    }
}

fn video_path(id: &JobId, suffix: &str) -> String {
    format!("/videos/{}{}", id, suffix)
}

/// Mutation responses vary between servers; anything that is not an object
/// with a message becomes an empty acknowledgement.
fn ack(response: &ApiResponse) -> Ack {
    if response.is_empty_or_null() {
        return Ack::default();
    }
    serde_json::from_slice(&response.body).unwrap_or_else(|e| {
        log::debug!("Unrecognised acknowledgement body: {}", e);
        Ack::default()
    })
}

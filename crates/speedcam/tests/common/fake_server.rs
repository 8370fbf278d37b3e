//! In-memory stand-in for the analysis server.
//!
//! Jobs, calibrations and deletions are kept in real state so that flows
//! spanning several calls (upload, calibrate, process, delete) behave like
//! they would against the service. Status progression is scripted per job:
//! each read of `/videos/{id}` consumes the next scripted `(status, progress)`.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageFormat, RgbImage};
use serde_json::{json, Value};
use tokio::time::Instant;

use speedcam::transport::{http_error, ApiRequest, ApiResponse, Method, RequestBody};
use speedcam::{Result, SpeedcamError, Transport};

const UPLOAD_PROGRESS_STEPS: u64 = 10;

struct FakeJob {
    filename: String,
    status: String,
    progress: u8,
    error_message: Option<String>,
    calibration: Option<Value>,
    script: VecDeque<(String, u8)>,
}

impl FakeJob {
    fn to_json(&self, id: u64) -> Value {
        json!({
            "id": id,
            "filename": self.filename,
            "status": self.status,
            "progress": self.progress,
            "is_calibrated": self.calibration.is_some(),
            "error_message": self.error_message,
            "uploaded_at": "2024-05-01T10:00:00",
        })
    }
}

#[derive(Default)]
struct State {
    next_id: u64,
    jobs: BTreeMap<u64, FakeJob>,
    fail_uploads: Option<(u16, String)>,
}

/// A request seen by the server.
#[derive(Debug, Clone)]
pub struct Hit {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub at: Instant,
}

pub struct FakeServer {
    state: Mutex<State>,
    hits: Mutex<Vec<Hit>>,
    frame: Vec<u8>,
    read_latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Encodes a blank PNG of the given size.
pub fn png_frame(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    RgbImage::new(width, height)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

impl Default for FakeServer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeServer {
    /// Server whose reference frames are 1280x720.
    pub fn new() -> Self {
        Self::with_frame(1280, 720)
    }

    pub fn with_frame(width: u32, height: u32) -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1,
                ..Default::default()
            }),
            hits: Mutex::new(Vec::new()),
            frame: png_frame(width, height),
            read_latency: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Delays every job read by `latency` (tokio time).
    pub fn with_read_latency(mut self, latency: Duration) -> Self {
        self.read_latency = latency;
        self
    }

    /// Adds a job directly, as if uploaded earlier.
    pub fn seed_job(&self, filename: &str, status: &str) -> u64 {
        let mut state = lock(&self.state);
        let id = state.next_id;
        state.next_id += 1;
        state.jobs.insert(
            id,
            FakeJob {
                filename: filename.to_string(),
                status: status.to_string(),
                progress: 0,
                error_message: None,
                calibration: None,
                script: VecDeque::new(),
            },
        );
        id
    }

    /// Queues status transitions applied on subsequent job reads.
    pub fn script(&self, id: u64, steps: &[(&str, u8)]) {
        let mut state = lock(&self.state);
        if let Some(job) = state.jobs.get_mut(&id) {
            job.script
                .extend(steps.iter().map(|(s, p)| (s.to_string(), *p)));
        }
    }

    /// Makes every upload fail with `status` and `detail`.
    pub fn fail_uploads(&self, status: u16, detail: &str) {
        lock(&self.state).fail_uploads = Some((status, detail.to_string()));
    }

    pub fn has_job(&self, id: u64) -> bool {
        lock(&self.state).jobs.contains_key(&id)
    }

    pub fn calibration(&self, id: u64) -> Option<Value> {
        lock(&self.state)
            .jobs
            .get(&id)
            .and_then(|job| job.calibration.clone())
    }

    pub fn status(&self, id: u64) -> Option<String> {
        lock(&self.state).jobs.get(&id).map(|job| job.status.clone())
    }

    pub fn hits(&self) -> Vec<Hit> {
        lock(&self.hits).clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        lock(&self.hits)
            .iter()
            .filter(|h| h.method == method && h.path == path)
            .count()
    }

    pub fn total(&self) -> usize {
        lock(&self.hits).len()
    }

    /// Most job reads that were outstanding at the same time.
    pub fn max_concurrent_reads(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn read_job(&self, id: u64) -> std::result::Result<Value, (u16, String)> {
        let mut state = lock(&self.state);
        let job = state.jobs.get_mut(&id).ok_or(not_found())?;
        if let Some((status, progress)) = job.script.pop_front() {
            if status == "failed" {
                job.error_message = Some("Inference crashed".to_string());
            }
            job.status = status;
            job.progress = progress;
        }
        Ok(job.to_json(id))
    }

    fn handle(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> std::result::Result<Value, (u16, String)> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let mut state = lock(&self.state);

        match (method, segments.as_slice()) {
            (Method::Get, ["health"]) => Ok(json!({"status": "healthy", "database": "ok"})),
            (Method::Get, ["videos"]) => Ok(Value::Array(
                state.jobs.iter().map(|(id, job)| job.to_json(*id)).collect(),
            )),
            (Method::Get, ["analytics", "summary"]) => {
                let count = |s: &str| state.jobs.values().filter(|j| j.status == s).count();
                Ok(json!({
                    "total_videos": state.jobs.len(),
                    "processing_videos": count("processing"),
                    "completed_videos": count("completed"),
                    "failed_videos": count("failed"),
                    "total_vehicles_detected": 0,
                }))
            }
            (_, ["videos", id, rest @ ..]) => {
                let id: u64 = id.parse().map_err(|_| not_found())?;
                if method == Method::Delete && rest.is_empty() {
                    state.jobs.remove(&id).ok_or(not_found())?;
                    return Ok(json!({"message": "Video deleted successfully"}));
                }
                let job = state.jobs.get_mut(&id).ok_or(not_found())?;

                match (method, rest) {
                    (Method::Get, ["status"]) => Ok(json!({
                        "id": id,
                        "status": job.status,
                        "progress": job.progress,
                        "device": "cpu",
                    })),
                    (Method::Post, ["process"]) => {
                        let speed = body
                            .and_then(|b| b.get("enable_speed_calculation"))
                            .and_then(Value::as_bool)
                            .unwrap_or(false);
                        if speed && job.calibration.is_none() {
                            return Err((400, "Video must be calibrated first".to_string()));
                        }
                        job.status = "processing".to_string();
                        job.progress = 0;
                        Ok(job.to_json(id))
                    }
                    (Method::Post, ["calibrate"]) => {
                        job.calibration = body.cloned();
                        Ok(json!({"message": "Calibration saved"}))
                    }
                    (Method::Get, ["calibration"]) => match &job.calibration {
                        Some(calibration) => Ok(json!({
                            "video_id": id,
                            "calibration_data": calibration,
                            "message": "Calibration retrieved",
                        })),
                        None => Ok(json!({"calibrated": false})),
                    },
                    (Method::Delete, ["calibration"]) => {
                        job.calibration = None;
                        Ok(json!({"message": "Calibration deleted"}))
                    }
                    (Method::Get, ["detections"]) => Ok(json!([
                        {"track_id": 1, "timestamp": 0.5, "frame_number": 15, "speed": 62.0, "is_speeding": false},
                        {"track_id": 2, "timestamp": 1.0, "frame_number": 30, "speed": 91.5, "is_speeding": true},
                    ])),
                    _ => Err(not_found()),
                }
            }
            _ => Err(not_found()),
        }
    }

    fn upload(&self, filename: &str) -> std::result::Result<Value, (u16, String)> {
        let mut state = lock(&self.state);
        if let Some(failure) = state.fail_uploads.clone() {
            return Err(failure);
        }
        let id = state.next_id;
        state.next_id += 1;
        let job = FakeJob {
            filename: filename.to_string(),
            status: "uploaded".to_string(),
            progress: 0,
            error_message: None,
            calibration: None,
            script: VecDeque::new(),
        };
        let body = job.to_json(id);
        state.jobs.insert(id, job);
        Ok(body)
    }
}

fn not_found() -> (u16, String) {
    (404, "Video not found".to_string())
}

/// Counts one outstanding job read.
struct ReadGuard<'a>(&'a FakeServer);

impl<'a> ReadGuard<'a> {
    fn enter(server: &'a FakeServer) -> Self {
        let now = server.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        server.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(server)
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for FakeServer {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let path = request.path.clone();
        let method = request.method;

        let body = match &request.body {
            RequestBody::Json(value) => Some(value.clone()),
            _ => None,
        };
        lock(&self.hits).push(Hit {
            method,
            path: path.clone(),
            body: body.clone(),
            at: Instant::now(),
        });

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let outcome = match (method, segments.as_slice(), request.body) {
            (Method::Post, ["videos", "upload"], RequestBody::Multipart { file, progress, .. }) => {
                if let Some(report) = progress {
                    for step in 1..=UPLOAD_PROGRESS_STEPS {
                        report(file.size * step / UPLOAD_PROGRESS_STEPS, file.size);
                    }
                }
                self.upload(&file.filename)
            }
            (Method::Get, ["videos", id], _) => {
                let _guard = ReadGuard::enter(self);
                if !self.read_latency.is_zero() {
                    tokio::time::sleep(self.read_latency).await;
                }
                match id.parse() {
                    Ok(id) => self.read_job(id),
                    Err(_) => Err(not_found()),
                }
            }
            (Method::Get, ["videos", id, "frame"], _) => {
                let exists = id.parse().map(|id| self.has_job(id)).unwrap_or(false);
                if !exists {
                    return Err(http_error(404, br#"{"detail": "Video not found"}"#));
                }
                return Ok(ApiResponse {
                    status: 200,
                    content_type: Some("image/png".to_string()),
                    body: self.frame.clone(),
                });
            }
            (Method::Get, ["videos", _, "download"], _) => {
                return Ok(ApiResponse {
                    status: 200,
                    content_type: Some("video/mp4".to_string()),
                    body: b"annotated-video".to_vec(),
                });
            }
            _ => self.handle(method, &path, body.as_ref()),
        };

        match outcome {
            Ok(value) => Ok(ApiResponse {
                status: 200,
                content_type: Some("application/json".to_string()),
                body: serde_json::to_vec(&value).map_err(SpeedcamError::from)?,
            }),
            Err((status, detail)) => Err(http_error(
                status,
                json!({ "detail": detail }).to_string().as_bytes(),
            )),
        }
    }

    fn base_url(&self) -> &str {
        "http://fake.local/api"
    }
}

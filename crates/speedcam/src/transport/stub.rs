//! Scripted transport for tests and offline use.
//!
//! Responses are queued per `(method, path)`. The last queued response for a
//! route is sticky and keeps being replayed once the queue drains, so a single
//! `on(...)` call scripts a route permanently.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::Instant;

use super::{http_error, ApiRequest, ApiResponse, Method, RequestBody, Transport};
use crate::error::{Result, SpeedcamError};

/// Number of progress callbacks a stubbed upload emits.
const UPLOAD_PROGRESS_STEPS: u64 = 4;

#[derive(Debug, Clone)]
pub struct StubResponse {
    status: u16,
    body: Vec<u8>,
    content_type: Option<String>,
    delay: Duration,
    network_error: Option<String>,
}

impl StubResponse {
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        Self {
            status,
            body: serde_json::to_vec(value).unwrap_or_default(),
            content_type: Some("application/json".to_string()),
            delay: Duration::ZERO,
            network_error: None,
        }
    }

    pub fn ok<T: Serialize>(value: &T) -> Self {
        Self::json(200, value)
    }

    pub fn bytes(status: u16, body: Vec<u8>, content_type: &str) -> Self {
        Self {
            status,
            body,
            content_type: Some(content_type.to_string()),
            delay: Duration::ZERO,
            network_error: None,
        }
    }

    pub fn error(status: u16, detail: &str) -> Self {
        Self::json(status, &serde_json::json!({ "detail": detail }))
    }

    /// Fails without a response, like a timeout or refused connection.
    pub fn network_error(reason: &str) -> Self {
        Self {
            status: 0,
            body: Vec::new(),
            content_type: None,
            delay: Duration::ZERO,
            network_error: Some(reason.to_string()),
        }
    }

    /// Holds the response back for `delay` (tokio time, so paused clocks apply).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A request as seen by the stub.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub json: Option<serde_json::Value>,
    pub uploaded_file: Option<String>,
    pub at: Instant,
}

#[derive(Default)]
struct InFlight {
    current: usize,
    max: usize,
}

pub struct StubTransport {
    base_url: String,
    routes: Mutex<HashMap<(Method, String), VecDeque<StubResponse>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    in_flight: Mutex<HashMap<String, InFlight>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Default for StubTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl StubTransport {
    pub fn new() -> Self {
        Self {
            base_url: "http://stub.local/api".to_string(),
            routes: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Queues a response for `method path`.
    pub fn on(&self, method: Method, path: &str, response: StubResponse) -> &Self {
        lock(&self.routes)
            .entry((method, path.to_string()))
            .or_default()
            .push_back(response);
        self
    }

    /// Replaces everything queued for `method path`.
    pub fn replace(&self, method: Method, path: &str, response: StubResponse) -> &Self {
        let mut routes = lock(&self.routes);
        let queue = routes.entry((method, path.to_string())).or_default();
        queue.clear();
        queue.push_back(response);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self, method: Method, path: &str) -> usize {
        lock(&self.requests)
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    pub fn total_requests(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Highest number of simultaneously outstanding requests seen for `path`.
    pub fn max_in_flight(&self, path: &str) -> usize {
        lock(&self.in_flight).get(path).map(|f| f.max).unwrap_or(0)
    }

    fn next_response(&self, method: Method, path: &str) -> Option<StubResponse> {
        let mut routes = lock(&self.routes);
        let queue = routes.get_mut(&(method, path.to_string()))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

/// Decrements the in-flight counter even when the request future is dropped.
struct InFlightGuard<'a> {
    stub: &'a StubTransport,
    path: String,
}

impl<'a> InFlightGuard<'a> {
    fn enter(stub: &'a StubTransport, path: &str) -> Self {
        let mut in_flight = lock(&stub.in_flight);
        let entry = in_flight.entry(path.to_string()).or_default();
        entry.current += 1;
        entry.max = entry.max.max(entry.current);
        Self {
            stub,
            path: path.to_string(),
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Some(entry) = lock(&self.stub.in_flight).get_mut(&self.path) {
            entry.current = entry.current.saturating_sub(1);
        }
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let (json, uploaded_file, progress) = match request.body {
            RequestBody::Empty => (None, None, None),
            RequestBody::Json(value) => (Some(value), None, None),
            RequestBody::Multipart { file, progress, .. } => {
                (None, Some(file.filename.clone()), progress.map(|p| (p, file.size)))
            }
        };

        lock(&self.requests).push(RecordedRequest {
            method: request.method,
            path: request.path.clone(),
            json,
            uploaded_file,
            at: Instant::now(),
        });

        let _guard = InFlightGuard::enter(self, &request.path);

        let response = self
            .next_response(request.method, &request.path)
            .unwrap_or_else(|| {
                StubResponse::error(
                    404,
                    &format!("No stub for {} {}", request.method, request.path),
                )
            });

        if let Some((report, total)) = progress {
            for step in 1..=UPLOAD_PROGRESS_STEPS {
                report(total * step / UPLOAD_PROGRESS_STEPS, total);
            }
        }

        if !response.delay.is_zero() {
            tokio::time::sleep(response.delay).await;
        }

        if let Some(reason) = response.network_error {
            return Err(SpeedcamError::Network(reason));
        }

        if (200..300).contains(&response.status) {
            Ok(ApiResponse {
                status: response.status,
                content_type: response.content_type,
                body: response.body,
            })
        } else {
            Err(http_error(response.status, &response.body))
        }
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

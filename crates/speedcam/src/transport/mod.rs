//! Request/response plumbing shared by every server call.
//!
//! All components talk to the server through a [`Transport`]. The production
//! implementation is [`HttpTransport`]; [`StubTransport`] replays scripted
//! responses for tests.

pub mod http;
pub mod stub;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::{Result, SpeedcamError};
use crate::gateway::UploadSource;

pub use http::HttpTransport;
pub use stub::{RecordedRequest, StubResponse, StubTransport};

/// Maximum length of a raw error body carried into an error message.
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Upload progress observer: `(bytes_sent, bytes_total)`.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Multipart {
        field: String,
        file: UploadSource,
        progress: Option<ProgressFn>,
    },
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => write!(f, "Empty"),
            RequestBody::Json(value) => f.debug_tuple("Json").field(value).finish(),
            RequestBody::Multipart {
                field,
                file,
                progress,
            } => f
                .debug_struct("Multipart")
                .field("field", field)
                .field("file", file)
                .field("progress", &progress.is_some())
                .finish(),
        }
    }
}

/// A request relative to the transport's base URL.
#[derive(Debug)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: RequestBody::Empty,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            body: RequestBody::Empty,
        }
    }

    pub fn post_json(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: RequestBody::Json(body),
        }
    }

    pub fn post_file(
        path: impl Into<String>,
        field: &str,
        file: UploadSource,
        progress: Option<ProgressFn>,
    ) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: RequestBody::Multipart {
                field: field.to_string(),
                file,
                progress,
            },
        }
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Empty body or a literal JSON `null`.
    pub fn is_empty_or_null(&self) -> bool {
        let text = String::from_utf8_lossy(&self.body);
        let text = text.trim();
        text.is_empty() || text == "null"
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a request. Non-2xx responses fail with [`SpeedcamError::Http`],
    /// missing responses (timeouts, connection failures) with
    /// [`SpeedcamError::Network`].
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;

    /// Absolute API root the request paths are relative to.
    fn base_url(&self) -> &str;
}

/// Joins the API root and a relative path.
pub fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Builds the error for a non-2xx response, extracting the server-supplied
/// message (`detail`, `message` or `error`) when the body is JSON.
pub fn http_error(status: u16, body: &[u8]) -> SpeedcamError {
    SpeedcamError::Http {
        status,
        message: server_message(status, body),
    }
}

fn server_message(status: u16, body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        for key in ["detail", "message", "error"] {
            match value.get(key) {
                Some(serde_json::Value::String(s)) => return s.clone(),
                // Request validation failures carry a list of {loc, msg} objects
                Some(serde_json::Value::Array(items)) => {
                    let messages: Vec<&str> = items
                        .iter()
                        .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                        .collect();
                    if !messages.is_empty() {
                        return messages.join("; ");
                    }
                }
                _ => {}
            }
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        format!("HTTP {}", status)
    } else if text.len() > MAX_ERROR_BODY_LENGTH {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &text[..end])
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(status: u16, body: &str) -> String {
        match http_error(status, body.as_bytes()) {
            SpeedcamError::Http { message, .. } => message,
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_detail_string() {
        assert_eq!(message(404, r#"{"detail": "Video not found"}"#), "Video not found");
    }

    #[test]
    fn test_detail_validation_list() {
        let body = r#"{"detail": [{"loc": ["body", "points"], "msg": "field required"}, {"msg": "bad value"}]}"#;
        assert_eq!(message(422, body), "field required; bad value");
    }

    #[test]
    fn test_plain_text_and_empty() {
        assert_eq!(message(502, "Bad gateway"), "Bad gateway");
        assert_eq!(message(500, ""), "HTTP 500");
    }

    #[test]
    fn test_long_body_truncated() {
        let long = "x".repeat(500);
        let msg = message(500, &long);
        assert!(msg.ends_with("... (truncated)"));
        assert!(msg.len() < 250);
    }

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("http://localhost:8000/api/", "/videos/1"),
            "http://localhost:8000/api/videos/1"
        );
        assert_eq!(join_url("http://h/api", "health"), "http://h/api/health");
    }
}

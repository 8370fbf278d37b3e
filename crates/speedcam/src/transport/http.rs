use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::Instrument;

use super::{http_error, join_url, ApiRequest, ApiResponse, Method, ProgressFn, RequestBody, Transport};
use crate::config::ApiConfig;
use crate::error::{Result, SpeedcamError};
use crate::gateway::UploadSource;

/// reqwest-backed transport with a fixed base URL and bounded timeouts.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    request_timeout: Duration,
    chunk_size: usize,
}

impl HttpTransport {
    pub fn new(api: &ApiConfig, chunk_size: usize) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(api.connect_timeout())
            .timeout(api.request_timeout())
            .build()
            .map_err(|e| SpeedcamError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            request_timeout: api.request_timeout(),
            chunk_size: chunk_size.max(1),
        })
    }

    fn classify(&self, err: reqwest::Error) -> SpeedcamError {
        if err.is_timeout() {
            SpeedcamError::Network(format!(
                "request timed out after {}s",
                self.request_timeout.as_secs()
            ))
        } else if err.is_connect() {
            SpeedcamError::Network(format!("connection failed: {}", err))
        } else {
            SpeedcamError::Network(err.to_string())
        }
    }

    async fn multipart_form(
        &self,
        field: String,
        file: UploadSource,
        progress: Option<ProgressFn>,
    ) -> Result<Form> {
        let data = tokio::fs::read(&file.path)
            .await
            .map_err(|e| SpeedcamError::Io {
                path: file.path.clone(),
                source: e,
            })?;
        let data = Arc::new(data);
        let total = data.len() as u64;
        let chunk_size = self.chunk_size;

        // Progress is reported as the HTTP stack pulls each chunk.
        let offsets = (0..data.len()).step_by(chunk_size);
        let stream = futures_util::stream::iter(offsets).map(move |start| {
            let end = (start + chunk_size).min(data.len());
            if let Some(report) = &progress {
                report(end as u64, total);
            }
            Ok::<_, std::io::Error>(data[start..end].to_vec())
        });

        let part = Part::stream_with_length(reqwest::Body::wrap_stream(stream), total)
            .file_name(file.filename.clone())
            .mime_str(&file.mime)
            .map_err(|e| SpeedcamError::Network(format!("invalid upload part: {}", e)))?;

        Ok(Form::new().part(field, part))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let span = tracing::info_span!(
            "api.request",
            method = %request.method,
            path = %request.path
        );

        async move {
            let url = join_url(&self.base_url, &request.path);
            let started = Instant::now();

            let builder = match request.method {
                Method::Get => self.client.get(&url),
                Method::Post => self.client.post(&url),
                Method::Delete => self.client.delete(&url),
            };
            let builder = match request.body {
                RequestBody::Empty => builder,
                RequestBody::Json(value) => builder.json(&value),
                RequestBody::Multipart {
                    field,
                    file,
                    progress,
                } => builder.multipart(self.multipart_form(field, file, progress).await?),
            };

            let response = match builder.send().await {
                Ok(response) => response,
                Err(e) => {
                    let err = self.classify(e);
                    tracing::warn!(
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        error = %err,
                        "request failed without response"
                    );
                    return Err(err);
                }
            };

            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.bytes().await.map_err(|e| self.classify(e))?.to_vec();
            let elapsed_ms = started.elapsed().as_millis() as u64;

            if (200..300).contains(&status) {
                tracing::debug!(status, elapsed_ms, bytes = body.len(), "request completed");
                Ok(ApiResponse {
                    status,
                    content_type,
                    body,
                })
            } else {
                let err = http_error(status, &body);
                tracing::warn!(status, elapsed_ms, error = %err, "request rejected");
                Err(err)
            }
        }
        .instrument(span)
        .await
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_creation() {
        let api = ApiConfig {
            base_url: "http://localhost:8000/api/".to_string(),
            ..Default::default()
        };
        let transport = HttpTransport::new(&api, 0).unwrap();
        assert_eq!(transport.base_url(), "http://localhost:8000/api");
        assert_eq!(transport.chunk_size, 1);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        // Port 9 (discard) on localhost is expected to refuse connections.
        let api = ApiConfig {
            base_url: "http://127.0.0.1:9/api".to_string(),
            request_timeout_secs: 2,
            connect_timeout_secs: 1,
        };
        let transport = HttpTransport::new(&api, 1024).unwrap();
        let result = transport.send(ApiRequest::get("/health")).await;
        assert!(matches!(result, Err(SpeedcamError::Network(_))));
    }
}

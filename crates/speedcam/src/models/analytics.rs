use serde::{Deserialize, Serialize};

/// Aggregate counts across all jobs (`GET /analytics/summary`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub total_videos: u64,
    pub processing_videos: u64,
    pub completed_videos: u64,
    pub failed_videos: u64,
    pub total_vehicles_detected: u64,
    /// Seconds.
    #[serde(default)]
    pub avg_processing_time: Option<f64>,
}

/// Liveness response (`GET /health`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub status: String,
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self.status.as_str(), "healthy" | "ok" | "up")
    }
}

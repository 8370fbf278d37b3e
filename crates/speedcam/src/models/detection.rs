//! Per-vehicle detections produced by a completed job.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// One observed vehicle crossing. Read-only on the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub video_id: Option<u64>,
    pub track_id: i64,
    /// Seconds from the start of the video.
    pub timestamp: f64,
    pub frame_number: u64,
    /// km/h
    pub speed: f64,
    #[serde(default)]
    pub is_speeding: bool,
}

/// Client-side filter over a detection list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionFilter {
    pub speeding_only: bool,
    pub min_speed: Option<f64>,
    pub max_speed: Option<f64>,
    pub track_id: Option<i64>,
}

impl DetectionFilter {
    pub fn matches(&self, detection: &Detection) -> bool {
        if self.speeding_only && !detection.is_speeding {
            return false;
        }
        if self.min_speed.is_some_and(|min| detection.speed < min) {
            return false;
        }
        if self.max_speed.is_some_and(|max| detection.speed > max) {
            return false;
        }
        if self.track_id.is_some_and(|id| detection.track_id != id) {
            return false;
        }
        true
    }

    pub fn apply(&self, detections: Vec<Detection>) -> Vec<Detection> {
        detections.into_iter().filter(|d| self.matches(d)).collect()
    }
}

/// Aggregate figures for a detection list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionSummary {
    pub detections: usize,
    pub distinct_tracks: usize,
    pub speeding: usize,
    pub avg_speed: Option<f64>,
    pub max_speed: Option<f64>,
}

impl DetectionSummary {
    pub fn from_detections(detections: &[Detection]) -> Self {
        if detections.is_empty() {
            return Self::default();
        }

        let tracks: HashSet<i64> = detections.iter().map(|d| d.track_id).collect();
        let total: f64 = detections.iter().map(|d| d.speed).sum();
        let max = detections
            .iter()
            .map(|d| d.speed)
            .fold(f64::NEG_INFINITY, f64::max);

        Self {
            detections: detections.len(),
            distinct_tracks: tracks.len(),
            speeding: detections.iter().filter(|d| d.is_speeding).count(),
            avg_speed: Some(total / detections.len() as f64),
            max_speed: Some(max),
        }
    }
}

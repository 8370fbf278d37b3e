use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Parameters sent with `POST /videos/{id}/process`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Minimum detector confidence, in (0, 1].
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Overlap threshold for non-maximum suppression, in (0, 1].
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f64,
    /// Requires a calibrated job.
    #[serde(default)]
    pub enable_speed_calculation: bool,
    /// km/h
    #[serde(default = "default_speed_limit")]
    pub speed_limit: f64,
}

fn default_confidence_threshold() -> f64 {
    0.3
}

fn default_iou_threshold() -> f64 {
    0.7
}

fn default_speed_limit() -> f64 {
    80.0
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            iou_threshold: default_iou_threshold(),
            enable_speed_calculation: false,
            speed_limit: default_speed_limit(),
        }
    }
}

impl ProcessingConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_unit_interval("confidence_threshold", self.confidence_threshold)?;
        check_unit_interval("iou_threshold", self.iou_threshold)?;

        if !(self.speed_limit.is_finite() && self.speed_limit > 0.0) {
            return Err(ValidationError::InvalidProcessingParameter {
                field: "speed_limit",
                reason: format!("must be positive, got {}", self.speed_limit),
            });
        }

        Ok(())
    }
}

fn check_unit_interval(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidProcessingParameter {
            field,
            reason: format!("must be in (0, 1], got {}", value),
        })
    }
}

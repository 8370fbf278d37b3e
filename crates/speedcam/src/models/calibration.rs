//! Four-point perspective calibration.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Number of points in a perspective calibration.
pub const CALIBRATION_POINTS: usize = 4;

/// A point in the source image's native pixel space.
///
/// Serialized as a `[x, y]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct ImagePoint {
    pub x: f64,
    pub y: f64,
}

impl ImagePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for ImagePoint {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<ImagePoint> for [f64; 2] {
    fn from(point: ImagePoint) -> Self {
        [point.x, point.y]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMode {
    #[default]
    FourPoint,
}

/// A calibration that is valid for persistence: exactly four points and a
/// positive reference distance in meters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CalibrationRecord")]
pub struct Calibration {
    mode: CalibrationMode,
    points: [ImagePoint; CALIBRATION_POINTS],
    reference_distance: f64,
    approximate: bool,
}

impl Calibration {
    pub fn new(points: &[ImagePoint], reference_distance: f64) -> Result<Self, ValidationError> {
        let points: [ImagePoint; CALIBRATION_POINTS] = points
            .try_into()
            .map_err(|_| ValidationError::IncompleteCalibration(points.len()))?;
        validate_reference_distance(reference_distance)?;

        Ok(Self {
            mode: CalibrationMode::FourPoint,
            points,
            reference_distance,
            approximate: false,
        })
    }

    /// Marks the reference distance as an estimate rather than a measurement.
    pub fn with_approximate(mut self, approximate: bool) -> Self {
        self.approximate = approximate;
        self
    }

    pub fn mode(&self) -> CalibrationMode {
        self.mode
    }

    pub fn points(&self) -> &[ImagePoint; CALIBRATION_POINTS] {
        &self.points
    }

    pub fn reference_distance(&self) -> f64 {
        self.reference_distance
    }

    pub fn approximate(&self) -> bool {
        self.approximate
    }
}

pub fn validate_reference_distance(distance: f64) -> Result<(), ValidationError> {
    if distance.is_finite() && distance > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidReferenceDistance(distance))
    }
}

/// Calibration as stored by the server; any field may be missing or partial.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub points: Vec<ImagePoint>,
    #[serde(default)]
    pub reference_distance: Option<f64>,
    #[serde(default)]
    pub approximate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibrated: Option<bool>,
}

impl CalibrationRecord {
    /// Points, but only when the record holds a complete set.
    pub fn complete_points(&self) -> Option<&[ImagePoint]> {
        (self.points.len() == CALIBRATION_POINTS).then_some(self.points.as_slice())
    }

    /// Reference distance, but only when it is usable.
    pub fn usable_reference_distance(&self) -> Option<f64> {
        self.reference_distance
            .filter(|d| validate_reference_distance(*d).is_ok())
    }
}

impl TryFrom<CalibrationRecord> for Calibration {
    type Error = ValidationError;

    fn try_from(record: CalibrationRecord) -> Result<Self, Self::Error> {
        let distance = record.reference_distance.unwrap_or(0.0);
        Ok(Calibration::new(&record.points, distance)?.with_approximate(record.approximate))
    }
}

impl From<&Calibration> for CalibrationRecord {
    fn from(calibration: &Calibration) -> Self {
        Self {
            mode: Some("four_point".to_string()),
            points: calibration.points.to_vec(),
            reference_distance: Some(calibration.reference_distance),
            approximate: calibration.approximate,
            calibrated: Some(true),
        }
    }
}

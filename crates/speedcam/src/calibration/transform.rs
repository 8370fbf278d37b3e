//! Display space to native image space.

use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::models::ImagePoint;

/// Size at which the reference frame is shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplaySize {
    pub width: f64,
    pub height: f64,
}

impl DisplaySize {
    pub fn new(width: f64, height: f64) -> Result<Self, ValidationError> {
        let size = Self { width, height };
        size.validate()?;
        Ok(size)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if valid(self.width) && valid(self.height) {
            Ok(())
        } else {
            Err(ValidationError::InvalidSurface {
                width: self.width,
                height: self.height,
            })
        }
    }
}

impl fmt::Display for DisplaySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Parses `WIDTHxHEIGHT`, e.g. `1280x720`.
impl FromStr for DisplaySize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
        let width: f64 = w.trim().parse().map_err(|_| format!("invalid width '{}'", w))?;
        let height: f64 = h.trim().parse().map_err(|_| format!("invalid height '{}'", h))?;
        DisplaySize::new(width, height).map_err(|e| e.to_string())
    }
}

/// Scales a click on the displayed frame to native pixel coordinates, per axis.
pub fn display_to_image(
    x: f64,
    y: f64,
    displayed: DisplaySize,
    native: (u32, u32),
) -> Result<ImagePoint, ValidationError> {
    displayed.validate()?;
    let scale_x = native.0 as f64 / displayed.width;
    let scale_y = native.1 as f64 / displayed.height;
    Ok(ImagePoint::new(x * scale_x, y * scale_y))
}

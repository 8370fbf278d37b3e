//! Point markers and the calibration quadrilateral drawn over the frame.

use std::path::Path;

use ab_glyph::FontArc;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, draw_text_mut};

use crate::config::CalibrationConfig;
use crate::error::{Result, SpeedcamError};
use crate::models::{ImagePoint, CALIBRATION_POINTS};

/// One clicked point and its 1-based label.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub label: String,
    pub at: ImagePoint,
}

/// Everything drawn over the reference frame for a point set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlay {
    pub markers: Vec<Marker>,
    /// Closed outline in recorded order, present only for a complete set.
    pub outline: Option<[ImagePoint; CALIBRATION_POINTS]>,
}

impl Overlay {
    /// Edges of the outline, the last one closing the polygon.
    pub fn edges(&self) -> Vec<(ImagePoint, ImagePoint)> {
        match &self.outline {
            Some(points) => (0..CALIBRATION_POINTS)
                .map(|i| (points[i], points[(i + 1) % CALIBRATION_POINTS]))
                .collect(),
            None => Vec::new(),
        }
    }
}

pub fn build_overlay(points: &[ImagePoint]) -> Overlay {
    let markers = points
        .iter()
        .enumerate()
        .map(|(i, p)| Marker {
            label: (i + 1).to_string(),
            at: *p,
        })
        .collect();

    let outline = <[ImagePoint; CALIBRATION_POINTS]>::try_from(points).ok();

    Overlay { markers, outline }
}

#[derive(Clone)]
pub struct OverlayStyle {
    pub marker_radius: u32,
    pub marker_color: Rgb<u8>,
    pub outline_color: Rgb<u8>,
    pub label_color: Rgb<u8>,
    /// Labels are only drawn when a font is available.
    pub font: Option<FontArc>,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            marker_radius: 6,
            marker_color: Rgb([255, 48, 48]),
            outline_color: Rgb([48, 220, 96]),
            label_color: Rgb([255, 255, 255]),
            font: None,
        }
    }
}

impl OverlayStyle {
    pub fn from_config(config: &CalibrationConfig) -> Result<Self> {
        let font = match &config.label_font_path {
            Some(path) => Some(load_font(path)?),
            None => None,
        };
        Ok(Self {
            marker_radius: config.marker_radius.max(1),
            font,
            ..Default::default()
        })
    }
}

pub fn load_font(path: impl AsRef<Path>) -> Result<FontArc> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| SpeedcamError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    FontArc::try_from_vec(data)
        .map_err(|e| SpeedcamError::Image(format!("invalid font {:?}: {}", path, e)))
}

/// Draws `overlay` onto a copy of `frame`: outline first, then markers and labels.
pub fn render_overlay(frame: &RgbImage, overlay: &Overlay, style: &OverlayStyle) -> RgbImage {
    let mut canvas = frame.clone();

    for (from, to) in overlay.edges() {
        draw_line_segment_mut(
            &mut canvas,
            (from.x as f32, from.y as f32),
            (to.x as f32, to.y as f32),
            style.outline_color,
        );
    }

    let radius = style.marker_radius as i32;
    let label_scale = (style.marker_radius as f32 * 3.0).max(14.0);

    for marker in &overlay.markers {
        let center = (marker.at.x.round() as i32, marker.at.y.round() as i32);
        draw_filled_circle_mut(&mut canvas, center, radius, style.marker_color);

        if let Some(font) = &style.font {
            draw_text_mut(
                &mut canvas,
                style.label_color,
                center.0 + radius + 2,
                center.1 - radius - label_scale as i32,
                label_scale,
                font,
                &marker.label,
            );
        }
    }

    canvas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(n: usize) -> Vec<ImagePoint> {
        [(10.0, 10.0), (50.0, 10.0), (50.0, 40.0), (10.0, 40.0), (30.0, 30.0)]
            .iter()
            .take(n)
            .map(|&(x, y)| ImagePoint::new(x, y))
            .collect()
    }

    #[test]
    fn test_labels_follow_click_order() {
        let overlay = build_overlay(&points(3));
        let labels: Vec<&str> = overlay.markers.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, vec!["1", "2", "3"]);
        assert!(overlay.outline.is_none());
        assert!(overlay.edges().is_empty());
    }

    #[test]
    fn test_outline_only_for_complete_set() {
        let overlay = build_overlay(&points(4));
        let edges = overlay.edges();
        assert_eq!(edges.len(), 4);
        assert_eq!(edges[3], (ImagePoint::new(10.0, 40.0), ImagePoint::new(10.0, 10.0)));

        assert!(build_overlay(&points(0)).markers.is_empty());
    }

    #[test]
    fn test_render_draws_markers_and_outline() {
        let frame = RgbImage::new(64, 48);
        let style = OverlayStyle::default();
        let rendered = render_overlay(&frame, &build_overlay(&points(4)), &style);

        assert_eq!(rendered.dimensions(), (64, 48));
        assert_eq!(*rendered.get_pixel(10, 10), style.marker_color);
        // Midpoint of the top edge, away from any marker
        assert_eq!(*rendered.get_pixel(30, 10), style.outline_color);
        assert_eq!(*rendered.get_pixel(30, 25), Rgb([0, 0, 0]));
        assert_eq!(*frame.get_pixel(10, 10), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_partial_set_has_no_outline_pixels() {
        let frame = RgbImage::new(64, 48);
        let rendered = render_overlay(&frame, &build_overlay(&points(2)), &OverlayStyle::default());
        assert_eq!(*rendered.get_pixel(30, 10), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_missing_font_file() {
        let config = CalibrationConfig {
            label_font_path: Some("/nonexistent/font.ttf".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            OverlayStyle::from_config(&config),
            Err(SpeedcamError::Io { .. })
        ));
    }
}

//! Four-click calibration capture over a job's reference frame.

use std::path::PathBuf;
use std::sync::Arc;

use image::RgbImage;

use super::geometry::{classify, QuadShape};
use super::overlay::{build_overlay, render_overlay, Overlay, OverlayStyle};
use super::transform::{display_to_image, DisplaySize};
use crate::broadcast::JobStore;
use crate::config::CalibrationConfig;
use crate::error::{Result, ValidationError};
use crate::gateway::JobGateway;
use crate::models::{Calibration, ImagePoint, JobId, CALIBRATION_POINTS};

/// Where the engine shows the frame and its overlay after each change.
pub trait CaptureSurface: Send {
    fn present(&mut self, frame: &RgbImage, overlay: &Overlay) -> Result<()>;
}

/// Discards every presentation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSurface;

impl CaptureSurface for NullSurface {
    fn present(&mut self, _frame: &RgbImage, _overlay: &Overlay) -> Result<()> {
        Ok(())
    }
}

/// Writes the rendered overlay to an image file (format from the extension).
pub struct FileSurface {
    path: PathBuf,
    style: OverlayStyle,
}

impl FileSurface {
    pub fn new(path: impl Into<PathBuf>, style: OverlayStyle) -> Self {
        Self {
            path: path.into(),
            style,
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl CaptureSurface for FileSurface {
    fn present(&mut self, frame: &RgbImage, overlay: &Overlay) -> Result<()> {
        render_overlay(frame, overlay, &self.style).save(&self.path)?;
        log::debug!("Wrote calibration preview to {:?}", self.path);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    AwaitingFrame,
    /// Fewer than four points.
    Ready,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClickOutcome {
    /// Point recorded; `index` is 0-based.
    Added { index: usize, point: ImagePoint },
    /// Four points already recorded.
    Ignored,
}

/// A saved calibration; the capture screen can be left.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    pub job_id: JobId,
    pub calibration: Calibration,
    pub message: Option<String>,
}

pub struct CaptureEngine {
    job_id: JobId,
    gateway: JobGateway,
    store: Arc<JobStore>,
    surface: Box<dyn CaptureSurface>,
    default_reference_distance: f64,
    frame: Option<RgbImage>,
    points: Vec<ImagePoint>,
    reference_distance: f64,
    approximate: bool,
    redraws: usize,
}

impl CaptureEngine {
    pub fn new(
        job_id: JobId,
        gateway: JobGateway,
        store: Arc<JobStore>,
        surface: Box<dyn CaptureSurface>,
        config: &CalibrationConfig,
    ) -> Self {
        Self {
            job_id,
            gateway,
            store,
            surface,
            default_reference_distance: config.default_reference_distance,
            frame: None,
            points: Vec::with_capacity(CALIBRATION_POINTS),
            reference_distance: config.default_reference_distance,
            approximate: false,
            redraws: 0,
        }
    }

    /// Fetches the reference frame and any stored calibration concurrently.
    ///
    /// A frame failure aborts activation. A calibration read failure is
    /// logged and treated as "not calibrated".
    pub async fn activate(&mut self) -> Result<()> {
        self.frame = None;
        self.points.clear();
        self.reference_distance = self.default_reference_distance;
        self.approximate = false;

        let epoch = self.store.epoch(&self.job_id);
        let (frame, existing) = tokio::join!(
            self.gateway.reference_frame(&self.job_id),
            self.gateway.get_calibration(&self.job_id)
        );

        let frame = image::load_from_memory(&frame?)?.to_rgb8();
        log::debug!(
            "Loaded reference frame for job {} ({}x{})",
            self.job_id,
            frame.width(),
            frame.height()
        );

        let existing = match existing {
            Ok(record) => {
                self.store
                    .replace_calibration_if_current(&self.job_id, record.clone(), epoch);
                record
            }
            Err(e) => {
                log::warn!(
                    "Could not read calibration for job {}, starting empty: {}",
                    self.job_id,
                    e
                );
                None
            }
        };

        if let Some(record) = existing {
            if let Some(points) = record.complete_points() {
                self.points = points.to_vec();
            }
            if let Some(distance) = record.usable_reference_distance() {
                self.reference_distance = distance;
            }
            self.approximate = record.approximate;
        }

        self.frame = Some(frame);
        self.redraw();
        Ok(())
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn state(&self) -> CaptureState {
        match (&self.frame, self.points.len()) {
            (None, _) => CaptureState::AwaitingFrame,
            (Some(_), n) if n >= CALIBRATION_POINTS => CaptureState::Complete,
            (Some(_), _) => CaptureState::Ready,
        }
    }

    pub fn native_size(&self) -> Option<(u32, u32)> {
        self.frame.as_ref().map(|f| f.dimensions())
    }

    pub fn points(&self) -> &[ImagePoint] {
        &self.points
    }

    pub fn reference_distance(&self) -> f64 {
        self.reference_distance
    }

    pub fn approximate(&self) -> bool {
        self.approximate
    }

    /// Number of times the surface has been redrawn.
    pub fn redraws(&self) -> usize {
        self.redraws
    }

    pub fn overlay(&self) -> Overlay {
        build_overlay(&self.points)
    }

    /// Frame with the current overlay, if a frame is loaded.
    pub fn render(&self, style: &OverlayStyle) -> Option<RgbImage> {
        self.frame
            .as_ref()
            .map(|frame| render_overlay(frame, &self.overlay(), style))
    }

    /// Records a click made on the frame as displayed at `displayed`.
    pub fn click(&mut self, x: f64, y: f64, displayed: DisplaySize) -> Result<ClickOutcome> {
        let native = self.native_size().ok_or(ValidationError::FrameNotLoaded)?;
        displayed.validate()?;

        if self.points.len() >= CALIBRATION_POINTS {
            log::debug!("Ignoring click, calibration for job {} is complete", self.job_id);
            return Ok(ClickOutcome::Ignored);
        }

        let point = display_to_image(x, y, displayed, native)?;
        self.points.push(point);
        self.redraw();

        Ok(ClickOutcome::Added {
            index: self.points.len() - 1,
            point,
        })
    }

    /// Removes the most recent point.
    pub fn undo(&mut self) -> Option<ImagePoint> {
        let removed = self.points.pop();
        if removed.is_some() {
            self.redraw();
        }
        removed
    }

    /// Clears all points and restores the default reference distance.
    /// Nothing is sent to the server.
    pub fn reset(&mut self) {
        self.points.clear();
        self.reference_distance = self.default_reference_distance;
        self.approximate = false;
        self.redraw();
    }

    /// Checked on [`save`](Self::save), not here.
    pub fn set_reference_distance(&mut self, meters: f64) {
        self.reference_distance = meters;
    }

    pub fn set_approximate(&mut self, approximate: bool) {
        self.approximate = approximate;
    }

    /// Persists the calibration and invalidates the cached job and
    /// calibration for this id.
    pub async fn save(&mut self) -> Result<SaveOutcome> {
        let calibration = Calibration::new(&self.points, self.reference_distance)?
            .with_approximate(self.approximate);

        match classify(calibration.points()) {
            QuadShape::Convex => {}
            shape => log::warn!(
                "Calibration for job {} is {:?}; speed estimates may be unreliable",
                self.job_id,
                shape
            ),
        }

        let ack = self
            .gateway
            .save_calibration(&self.job_id, &calibration)
            .await?;
        self.store.invalidate(&self.job_id);

        log::info!(
            "Saved calibration for job {} ({} m reference)",
            self.job_id,
            calibration.reference_distance()
        );

        Ok(SaveOutcome {
            job_id: self.job_id.clone(),
            calibration,
            message: ack.message,
        })
    }

    fn redraw(&mut self) {
        let Some(frame) = &self.frame else {
            return;
        };
        let overlay = build_overlay(&self.points);
        if let Err(e) = self.surface.present(frame, &overlay) {
            log::warn!("Failed to present calibration overlay: {}", e);
        }
        self.redraws += 1;
    }
}

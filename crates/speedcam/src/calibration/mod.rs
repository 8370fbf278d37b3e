//! Calibration capture: four clicks on a reference frame, scaled to native
//! pixels, drawn as an overlay and saved as a perspective calibration.

pub mod capture;
pub mod geometry;
pub mod overlay;
pub mod transform;

pub use capture::{
    CaptureEngine, CaptureState, CaptureSurface, ClickOutcome, FileSurface, NullSurface,
    SaveOutcome,
};
pub use geometry::{classify, QuadShape};
pub use overlay::{build_overlay, load_font, render_overlay, Marker, Overlay, OverlayStyle};
pub use transform::{display_to_image, DisplaySize};

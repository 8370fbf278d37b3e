pub mod controller;

pub use controller::{HandOff, UploadController, UploadState};

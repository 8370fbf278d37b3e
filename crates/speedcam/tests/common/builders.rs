//! Builders for client configs and sample files.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use speedcam::{ClientConfig, SpeedcamClient};

use super::FakeServer;

/// Builder for creating `ClientConfig` instances.
pub struct ConfigBuilder {
    config: ClientConfig,
}

impl ConfigBuilder {
    /// Defaults with a 1 s / 5 s polling cadence.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.upload.max_file_size = bytes;
        self
    }

    pub fn allowed_extensions(mut self, extensions: &[&str]) -> Self {
        self.config.upload.allowed_extensions =
            extensions.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn polling(mut self, fast_ms: u64, idle_ms: u64) -> Self {
        self.config.polling.fast_interval_ms = fast_ms;
        self.config.polling.idle_interval_ms = idle_ms;
        self
    }

    pub fn reference_distance(mut self, meters: f64) -> Self {
        self.config.calibration.default_reference_distance = meters;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }

    /// Client talking to `server`.
    pub fn client(self, server: &Arc<FakeServer>) -> SpeedcamClient {
        SpeedcamClient::with_transport(self.build(), server.clone())
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Temporary directory holding sample upload files.
pub struct Videos {
    dir: TempDir,
}

impl Videos {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    /// Writes `size` bytes to `name` and returns its path.
    pub fn file(&self, name: &str, size: usize) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, vec![0u8; size]).unwrap();
        path
    }
}

impl Default for Videos {
    fn default() -> Self {
        Self::new()
    }
}

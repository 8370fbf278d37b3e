//! Shared test utilities for speedcam integration tests.
//!
//! This module provides:
//! - `FakeServer`, an in-memory server behind the `Transport` trait
//! - Builders for client configs and sample video files

pub mod builders;
pub mod fake_server;

pub use builders::*;
pub use fake_server::FakeServer;

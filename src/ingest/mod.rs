//! Frame ingestion.
//!
//! Real cameras are an external collaborator: whatever delivers frames calls
//! `Pipeline::offer` once per frame from its own thread. This module provides
//! the synthetic `stub://` source the daemon and tests drive the pipeline with.

pub mod camera;

pub use camera::{CameraConfig, CameraSource, CameraStats};

//! livedetect
//!
//! Real-time frame admission and inference telemetry for live object
//! detection.
//!
//! # Architecture
//!
//! A camera delivers frames at a fixed nominal rate; an inference engine is
//! usually slower. The pipeline keeps up by construction:
//!
//! 1. **Single flight**: at most one frame is under inference at any instant.
//! 2. **Drop, never queue**: frames arriving while inference is in flight are
//!    discarded in O(1) without blocking the camera thread.
//! 3. **Exactly-once completion**: every admitted frame releases the gate,
//!    whether inference succeeds, fails, or the engine loses the frame.
//! 4. **Fixed-memory telemetry**: inference time, execution time and fps are
//!    smoothed by bounded moving averages and readable without locks.
//! 5. **Replace-on-write results**: each completed inference supersedes the
//!    previously published detections.
//!
//! # Module Structure
//!
//! - `gate`: single-flight admission flag
//! - `telemetry`: moving-average filter and telemetry recorder
//! - `pipeline`: offer/complete flow tying gate, recorder and sink together
//! - `engine`: inference engine boundary and the threaded backend runner
//! - `detect`: detection types, backends, post-processing
//! - `sink`: published result sets
//! - `ingest`: synthetic camera source
//! - `config`: file + environment configuration

pub mod config;
pub mod detect;
pub mod engine;
pub mod frame;
pub mod gate;
pub mod ingest;
pub mod pipeline;
pub mod sink;
pub mod telemetry;

pub use config::{DetectorSettings, PipelineConfig, TelemetrySettings};
pub use detect::{
    BackendRegistry, BoundingBox, Detection, DetectionSet, DetectorBackend, Postprocess,
    StubBackend,
};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use engine::{InferenceEngine, ThreadedEngine};
pub use frame::RawFrame;
pub use gate::{Admission, AdmissionGate};
pub use ingest::{CameraConfig, CameraSource, CameraStats};
pub use pipeline::{Completion, Pipeline, PipelineStats};
pub use sink::{LatestDetections, ResultSink};
pub use telemetry::{
    Clock, ManualClock, MovingAverage, SystemClock, TelemetryRecorder, TelemetrySnapshot,
};

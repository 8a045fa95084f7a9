mod backend;
mod backends;
mod postprocess;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use postprocess::{
    Postprocess, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_IOU_THRESHOLD, DEFAULT_MAX_DETECTIONS,
};
pub use registry::BackendRegistry;
pub use result::{BoundingBox, Detection, DetectionSet};

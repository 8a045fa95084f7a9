//! Operator-facing performance telemetry.
//!
//! - `filter`: bounded moving-average filter
//! - `recorder`: per-frame timestamps turned into smoothed inference time,
//!   execution time and fps
//! - `clock`: timestamp source, swappable for replaying timings

mod clock;
mod filter;
mod recorder;

pub use clock::{Clock, ManualClock, SystemClock};
pub use filter::{MovingAverage, DEFAULT_WINDOW};
pub use recorder::{TelemetryRecorder, TelemetrySnapshot};

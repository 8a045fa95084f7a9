//! Raw camera frames.
//!
//! `RawFrame` is the opaque pixel buffer the camera collaborator produces. It is
//! deliberately not `Clone`: ownership moves from the camera into the pipeline
//! and from there into the inference engine, so an admitted frame exists in
//! exactly one place.

use std::fmt;
use std::time::Instant;

/// Bytes per pixel for packed RGB frames.
pub const RGB_CHANNELS: usize = 3;

/// Opaque frame with its capture metadata.
pub struct RawFrame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic frame counter assigned by the source.
    pub sequence: u64,
    captured_at: Instant,
}

impl RawFrame {
    /// Wrap a freshly captured pixel buffer, stamping it with the current instant.
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self::captured_at(data, width, height, sequence, Instant::now())
    }

    /// Wrap a pixel buffer with an explicit capture instant.
    pub fn captured_at(
        data: Vec<u8>,
        width: u32,
        height: u32,
        sequence: u64,
        captured_at: Instant,
    ) -> Self {
        Self {
            data,
            width,
            height,
            sequence,
            captured_at,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn capture_instant(&self) -> Instant {
        self.captured_at
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Expected byte length for a packed RGB frame of these dimensions.
    pub fn expected_rgb_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(RGB_CHANNELS))
    }
}

// Pixel data is left out of Debug output.
impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .finish()
    }
}

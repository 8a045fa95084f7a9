use anyhow::Result;

use crate::detect::result::Detection;

/// Detector backend trait.
///
/// A backend wraps one loaded model. `detect` is the raw model call: it returns
/// unfiltered detections, and thresholding / suppression happen afterwards in
/// post-processing so the two phases can be timed separately.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run the model on a packed RGB frame.
    ///
    /// Implementations must treat the pixel slice as read-only and must not
    /// keep it past the call.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

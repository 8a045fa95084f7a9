//! Camera frame source.
//!
//! Live capture belongs to the host's camera subsystem, which hands frames to
//! `Pipeline::offer` directly. `CameraSource` covers the `stub://` case: a
//! synthetic RGB stream used by the daemon, demos and tests.

use anyhow::{bail, Result};
use rand::Rng;

use crate::frame::{RawFrame, RGB_CHANNELS};

/// Configuration for a camera source.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraConfig {
    /// Source URL. Only `stub://` is built in.
    pub url: String,
    /// Nominal capture rate (frames per second).
    pub fps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            fps: 30,
            width: 640,
            height: 480,
        }
    }
}

/// Camera frame source.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.fps == 0 {
            bail!("camera fps must be >= 1");
        }
        if config.url.starts_with("stub://") {
            Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticCamera::new(config)),
            })
        } else {
            bail!(
                "unsupported camera url {}: live capture is provided by the host, only stub:// is built in",
                config.url
            )
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
        }
    }

    /// Capture the next frame.
    pub fn next_frame(&mut self) -> Result<RawFrame> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.is_healthy(),
        }
    }

    pub fn stats(&self) -> CameraStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
        }
    }

    pub fn config(&self) -> &CameraConfig {
        match &self.backend {
            CameraBackend::Synthetic(source) => &source.config,
        }
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub url: String,
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    config: CameraConfig,
    frame_count: u64,
    /// Scene changes every 50 frames so detections vary over time.
    scene_state: u8,
}

impl SyntheticCamera {
    fn new(config: CameraConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            scene_state: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        log::info!(
            "camera: connected to {} (synthetic, {}x{} @ {} fps)",
            self.config.url,
            self.config.width,
            self.config.height,
            self.config.fps
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<RawFrame> {
        let pixels = self.generate_pixels();
        let frame = RawFrame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.frame_count,
        );
        self.frame_count += 1;
        Ok(frame)
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = self.config.width as usize * self.config.height as usize * RGB_CHANNELS;

        if self.frame_count > 0 && self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.scene_state as u64 * 31) % 256) as u8;
        }

        // Sensor noise on a sparse subset of pixels.
        let mut rng = rand::thread_rng();
        for pixel in pixels.iter_mut().step_by(97) {
            *pixel = pixel.wrapping_add(rng.gen_range(0..4));
        }

        pixels
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}

use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};

const DEFAULT_LABELS: &[&str] = &["card", "person"];

/// Stub backend for testing and demos.
///
/// Detections are derived from a hash of the pixels, so identical frames yield
/// identical output. Latency and periodic failures can be simulated.
pub struct StubBackend {
    labels: Vec<String>,
    latency: Duration,
    fail_every: Option<u64>,
    calls: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            labels: DEFAULT_LABELS.iter().map(|l| l.to_string()).collect(),
            latency: Duration::ZERO,
            fail_every: None,
            calls: 0,
        }
    }

    /// Sleep for `latency` inside every `detect` call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail every `n`th call (n >= 1). `None` or `Some(0)` never fails.
    pub fn with_fail_every(mut self, n: Option<u64>) -> Self {
        self.fail_every = n.filter(|n| *n > 0);
        self
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        if !labels.is_empty() {
            self.labels = labels;
        }
        self
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, pixels: &[u8], _width: u32, _height: u32) -> Result<Vec<Detection>> {
        self.calls += 1;
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        if let Some(n) = self.fail_every {
            if self.calls % n == 0 {
                return Err(anyhow!("stub backend simulated failure on call {}", self.calls));
            }
        }

        let digest: [u8; 32] = Sha256::digest(pixels).into();
        let count = (digest[0] % 3) as usize + 1;

        let detections = digest[1..]
            .chunks_exact(5)
            .take(count)
            .map(|chunk| {
                let unit = |b: u8| b as f32 / 255.0;
                let label = &self.labels[chunk[0] as usize % self.labels.len()];
                let confidence = 0.3 + 0.7 * unit(chunk[1]);
                let width = 0.1 + 0.3 * unit(chunk[2]);
                let height = 0.1 + 0.3 * unit(chunk[3]);
                let x = (1.0 - width) * unit(chunk[4]);
                let y = (1.0 - height) * unit(chunk[0]);
                Detection::new(label.clone(), confidence, BoundingBox::new(x, y, width, height))
            })
            .collect();

        Ok(detections)
    }
}

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::{
    Postprocess, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_IOU_THRESHOLD, DEFAULT_MAX_DETECTIONS,
};
use crate::ingest::CameraConfig;
use crate::telemetry::DEFAULT_WINDOW;

const DEFAULT_CAMERA_URL: &str = "stub://camera";
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_REPORT_SECS: u64 = 5;

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
    telemetry: Option<TelemetryConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    labels: Option<Vec<String>>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    max_detections: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct TelemetryConfigFile {
    window: Option<usize>,
    report_interval_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub camera: CameraConfig,
    pub detector: DetectorSettings,
    pub telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// Registered backend name ("stub", or "tract" with `backend-tract`).
    pub backend: String,
    pub model_path: Option<PathBuf>,
    /// Class names by model output index.
    pub labels: Vec<String>,
    pub postprocess: Postprocess,
}

#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    /// Samples per moving-average filter.
    pub window: usize,
    pub report_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        // The empty file layer yields all defaults and cannot fail.
        Self::from_file(PipelineConfigFile::default())
    }
}

impl PipelineConfig {
    /// Defaults, then the file named by `LIVEDETECT_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("LIVEDETECT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Self {
        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraConfig {
            url: camera_file
                .url
                .unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
            fps: camera_file.fps.unwrap_or(DEFAULT_CAMERA_FPS),
            width: camera_file.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
        };

        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector_file
                .backend
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            model_path: detector_file.model_path,
            labels: detector_file.labels.unwrap_or_default(),
            postprocess: Postprocess {
                confidence_threshold: detector_file
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
                iou_threshold: detector_file
                    .iou_threshold
                    .unwrap_or(DEFAULT_IOU_THRESHOLD),
                max_detections: detector_file
                    .max_detections
                    .unwrap_or(DEFAULT_MAX_DETECTIONS),
            },
        };

        let telemetry_file = file.telemetry.unwrap_or_default();
        let telemetry = TelemetrySettings {
            window: telemetry_file.window.unwrap_or(DEFAULT_WINDOW),
            report_interval: Duration::from_secs(
                telemetry_file
                    .report_interval_secs
                    .unwrap_or(DEFAULT_REPORT_SECS),
            ),
        };

        Self {
            camera,
            detector,
            telemetry,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_nonempty("LIVEDETECT_CAMERA_URL") {
            self.camera.url = url;
        }
        if let Some(fps) = env_nonempty("LIVEDETECT_CAMERA_FPS") {
            self.camera.fps = fps
                .parse()
                .map_err(|_| anyhow!("LIVEDETECT_CAMERA_FPS must be an integer"))?;
        }
        if let Some(backend) = env_nonempty("LIVEDETECT_BACKEND") {
            self.detector.backend = backend;
        }
        if let Some(path) = env_nonempty("LIVEDETECT_MODEL_PATH") {
            self.detector.model_path = Some(PathBuf::from(path));
        }
        if let Some(confidence) = env_nonempty("LIVEDETECT_CONFIDENCE") {
            self.detector.postprocess.confidence_threshold = confidence
                .parse()
                .map_err(|_| anyhow!("LIVEDETECT_CONFIDENCE must be a number"))?;
        }
        if let Some(window) = env_nonempty("LIVEDETECT_WINDOW") {
            self.telemetry.window = window
                .parse()
                .map_err(|_| anyhow!("LIVEDETECT_WINDOW must be an integer"))?;
        }
        if let Some(secs) = env_nonempty("LIVEDETECT_REPORT_SECS") {
            let seconds: u64 = secs.parse().map_err(|_| {
                anyhow!("LIVEDETECT_REPORT_SECS must be an integer number of seconds")
            })?;
            self.telemetry.report_interval = Duration::from_secs(seconds);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.camera.fps == 0 {
            return Err(anyhow!("camera fps must be >= 1"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera dimensions must be non-zero"));
        }
        if self.telemetry.window == 0 {
            return Err(anyhow!("telemetry window must be >= 1"));
        }
        if self.telemetry.report_interval.is_zero() {
            return Err(anyhow!("telemetry report interval must be greater than zero"));
        }
        let post = &self.detector.postprocess;
        for (name, value) in [
            ("confidence_threshold", post.confidence_threshold),
            ("iou_threshold", post.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within 0..=1, got {}", name, value));
            }
        }
        if self.detector.backend.trim().is_empty() {
            return Err(anyhow!("detector backend must be named"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.camera.url, DEFAULT_CAMERA_URL);
        assert_eq!(cfg.camera.fps, 30);
        assert_eq!(cfg.detector.backend, "stub");
        assert_eq!(cfg.telemetry.window, 10);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_thresholds() {
        let mut cfg = PipelineConfig::default();
        cfg.detector.postprocess.confidence_threshold = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_empty_window() {
        let mut cfg = PipelineConfig::default();
        cfg.telemetry.window = 0;
        assert!(cfg.validate().is_err());
    }
}

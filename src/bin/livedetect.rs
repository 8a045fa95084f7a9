//! livedetect - live detection loop with smoothed telemetry
//!
//! This daemon:
//! 1. Captures frames from the configured camera source at its nominal rate
//! 2. Offers each frame to the single-flight pipeline (busy = dropped)
//! 3. Runs the selected detector backend on a dedicated inference thread
//! 4. Publishes the latest detections and logs smoothed telemetry periodically

use anyhow::{anyhow, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use livedetect::{
    BackendRegistry, CameraSource, LatestDetections, Pipeline, PipelineConfig, StubBackend,
    ThreadedEngine,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Stop after this many camera frames (runs until Ctrl+C otherwise).
    #[arg(long)]
    frames: Option<u64>,
    /// Override the camera's nominal frame rate.
    #[arg(long)]
    fps: Option<u32>,
    /// Detector backend to run (overrides LIVEDETECT_BACKEND / config).
    #[arg(long)]
    backend: Option<String>,
    /// Simulated per-frame inference latency for the stub backend.
    #[arg(long, default_value_t = 60)]
    latency_ms: u64,
    /// Make the stub backend fail every Nth frame.
    #[arg(long)]
    fail_every: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = PipelineConfig::load()?;
    if let Some(fps) = args.fps {
        if fps == 0 {
            return Err(anyhow!("fps must be >= 1"));
        }
        cfg.camera.fps = fps;
    }
    if let Some(backend) = args.backend.clone() {
        cfg.detector.backend = backend;
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        if let Err(err) = ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst)) {
            log::warn!("failed to install Ctrl+C handler: {}", err);
        }
    }

    let mut registry = build_registry(&cfg, &args)?;
    log::info!("available backends: {}", registry.list().join(", "));
    let backend = registry.take(&cfg.detector.backend)?;
    let engine = Arc::new(ThreadedEngine::spawn(
        backend,
        cfg.detector.postprocess.clone(),
    )?);

    let sink = Arc::new(LatestDetections::new());
    let pipeline = Pipeline::new(engine.clone(), sink.clone(), cfg.telemetry.window);

    let mut source = CameraSource::new(cfg.camera.clone())?;
    source.connect()?;

    let frame_interval = Duration::from_secs_f64(1.0 / cfg.camera.fps as f64);
    let mut next_capture = Instant::now();
    let mut last_report = Instant::now();
    let mut last_generation = 0u64;

    log::info!(
        "livedetect running: backend={} camera={} @ {} fps, window={}",
        cfg.detector.backend,
        cfg.camera.url,
        cfg.camera.fps,
        cfg.telemetry.window
    );

    while !shutdown.load(Ordering::SeqCst) {
        if args
            .frames
            .is_some_and(|limit| source.stats().frames_captured >= limit)
        {
            break;
        }

        let frame = source.next_frame()?;
        pipeline.offer(frame);

        let generation = sink.generation();
        if generation != last_generation {
            last_generation = generation;
            if log::log_enabled!(log::Level::Debug) {
                if let Some(latest) = sink.latest() {
                    match serde_json::to_string(latest.as_ref()) {
                        Ok(json) => log::debug!("detections: {}", json),
                        Err(e) => log::debug!("failed to encode detections: {}", e),
                    }
                }
            }
        }

        if last_report.elapsed() >= cfg.telemetry.report_interval {
            report(&pipeline, &sink, &source);
            last_report = Instant::now();
        }

        next_capture += frame_interval;
        let now = Instant::now();
        if next_capture > now {
            std::thread::sleep(next_capture - now);
        } else {
            // Capture fell behind; resynchronise instead of bursting.
            next_capture = now;
        }
    }

    pipeline.shutdown();
    engine.shutdown();
    report(&pipeline, &sink, &source);
    Ok(())
}

fn build_registry(cfg: &PipelineConfig, args: &Args) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    registry.register(
        StubBackend::new()
            .with_latency(Duration::from_millis(args.latency_ms))
            .with_fail_every(args.fail_every)
            .with_labels(cfg.detector.labels.clone()),
    );

    #[cfg(feature = "backend-tract")]
    {
        if let Some(model_path) = cfg.detector.model_path.as_ref() {
            let backend =
                livedetect::TractBackend::new(model_path, cfg.camera.width, cfg.camera.height)?
                    .with_labels(cfg.detector.labels.clone());
            registry.register(backend);
        }
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        if cfg.detector.model_path.is_some() {
            log::warn!("model_path is set but the backend-tract feature is not enabled");
        }
    }

    Ok(registry)
}

fn report(pipeline: &Pipeline, sink: &LatestDetections, source: &CameraSource) {
    let stats = pipeline.stats();
    let shown = sink.latest().map(|set| set.len()).unwrap_or(0);
    log::info!(
        "telemetry {} | frames captured={} admitted={} dropped={} failed={} | showing {} detections",
        pipeline.telemetry(),
        source.stats().frames_captured,
        stats.admitted,
        stats.dropped,
        stats.failed,
        shown
    );
}

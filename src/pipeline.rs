//! Real-time detection pipeline.
//!
//! Ties the admission gate, the telemetry recorder and the result sink around
//! an external inference engine:
//!
//! 1. `offer` tests-and-sets the gate. Busy means the frame is dropped.
//! 2. On admission the start is timestamped and the frame is submitted to the
//!    engine together with a `Completion` handle. No lock is held while the
//!    engine runs.
//! 3. The engine calls `Completion::mark_inference_done` after the raw model
//!    call and `Completion::finish` once post-processing is done.
//! 4. Finishing publishes the results (success only), records execution time
//!    and fps, and clears the gate last, so the next admission always starts
//!    after the previous frame's telemetry is recorded.
//!
//! A `Completion` that is dropped without being finished completes its frame
//! with an error. An engine that loses or panics on a frame therefore still
//! releases the gate.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::detect::DetectionSet;
use crate::engine::InferenceEngine;
use crate::frame::RawFrame;
use crate::gate::{Admission, AdmissionGate};
use crate::sink::ResultSink;
use crate::telemetry::{Clock, SystemClock, TelemetryRecorder, TelemetrySnapshot};

/// Frame counters since the pipeline was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub offered: u64,
    pub admitted: u64,
    pub dropped: u64,
    /// Admitted frames whose results were published.
    pub completed: u64,
    /// Admitted frames whose inference failed.
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    offered: AtomicU64,
    admitted: AtomicU64,
    dropped: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

struct Shared {
    gate: AdmissionGate,
    recorder: TelemetryRecorder,
    sink: Arc<dyn ResultSink>,
    clock: Arc<dyn Clock>,
    closed: AtomicBool,
    counters: Counters,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn settle(&self, frame_sequence: u64, outcome: Result<DetectionSet>) {
        // Released on every exit, including a panicking sink.
        let _release = GateRelease(&self.gate);

        if self.is_closed() {
            log::debug!("frame {} completed after shutdown; ignoring", frame_sequence);
            return;
        }

        match outcome {
            Ok(results) => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                self.sink.publish(Arc::new(results));
            }
            Err(err) => {
                // Prior results stay on display.
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("inference failed for frame {}: {:#}", frame_sequence, err);
            }
        }

        self.recorder.mark_execution_done_at(self.clock.now());
    }
}

/// Clears the busy flag when dropped.
struct GateRelease<'a>(&'a AdmissionGate);

impl Drop for GateRelease<'_> {
    fn drop(&mut self) {
        self.0.complete();
    }
}

/// Handle for reporting the outcome of one admitted frame.
///
/// Exactly one outcome is delivered per handle: `finish` consumes it, and
/// dropping it unfinished reports an error.
pub struct Completion {
    shared: Arc<Shared>,
    frame_sequence: u64,
    captured_at: Instant,
    started_at: Instant,
    inference_marked: bool,
    settled: bool,
}

impl Completion {
    fn new(
        shared: Arc<Shared>,
        frame_sequence: u64,
        captured_at: Instant,
        started_at: Instant,
    ) -> Self {
        Self {
            shared,
            frame_sequence,
            captured_at,
            started_at,
            inference_marked: false,
            settled: false,
        }
    }

    pub fn frame_sequence(&self) -> u64 {
        self.frame_sequence
    }

    /// Instant at which the frame was admitted.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Instant at which the camera captured the frame.
    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Time the frame spent between capture and admission. Zero if the
    /// capture instant lies after admission.
    pub fn admission_delay(&self) -> Duration {
        self.started_at.saturating_duration_since(self.captured_at)
    }

    /// Record that the raw model call has returned. Later calls are ignored.
    pub fn mark_inference_done(&mut self) {
        if self.inference_marked || self.settled || self.shared.is_closed() {
            return;
        }
        self.inference_marked = true;
        self.shared
            .recorder
            .mark_inference_done_at(self.shared.clock.now());
    }

    /// Deliver the frame's outcome and release the gate.
    pub fn finish(mut self, outcome: Result<DetectionSet>) {
        self.settle(outcome);
    }

    fn settle(&mut self, outcome: Result<DetectionSet>) {
        if self.settled {
            return;
        }
        self.settled = true;
        self.shared.settle(self.frame_sequence, outcome);
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.settled {
            let sequence = self.frame_sequence;
            self.settle(Err(anyhow!(
                "inference engine released frame {} without a result",
                sequence
            )));
        }
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("frame_sequence", &self.frame_sequence)
            .field("inference_marked", &self.inference_marked)
            .field("settled", &self.settled)
            .finish()
    }
}

/// Single-flight detection pipeline. Cloning shares the same pipeline.
#[derive(Clone)]
pub struct Pipeline {
    shared: Arc<Shared>,
    engine: Arc<dyn InferenceEngine>,
}

impl Pipeline {
    /// Build a pipeline whose telemetry filters each keep `window` samples.
    pub fn new(
        engine: Arc<dyn InferenceEngine>,
        sink: Arc<dyn ResultSink>,
        window: usize,
    ) -> Self {
        Self::with_clock(engine, sink, window, Arc::new(SystemClock))
    }

    pub fn with_clock(
        engine: Arc<dyn InferenceEngine>,
        sink: Arc<dyn ResultSink>,
        window: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                gate: AdmissionGate::new(),
                recorder: TelemetryRecorder::new(window),
                sink,
                clock,
                closed: AtomicBool::new(false),
                counters: Counters::default(),
            }),
            engine,
        }
    }

    /// Offer a captured frame. Never blocks on inference.
    pub fn offer(&self, frame: RawFrame) -> Admission {
        let counters = &self.shared.counters;
        counters.offered.fetch_add(1, Ordering::Relaxed);

        if self.shared.is_closed() || !self.shared.gate.try_admit() {
            counters.dropped.fetch_add(1, Ordering::Relaxed);
            return Admission::Dropped;
        }
        counters.admitted.fetch_add(1, Ordering::Relaxed);

        let started_at = self.shared.clock.now();
        self.shared.recorder.mark_start_at(started_at);
        let completion = Completion::new(
            self.shared.clone(),
            frame.sequence,
            frame.capture_instant(),
            started_at,
        );
        log::trace!(
            "frame {} admitted {}ms after capture",
            frame.sequence,
            completion.admission_delay().as_millis()
        );
        self.engine.submit(frame, completion);
        Admission::Admitted
    }

    /// Stop admitting frames. Completions still in flight only release the
    /// gate; their results and timings are discarded.
    pub fn shutdown(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            log::info!("pipeline shut down ({})", self.engine.name());
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.is_closed()
    }

    /// True while a frame is under inference.
    pub fn is_busy(&self) -> bool {
        self.shared.gate.is_busy()
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.shared.recorder.snapshot()
    }

    pub fn recorder(&self) -> &TelemetryRecorder {
        &self.shared.recorder
    }

    pub fn stats(&self) -> PipelineStats {
        let c = &self.shared.counters;
        PipelineStats {
            offered: c.offered.load(Ordering::Relaxed),
            admitted: c.admitted.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::LatestDetections;
    use crate::telemetry::ManualClock;
    use std::sync::Mutex;

    /// Engine that parks submissions until the test settles them.
    #[derive(Default)]
    struct ManualEngine {
        pending: Mutex<Vec<(RawFrame, Completion)>>,
        submitted: AtomicU64,
    }

    impl ManualEngine {
        fn take(&self) -> Option<Completion> {
            self.pending.lock().unwrap().pop().map(|(_, c)| c)
        }
    }

    impl InferenceEngine for ManualEngine {
        fn name(&self) -> &str {
            "manual"
        }

        fn submit(&self, frame: RawFrame, completion: Completion) {
            self.submitted.fetch_add(1, Ordering::SeqCst);
            self.pending.lock().unwrap().push((frame, completion));
        }
    }

    /// Engine that finishes every frame inside `submit`.
    struct InlineEngine;

    impl InferenceEngine for InlineEngine {
        fn name(&self) -> &str {
            "inline"
        }

        fn submit(&self, frame: RawFrame, mut completion: Completion) {
            completion.mark_inference_done();
            completion.finish(Ok(DetectionSet::new(frame.sequence, Vec::new())));
        }
    }

    fn frame(sequence: u64) -> RawFrame {
        RawFrame::new(vec![0u8; 12], 2, 2, sequence)
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn setup() -> (Pipeline, Arc<ManualEngine>, Arc<LatestDetections>) {
        let engine = Arc::new(ManualEngine::default());
        let sink = Arc::new(LatestDetections::new());
        let pipeline = Pipeline::new(engine.clone(), sink.clone(), 10);
        (pipeline, engine, sink)
    }

    #[test]
    fn offers_while_busy_are_dropped_without_side_effects() {
        let (pipeline, engine, sink) = setup();

        assert_eq!(pipeline.offer(frame(0)), Admission::Admitted);
        let before = pipeline.recorder().samples();
        for seq in 1..50 {
            assert_eq!(pipeline.offer(frame(seq)), Admission::Dropped);
        }

        assert_eq!(engine.submitted.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.recorder().samples(), before);
        assert_eq!(sink.generation(), 0);
        assert!(pipeline.is_busy());

        let stats = pipeline.stats();
        assert_eq!(stats.admitted, 1);
        assert_eq!(stats.dropped, 49);
    }

    #[test]
    fn successful_completion_publishes_and_releases_gate() {
        let (pipeline, engine, sink) = setup();

        assert!(pipeline.offer(frame(4)).is_admitted());
        let mut completion = engine.take().expect("submitted");
        assert_eq!(completion.frame_sequence(), 4);
        completion.mark_inference_done();
        completion.finish(Ok(DetectionSet::new(4, Vec::new())));

        assert!(!pipeline.is_busy());
        assert_eq!(sink.latest().expect("published").frame_sequence, 4);
        let (inference, execution, _) = pipeline.recorder().samples();
        assert_eq!(inference.len(), 1);
        assert_eq!(execution.len(), 1);
        assert_eq!(pipeline.stats().completed, 1);

        assert!(pipeline.offer(frame(5)).is_admitted());
    }

    #[test]
    fn failed_inference_releases_gate_without_publishing() {
        let (pipeline, engine, sink) = setup();

        pipeline.offer(frame(0));
        engine
            .take()
            .expect("submitted")
            .finish(Ok(DetectionSet::new(0, Vec::new())));

        pipeline.offer(frame(1));
        engine
            .take()
            .expect("submitted")
            .finish(Err(anyhow!("model crashed")));

        assert!(!pipeline.is_busy());
        // Frame 0's results remain on display.
        assert_eq!(sink.latest().expect("published").frame_sequence, 0);
        assert_eq!(sink.generation(), 1);
        // Execution time is still recorded for the failed attempt.
        assert_eq!(pipeline.recorder().samples().1.len(), 2);
        assert_eq!(pipeline.stats().failed, 1);
    }

    #[test]
    fn dropped_completion_releases_gate() {
        let (pipeline, engine, sink) = setup();

        pipeline.offer(frame(0));
        drop(engine.take().expect("submitted"));

        assert!(!pipeline.is_busy());
        assert_eq!(sink.generation(), 0);
        assert_eq!(pipeline.stats().failed, 1);
        assert!(pipeline.offer(frame(1)).is_admitted());
    }

    #[test]
    fn completion_after_shutdown_only_releases_gate() {
        let (pipeline, engine, sink) = setup();

        pipeline.offer(frame(0));
        let mut completion = engine.take().expect("submitted");
        pipeline.shutdown();

        completion.mark_inference_done();
        completion.finish(Ok(DetectionSet::new(0, Vec::new())));

        assert!(!pipeline.is_busy());
        assert_eq!(sink.generation(), 0);
        assert_eq!(pipeline.recorder().samples(), (vec![], vec![], vec![]));
        assert_eq!(pipeline.offer(frame(1)), Admission::Dropped);
    }

    #[test]
    fn inline_engine_completes_within_offer() {
        let sink = Arc::new(LatestDetections::new());
        let pipeline = Pipeline::new(Arc::new(InlineEngine), sink.clone(), 10);

        for seq in 0..5 {
            assert!(pipeline.offer(frame(seq)).is_admitted());
        }
        assert_eq!(sink.generation(), 5);
        assert!(!pipeline.is_busy());
    }

    #[test]
    fn recorded_timings_follow_the_clock() {
        let base = Instant::now();
        let clock = Arc::new(ManualClock::new(base));
        let engine = Arc::new(ManualEngine::default());
        let pipeline = Pipeline::with_clock(
            engine.clone(),
            Arc::new(LatestDetections::new()),
            10,
            clock.clone(),
        );

        pipeline.offer(frame(0));
        let mut completion = engine.take().expect("submitted");
        assert_eq!(completion.started_at(), base);
        clock.set(base + ms(50));
        completion.mark_inference_done();
        completion.mark_inference_done();
        clock.set(base + ms(80));
        completion.finish(Ok(DetectionSet::default()));

        clock.set(base + ms(100));
        pipeline.offer(frame(1));
        let completion = engine.take().expect("submitted");
        clock.set(base + ms(150));
        completion.finish(Ok(DetectionSet::default()));

        let (inference, execution, fps) = pipeline.recorder().samples();
        assert_eq!(inference, vec![50]);
        assert_eq!(execution, vec![80, 50]);
        assert_eq!(fps, vec![10]);
    }

    #[test]
    fn completion_reports_capture_to_admission_delay() {
        let base = Instant::now();
        let clock = Arc::new(ManualClock::new(base + ms(12)));
        let engine = Arc::new(ManualEngine::default());
        let pipeline = Pipeline::with_clock(
            engine.clone(),
            Arc::new(LatestDetections::new()),
            10,
            clock,
        );

        pipeline.offer(RawFrame::captured_at(vec![0u8; 12], 2, 2, 9, base));
        let completion = engine.take().expect("submitted");
        assert_eq!(completion.captured_at(), base);
        assert_eq!(completion.started_at(), base + ms(12));
        assert_eq!(completion.admission_delay(), ms(12));
    }

    #[test]
    fn slow_inference_drops_every_other_frame() {
        const CAMERA_INTERVAL_MS: u64 = 33;
        const INFERENCE_MS: u64 = 50;
        const ROUND_TRIP_MS: u64 = 60;

        let base = Instant::now();
        let clock = Arc::new(ManualClock::new(base));
        let engine = Arc::new(ManualEngine::default());
        let sink = Arc::new(LatestDetections::new());
        let pipeline = Pipeline::with_clock(engine.clone(), sink.clone(), 10, clock.clone());

        let mut in_flight: Option<Completion> = None;
        let mut admitted = 0;
        let mut dropped = 0;

        for seq in 0..100u64 {
            let arrival = base + ms(seq * CAMERA_INTERVAL_MS);

            let due = in_flight
                .as_ref()
                .is_some_and(|c| c.started_at() + ms(ROUND_TRIP_MS) <= arrival);
            if due {
                let mut completion = in_flight.take().expect("in flight");
                let started = completion.started_at();
                clock.set(started + ms(INFERENCE_MS));
                completion.mark_inference_done();
                clock.set(started + ms(ROUND_TRIP_MS));
                let sequence = completion.frame_sequence();
                completion.finish(Ok(DetectionSet::new(sequence, Vec::new())));
            }

            clock.set(arrival);
            match pipeline.offer(frame(seq)) {
                Admission::Admitted => {
                    admitted += 1;
                    in_flight = engine.take();
                }
                Admission::Dropped => dropped += 1,
            }
        }

        assert_eq!(admitted, 50);
        assert_eq!(dropped, 50);

        let telemetry = pipeline.telemetry();
        assert_eq!(telemetry.inference_ms, INFERENCE_MS as i64);
        assert_eq!(telemetry.execution_ms, ROUND_TRIP_MS as i64);
        // Admitted-frame rate (one per 66 ms), not the ~30 fps camera rate.
        assert!((14..=17).contains(&telemetry.fps), "fps = {}", telemetry.fps);
    }
}

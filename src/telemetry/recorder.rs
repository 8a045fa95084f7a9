//! Inference telemetry recorder.
//!
//! Turns the start / inference-done / execution-done timestamps of each
//! admitted frame into three smoothed metrics:
//! - inference time (ms): start until the raw model call returned
//! - execution time (ms): start until results were published
//! - fps: derived from the interval between consecutive admissions
//!
//! Each metric owns its window behind its own mutex. After every append the
//! window's average is stored into an atomic, so readers never take a lock and
//! never see a partially updated window.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

use super::filter::{MovingAverage, DEFAULT_WINDOW};

/// Point-in-time view of the smoothed metrics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TelemetrySnapshot {
    pub inference_ms: i64,
    pub execution_ms: i64,
    pub fps: i64,
}

impl std::fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "inference={}ms execution={}ms fps={}",
            self.inference_ms, self.execution_ms, self.fps
        )
    }
}

struct MetricStream {
    window: Mutex<MovingAverage>,
    average: AtomicI64,
}

impl MetricStream {
    fn new(capacity: usize) -> Self {
        Self {
            window: Mutex::new(MovingAverage::new(capacity)),
            average: AtomicI64::new(0),
        }
    }

    fn append(&self, sample: i64) {
        let mut window = lock(&self.window);
        window.append(sample);
        self.average.store(window.average(), Ordering::Release);
    }

    fn average(&self) -> i64 {
        self.average.load(Ordering::Acquire)
    }

    fn samples(&self) -> Vec<i64> {
        lock(&self.window).samples().collect()
    }
}

#[derive(Default)]
struct FrameClock {
    /// Start of the frame currently under inference.
    current_start: Option<Instant>,
    /// Start of the most recent admission, kept across frames for fps.
    previous_start: Option<Instant>,
    /// Admission interval waiting to be turned into an fps sample.
    pending_interval: Option<Duration>,
}

/// Records per-frame timings into three bounded moving averages.
pub struct TelemetryRecorder {
    inference: MetricStream,
    execution: MetricStream,
    fps: MetricStream,
    clock: Mutex<FrameClock>,
}

impl TelemetryRecorder {
    /// Create a recorder whose filters each keep `window` samples.
    pub fn new(window: usize) -> Self {
        Self {
            inference: MetricStream::new(window),
            execution: MetricStream::new(window),
            fps: MetricStream::new(window),
            clock: Mutex::new(FrameClock::default()),
        }
    }

    pub fn mark_start(&self) {
        self.mark_start_at(Instant::now());
    }

    pub fn mark_inference_done(&self) -> bool {
        self.mark_inference_done_at(Instant::now())
    }

    pub fn mark_execution_done(&self) -> bool {
        self.mark_execution_done_at(Instant::now())
    }

    /// Record an admission at `now`.
    ///
    /// The first call only starts the fps clock; every later call measures the
    /// interval since the previous admission.
    pub fn mark_start_at(&self, now: Instant) {
        let mut clock = lock(&self.clock);
        if let Some(previous) = clock.previous_start {
            clock.pending_interval = Some(now.saturating_duration_since(previous));
        }
        clock.previous_start = Some(now);
        clock.current_start = Some(now);
    }

    /// Record the end of the raw model call. Returns false when no frame is
    /// in flight.
    pub fn mark_inference_done_at(&self, now: Instant) -> bool {
        let start = lock(&self.clock).current_start;
        let Some(start) = start else {
            log::warn!("inference completion recorded without a pending start; ignoring");
            return false;
        };
        self.inference.append(elapsed_ms(start, now));
        true
    }

    /// Record the end of the full round trip and close the frame. Returns
    /// false when no frame is in flight.
    pub fn mark_execution_done_at(&self, now: Instant) -> bool {
        let (start, interval) = {
            let mut clock = lock(&self.clock);
            (clock.current_start.take(), clock.pending_interval.take())
        };
        let Some(start) = start else {
            log::warn!("execution completion recorded without a pending start; ignoring");
            return false;
        };
        self.execution.append(elapsed_ms(start, now));
        if let Some(sample) = interval.and_then(fps_sample) {
            self.fps.append(sample);
        }
        true
    }

    pub fn inference_ms(&self) -> i64 {
        self.inference.average()
    }

    pub fn execution_ms(&self) -> i64 {
        self.execution.average()
    }

    pub fn fps(&self) -> i64 {
        self.fps.average()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            inference_ms: self.inference_ms(),
            execution_ms: self.execution_ms(),
            fps: self.fps(),
        }
    }

    /// Raw windows, oldest to newest: (inference, execution, fps).
    pub fn samples(&self) -> (Vec<i64>, Vec<i64>, Vec<i64>) {
        (
            self.inference.samples(),
            self.execution.samples(),
            self.fps.samples(),
        )
    }
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

/// Whole milliseconds from `start` to `end`, truncated. Clamped at zero.
fn elapsed_ms(start: Instant, end: Instant) -> i64 {
    i64::try_from(end.saturating_duration_since(start).as_millis()).unwrap_or(i64::MAX)
}

fn fps_sample(interval: Duration) -> Option<i64> {
    let interval_ms = interval.as_secs_f64() * 1000.0;
    if interval_ms <= 0.0 {
        return None;
    }
    Some((1000.0 / interval_ms).round() as i64)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn records_inference_and_execution_durations() {
        let recorder = TelemetryRecorder::new(10);
        let t = Instant::now();

        recorder.mark_start_at(t);
        assert!(recorder.mark_inference_done_at(t + ms(50)));
        assert!(recorder.mark_execution_done_at(t + ms(80)));

        let (inference, execution, fps) = recorder.samples();
        assert_eq!(inference, vec![50]);
        assert_eq!(execution, vec![80]);
        // First admission only starts the fps clock.
        assert!(fps.is_empty());
        assert_eq!(recorder.snapshot().inference_ms, 50);
        assert_eq!(recorder.snapshot().execution_ms, 80);
    }

    #[test]
    fn fps_derives_from_consecutive_starts() {
        let recorder = TelemetryRecorder::new(10);
        let t = Instant::now();

        recorder.mark_start_at(t);
        recorder.mark_inference_done_at(t + ms(20));
        recorder.mark_execution_done_at(t + ms(30));

        recorder.mark_start_at(t + ms(100));
        recorder.mark_inference_done_at(t + ms(120));
        recorder.mark_execution_done_at(t + ms(130));

        let (_, _, fps) = recorder.samples();
        assert_eq!(fps, vec![10]);
        assert_eq!(recorder.fps(), 10);
    }

    #[test]
    fn fps_rounds_to_nearest() {
        let recorder = TelemetryRecorder::new(10);
        let t = Instant::now();

        recorder.mark_start_at(t);
        recorder.mark_execution_done_at(t + ms(10));
        recorder.mark_start_at(t + ms(60));
        recorder.mark_execution_done_at(t + ms(70));

        // 1000 / 60 = 16.67
        assert_eq!(recorder.fps(), 17);
    }

    #[test]
    fn durations_truncate_to_whole_milliseconds() {
        let recorder = TelemetryRecorder::new(10);
        let t = Instant::now();

        recorder.mark_start_at(t);
        recorder.mark_inference_done_at(t + Duration::from_micros(49_900));
        recorder.mark_execution_done_at(t + Duration::from_micros(80_999));

        let (inference, execution, _) = recorder.samples();
        assert_eq!(inference, vec![49]);
        assert_eq!(execution, vec![80]);
    }

    #[test]
    fn end_without_start_is_a_no_op() {
        let recorder = TelemetryRecorder::new(10);
        let t = Instant::now();

        assert!(!recorder.mark_inference_done_at(t));
        assert!(!recorder.mark_execution_done_at(t));
        assert_eq!(recorder.snapshot(), TelemetrySnapshot::default());

        recorder.mark_start_at(t);
        assert!(recorder.mark_execution_done_at(t + ms(5)));
        // The frame is closed; a second end is ignored.
        assert!(!recorder.mark_execution_done_at(t + ms(6)));
        assert_eq!(recorder.samples().1, vec![5]);
    }

    #[test]
    fn out_of_order_timestamps_clamp_to_zero() {
        let recorder = TelemetryRecorder::new(10);
        let t = Instant::now() + ms(1_000);

        recorder.mark_start_at(t);
        recorder.mark_inference_done_at(t - ms(10));
        recorder.mark_execution_done_at(t - ms(20));

        let (inference, execution, _) = recorder.samples();
        assert_eq!(inference, vec![0]);
        assert_eq!(execution, vec![0]);
    }

    #[test]
    fn zero_interval_produces_no_fps_sample() {
        let recorder = TelemetryRecorder::new(10);
        let t = Instant::now();

        recorder.mark_start_at(t);
        recorder.mark_execution_done_at(t);
        recorder.mark_start_at(t);
        recorder.mark_execution_done_at(t);

        assert!(recorder.samples().2.is_empty());
        assert_eq!(recorder.fps(), 0);
    }

    #[test]
    fn wall_clock_marks_measure_real_time() {
        let recorder = TelemetryRecorder::default();

        recorder.mark_start();
        std::thread::sleep(ms(20));
        assert!(recorder.mark_inference_done());
        assert!(recorder.mark_execution_done());
        assert!(!recorder.mark_execution_done());

        let (inference, execution, _) = recorder.samples();
        assert_eq!(inference.len(), 1);
        assert!(inference[0] >= 20);
        assert!(execution[0] >= inference[0]);
    }

    #[test]
    fn snapshot_display_is_compact() {
        let snapshot = TelemetrySnapshot {
            inference_ms: 42,
            execution_ms: 57,
            fps: 16,
        };
        assert_eq!(snapshot.to_string(), "inference=42ms execution=57ms fps=16");
    }
}

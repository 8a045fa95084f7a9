//! Frame admission gate.
//!
//! Enforces single-flight inference: a frame is admitted only while no other
//! frame is being inferred. Frames that arrive while the gate is busy are
//! dropped, never queued. The busy flag is a single atomic compare-and-swap,
//! so admission never blocks the camera thread.

use std::sync::atomic::{AtomicBool, Ordering};

/// Outcome of offering a frame to the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// The frame was handed to the inference engine.
    Admitted,
    /// Inference was already in flight (or the pipeline is shut down).
    Dropped,
}

impl Admission {
    pub fn is_admitted(self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Single-flight busy flag.
#[derive(Debug, Default)]
pub struct AdmissionGate {
    busy: AtomicBool,
}

impl AdmissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test-and-set the busy flag. Returns true when the caller now owns the
    /// single inference slot.
    pub fn try_admit(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release the inference slot.
    ///
    /// Returns false, and changes nothing, when no frame was admitted.
    pub fn complete(&self) -> bool {
        let was_busy = self.busy.swap(false, Ordering::AcqRel);
        if !was_busy {
            log::warn!("admission gate completed without a matching admission; ignoring");
        }
        was_busy
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

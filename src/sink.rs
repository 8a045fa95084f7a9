//! Published detection results.
//!
//! Every completed inference replaces the previous result set wholesale. Sets
//! are handed out as `Arc<DetectionSet>`, so the display side shares them
//! read-only and a reader holding an old set is never affected by a newer
//! publication.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::detect::DetectionSet;

/// Receiver of published detection results.
pub trait ResultSink: Send + Sync {
    /// Replace the current result set.
    fn publish(&self, results: Arc<DetectionSet>);
}

/// Sink keeping only the most recent result set.
#[derive(Debug, Default)]
pub struct LatestDetections {
    current: RwLock<Option<Arc<DetectionSet>>>,
    generation: AtomicU64,
}

impl LatestDetections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently published set, if any.
    pub fn latest(&self) -> Option<Arc<DetectionSet>> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of publications so far. Lets a display poll for changes cheaply.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl ResultSink for LatestDetections {
    fn publish(&self, results: Arc<DetectionSet>) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = Some(results);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

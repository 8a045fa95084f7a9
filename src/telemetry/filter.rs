//! Bounded moving-average filter.
//!
//! A fixed-capacity FIFO window over integer samples with a running sum, so
//! both `append` and `average` are O(1) regardless of stream length.

use std::collections::VecDeque;

/// Default number of samples kept per metric stream.
pub const DEFAULT_WINDOW: usize = 10;

/// Sliding window of the last `capacity` samples.
#[derive(Clone, Debug)]
pub struct MovingAverage {
    window: VecDeque<i64>,
    capacity: usize,
    /// Widened so a full window of extreme samples cannot overflow.
    sum: i128,
}

impl MovingAverage {
    /// Create a filter holding at most `capacity` samples (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0,
        }
    }

    /// Append a sample, evicting the oldest one first when the window is full.
    pub fn append(&mut self, value: i64) {
        if self.window.len() == self.capacity {
            if let Some(evicted) = self.window.pop_front() {
                self.sum -= i128::from(evicted);
            }
        }
        self.window.push_back(value);
        self.sum += i128::from(value);
    }

    /// Arithmetic mean of the held samples, truncated toward zero. 0 when empty.
    pub fn average(&self) -> i64 {
        if self.window.is_empty() {
            return 0;
        }
        // The mean of i64 samples always fits back into i64.
        (self.sum / self.window.len() as i128) as i64
    }

    /// Samples oldest to newest.
    pub fn samples(&self) -> impl Iterator<Item = i64> + '_ {
        self.window.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MovingAverage {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

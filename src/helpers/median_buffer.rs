use core::cmp::Ordering;

use heapless::{Deque, Vec};

/// Fixed-capacity window of the last `N` samples. `N` must be non-zero.
#[derive(Debug, Clone)]
pub struct RunningMedianBuffer<const N: usize> {
    buffer: Deque<f64, N>,
}

impl<const N: usize> Default for RunningMedianBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RunningMedianBuffer<N> {
    pub fn new() -> Self {
        Self {
            buffer: Deque::new(),
        }
    }

    /// Append a sample, evicting the oldest one when full.
    pub fn push(&mut self, value: f64) {
        if self.buffer.is_full() {
            self.buffer.pop_front();
        }
        // Cannot fail, a slot was just freed
        let _ = self.buffer.push_back(value);
    }

    pub fn median(&self) -> Option<f64> {
        if self.buffer.is_empty() {
            return None;
        }

        let mut sorted: Vec<f64, N> = self.buffer.iter().copied().collect();
        sorted.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        let len = sorted.len();
        if len % 2 == 0 {
            Some((sorted[len / 2 - 1] + sorted[len / 2]) / 2.0)
        } else {
            Some(sorted[len / 2])
        }
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.is_full()
    }
}

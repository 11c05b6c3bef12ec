//! Per-frame usage tracking
//!
//! Rolling window of closed frames, used to size ring buffers for the
//! worst-case per-frame footprint.

use std::collections::VecDeque;

/// What one frame consumed from its ring slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameUsage {
    pub slot: usize,
    pub generation: u64,
    /// High-water mark at the time the frame was closed.
    pub bytes: u64,
    pub allocations: u32,
    pub capacity: u64,
}

impl FrameUsage {
    /// Fraction of the slot in use, in `[0, 1]`.
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.bytes as f64 / self.capacity as f64
    }
}

pub struct UsageHistory {
    samples: VecDeque<FrameUsage>,
    capacity: usize,
    peak_bytes: u64,
}

impl UsageHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            peak_bytes: 0,
        }
    }

    pub fn record(&mut self, usage: FrameUsage) {
        self.peak_bytes = self.peak_bytes.max(usage.bytes);
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(usage);
    }

    /// Largest high-water mark ever recorded, including frames that have
    /// since left the window.
    pub fn peak_bytes(&self) -> u64 {
        self.peak_bytes
    }

    pub fn max_recent_bytes(&self) -> u64 {
        self.samples.iter().map(|u| u.bytes).max().unwrap_or(0)
    }

    pub fn average_bytes(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.samples.iter().map(|u| u.bytes).sum();
        sum as f64 / self.samples.len() as f64
    }

    pub fn last(&self) -> Option<&FrameUsage> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameUsage> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for UsageHistory {
    fn default() -> Self {
        Self::new(120)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(generation: u64, bytes: u64) -> FrameUsage {
        FrameUsage {
            slot: (generation % 3) as usize,
            generation,
            bytes,
            allocations: 1,
            capacity: 1000,
        }
    }

    #[test]
    fn test_rolling_window() {
        let mut history = UsageHistory::new(3);

        history.record(frame(0, 100));
        assert_eq!(history.average_bytes(), 100.0);

        history.record(frame(1, 200));
        history.record(frame(2, 300));
        assert_eq!(history.average_bytes(), 200.0);

        // Should wrap around
        history.record(frame(3, 30));
        assert_eq!(history.len(), 3);
        assert_eq!(history.average_bytes(), 530.0 / 3.0);
        assert_eq!(history.last().map(|u| u.generation), Some(3));
    }

    #[test]
    fn peak_outlives_window() {
        let mut history = UsageHistory::new(2);
        history.record(frame(0, 900));
        history.record(frame(1, 10));
        history.record(frame(2, 20));
        assert_eq!(history.max_recent_bytes(), 20);
        assert_eq!(history.peak_bytes(), 900);
    }

    #[test]
    fn utilization_is_fraction_of_capacity() {
        assert_eq!(frame(0, 250).utilization(), 0.25);
        let empty = FrameUsage { capacity: 0, ..frame(0, 0) };
        assert_eq!(empty.utilization(), 0.0);
    }
}

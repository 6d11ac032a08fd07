//! Input level sampling for live metering.
//!
//! The sampler polls the capture device for its raw level and keeps the most
//! recent values for trend display. Values are passed through untouched; any
//! smoothing belongs to whoever draws them.

use std::collections::VecDeque;

use crate::device::{CaptureDevice, DeviceError, DeviceWorker};

/// Number of samples kept for trend display.
pub const HISTORY_CAPACITY: usize = 50;

/// Recommended polling cadence while recording.
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 100;

/// Bounded FIFO of raw input levels.
#[derive(Debug, Clone)]
pub struct AmplitudeSampler {
    history: VecDeque<i32>,
    capacity: usize,
}

impl AmplitudeSampler {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { history: VecDeque::with_capacity(capacity), capacity }
    }

    /// Read the device's current level and append it to the history.
    pub async fn sample(&mut self, device: &DeviceWorker<dyn CaptureDevice>) -> Result<i32, DeviceError> {
        let value = device.try_call(|d| d.max_amplitude()).await?;
        self.push(value);
        Ok(value)
    }

    /// Append a value, evicting the oldest once the buffer is full.
    pub fn push(&mut self, value: i32) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(value);
    }

    pub fn latest(&self) -> Option<i32> {
        self.history.back().copied()
    }

    /// Oldest first.
    pub fn history(&self) -> Vec<i32> {
        self.history.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for AmplitudeSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_is_bounded_and_ends_with_latest() {
        let mut sampler = AmplitudeSampler::new();
        for value in 0..120 {
            sampler.push(value);
            assert!(sampler.len() <= HISTORY_CAPACITY);
            assert_eq!(sampler.latest(), Some(value));
        }

        let history = sampler.history();
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history.first(), Some(&70));
        assert_eq!(history.last(), Some(&119));
    }

    #[test]
    fn test_values_are_not_smoothed() {
        let mut sampler = AmplitudeSampler::with_capacity(3);
        sampler.push(32767);
        sampler.push(0);
        sampler.push(12);
        assert_eq!(sampler.history(), vec![32767, 0, 12]);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let mut sampler = AmplitudeSampler::with_capacity(0);
        sampler.push(1);
        sampler.push(2);
        assert_eq!(sampler.history(), vec![2]);
    }
}

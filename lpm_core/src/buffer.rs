//! Time-windowed sample buffer with lock-step first-difference derivatives.
//!
//! Invariants after every `push`:
//! - `derivatives.len() == max(0, samples.len() - 1)`
//! - `derivatives[i]` is the slope between `samples[i]` and `samples[i + 1]`
//! - every retained timestamp is `> latest - window`
//! - timestamps are strictly increasing (offending samples are refused)

use std::collections::VecDeque;
use std::time::Duration;

use lpm_traits::Sample;

use crate::error::IngestAnomaly;

#[derive(Debug, Clone)]
pub struct MeasurementBuffer {
    samples: VecDeque<Sample>,
    derivatives: VecDeque<f64>,
    window: Duration,
}

impl MeasurementBuffer {
    pub fn new(window: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            derivatives: VecDeque::new(),
            window,
        }
    }

    /// Append a sample, derive its slope against the previous one and evict
    /// everything at or before `latest - window`. Returns the number of
    /// samples evicted from the front.
    pub fn push(&mut self, sample: Sample) -> Result<usize, IngestAnomaly> {
        if !sample.reading.is_finite() {
            return Err(IngestAnomaly::NonFiniteReading(sample.timestamp));
        }
        if let Some(prev) = self.samples.back() {
            if sample.timestamp == prev.timestamp {
                return Err(IngestAnomaly::DuplicateTimestamp(sample.timestamp));
            }
            if sample.timestamp < prev.timestamp {
                return Err(IngestAnomaly::OutOfOrder {
                    latest: prev.timestamp,
                    got: sample.timestamp,
                });
            }
            let dt = (sample.timestamp - prev.timestamp).as_secs_f64();
            self.derivatives.push_back((sample.reading - prev.reading) / dt);
        }
        self.samples.push_back(sample);
        Ok(self.evict(sample.timestamp))
    }

    fn evict(&mut self, latest: Duration) -> usize {
        // Nothing can be a full window old before one window has elapsed.
        let Some(cutoff) = latest.checked_sub(self.window) else {
            return 0;
        };
        let n = self.samples.partition_point(|s| s.timestamp <= cutoff);
        if n == 0 {
            return 0;
        }
        self.samples.drain(..n);
        // Drop the same count of leading derivatives; clear outright if that
        // would overrun (only possible with a single sample left).
        if n <= self.derivatives.len() {
            self.derivatives.drain(..n);
        } else {
            self.derivatives.clear();
        }
        n
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn samples(&self) -> &VecDeque<Sample> {
        &self.samples
    }

    pub fn derivatives(&self) -> &VecDeque<f64> {
        &self.derivatives
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn oldest(&self) -> Option<&Sample> {
        self.samples.front()
    }

    pub fn latest_derivative(&self) -> Option<f64> {
        self.derivatives.back().copied()
    }

    /// Position of the sample stamped exactly `t`, by binary search.
    pub fn index_of(&self, t: Duration) -> Option<usize> {
        let i = self.samples.partition_point(|s| s.timestamp < t);
        match self.samples.get(i) {
            Some(s) if s.timestamp == t => Some(i),
            _ => None,
        }
    }

    /// First position whose timestamp is `>= t`.
    pub fn lower_bound(&self, t: Duration) -> usize {
        self.samples.partition_point(|s| s.timestamp < t)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.derivatives.clear();
    }
}

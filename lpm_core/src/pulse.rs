//! Heating-pulse detection.
//!
//! Pulses are addressed by their start and end timestamps; positional indices
//! are resolved against the live buffer by binary search whenever they are
//! needed, so eviction never has to renumber anything.
//!
//! Per new derivative `d` at sample index `i`:
//! - Idle, `d > threshold`: open a pulse spanning samples `i - 1 ..= i`.
//! - Heating, `d > threshold`, `i - end <= max(1, gap_tolerance)`: extend.
//! - Heating, `i - end > max(1, gap_tolerance)`: the open pulse is no longer
//!   extendable and closes; if `d > threshold` a new pulse opens at `i - 1`.
//! - `d <= threshold` inside the tolerance keeps the pulse open.
//!
//! Closed pulses shorter than the minimum duration are dropped. Pulses whose
//! start leaves the window are discarded whether open or closed.

use std::time::Duration;

use crate::buffer::MeasurementBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseState {
    /// Still extendable; refit on every sample.
    Open,
    /// No longer extendable; receives its definitive fit this update.
    Closing,
    /// Frozen.
    Closed,
}

/// Stored form of a pulse, independent of buffer positions.
#[derive(Debug, Clone, PartialEq)]
pub struct PulseRecord {
    pub start_time: Duration,
    pub end_time: Duration,
    /// Last above-threshold derivative (V/s).
    pub raw_value: f64,
    /// Fitted slope (V/s).
    pub slope: f64,
    /// Sum of derivative·dt over the pulse (V).
    pub integrated_power: f64,
    /// Interpolated absorbed power (mW); `None` without a calibration table.
    pub power: Option<f64>,
    /// Fit had fewer than two usable points.
    pub degenerate: bool,
    pub state: PulseState,
}

impl PulseRecord {
    fn open(start_time: Duration, end_time: Duration, raw_value: f64) -> Self {
        Self {
            start_time,
            end_time,
            raw_value,
            slope: 0.0,
            integrated_power: 0.0,
            power: None,
            degenerate: false,
            state: PulseState::Open,
        }
    }

    pub fn duration(&self) -> Duration {
        self.end_time.saturating_sub(self.start_time)
    }

    /// Open or closing pulses still take fit updates.
    pub fn is_fitting(&self) -> bool {
        self.state != PulseState::Closed
    }
}

/// Point-in-time view of a pulse with indices into the accompanying
/// snapshot's sample list.
#[derive(Debug, Clone, PartialEq)]
pub struct Pulse {
    pub start_index: usize,
    pub end_index: usize,
    pub start_time: Duration,
    pub end_time: Duration,
    pub raw_value: f64,
    pub slope: f64,
    pub power: Option<f64>,
    pub integrated_power: f64,
    pub duration: Duration,
    pub is_active: bool,
    pub degenerate: bool,
}

impl Pulse {
    /// Resolve a record against `buffer`; `None` if either end has left it.
    pub fn resolve(record: &PulseRecord, buffer: &MeasurementBuffer) -> Option<Self> {
        let start_index = buffer.index_of(record.start_time)?;
        let end_index = buffer.index_of(record.end_time)?;
        Some(Self {
            start_index,
            end_index,
            start_time: record.start_time,
            end_time: record.end_time,
            raw_value: record.raw_value,
            slope: record.slope,
            power: record.power,
            integrated_power: record.integrated_power,
            duration: record.duration(),
            is_active: record.state == PulseState::Open,
            degenerate: record.degenerate,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Idle,
    Heating,
}

#[derive(Debug, Clone)]
pub struct PulseDetector {
    threshold: f64,
    min_duration: Duration,
    reach: usize,
    pulses: Vec<PulseRecord>,
}

impl PulseDetector {
    pub fn new(threshold: f64, min_duration: Duration, gap_tolerance: usize) -> Self {
        Self {
            threshold,
            min_duration,
            reach: gap_tolerance.max(1),
            pulses: Vec::new(),
        }
    }

    pub fn state(&self) -> DetectorState {
        match self.pulses.last() {
            Some(p) if p.state == PulseState::Open => DetectorState::Heating,
            _ => DetectorState::Idle,
        }
    }

    pub fn pulses(&self) -> &[PulseRecord] {
        &self.pulses
    }

    pub fn pulses_mut(&mut self) -> &mut [PulseRecord] {
        &mut self.pulses
    }

    /// Drop pulses whose start is no longer in `buffer`. Returns how many.
    pub fn discard_evicted(&mut self, buffer: &MeasurementBuffer) -> usize {
        let Some(oldest) = buffer.oldest().map(|s| s.timestamp) else {
            let n = self.pulses.len();
            self.pulses.clear();
            return n;
        };
        let before = self.pulses.len();
        self.pulses.retain(|p| p.start_time >= oldest);
        let dropped = before - self.pulses.len();
        if dropped > 0 {
            tracing::trace!(dropped, "pulses left the window");
        }
        dropped
    }

    /// Apply the transition rules for the newest derivative in `buffer`.
    pub fn update(&mut self, buffer: &MeasurementBuffer) {
        let Some(d) = buffer.latest_derivative() else {
            return;
        };
        let i = buffer.len() - 1;
        let samples = buffer.samples();
        let heating = d > self.threshold;

        let mut extended = false;
        if let Some(open) = self.pulses.last_mut().filter(|p| p.state == PulseState::Open) {
            let end = buffer.index_of(open.end_time).unwrap_or(i);
            if i - end <= self.reach {
                if heating {
                    open.end_time = samples[i].timestamp;
                    open.raw_value = d;
                    extended = true;
                }
            } else {
                open.state = PulseState::Closing;
                tracing::debug!(
                    start = ?open.start_time,
                    end = ?open.end_time,
                    "pulse closing"
                );
            }
        }

        if heating && !extended && self.state() == DetectorState::Idle {
            let start = samples[i - 1].timestamp;
            tracing::debug!(start = ?start, derivative = d, "pulse opened");
            self.pulses
                .push(PulseRecord::open(start, samples[i].timestamp, d));
        }
    }

    /// Freeze pulses that received their definitive fit and drop the ones
    /// too short to be real heating. Returns the pulses frozen this update.
    pub fn settle(&mut self) -> Vec<PulseRecord> {
        let mut frozen = Vec::new();
        let min = self.min_duration;
        self.pulses.retain_mut(|p| {
            if p.state != PulseState::Closing {
                return true;
            }
            if p.duration() < min {
                tracing::debug!(duration = ?p.duration(), "pulse dropped as noise");
                return false;
            }
            p.state = PulseState::Closed;
            frozen.push(p.clone());
            true
        });
        frozen
    }

    pub fn clear(&mut self) {
        self.pulses.clear();
    }
}

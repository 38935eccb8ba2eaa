//! Runtime configuration for the measurement engine and the calibrator.
//!
//! These are separate from the TOML-deserialized config in `lpm_config`;
//! see `conversions` for the mapping.

use std::time::Duration;

use lpm_traits::HEATER_COUNT;

use crate::error::ConfigError;

/// Measurement pipeline parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementCfg {
    /// Trailing span of retained samples.
    pub window: Duration,
    /// Derivatives strictly above this open or extend a pulse (V/s).
    pub pulse_threshold: f64,
    /// Closed pulses shorter than this are dropped as noise.
    pub min_pulse_duration: Duration,
    /// Max sample distance from a pulse's end at which it can still be extended.
    /// Values below 1 behave as 1 (contiguous only).
    pub gap_tolerance: usize,
    /// Residuals beyond `outlier_k * sigma` are rejected before the final fit.
    pub outlier_k: f64,
}

impl Default for MeasurementCfg {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(10),
            pulse_threshold: 0.001,
            min_pulse_duration: Duration::from_secs(1),
            gap_tolerance: 2,
            outlier_k: 3.0,
        }
    }
}

impl MeasurementCfg {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.is_zero() {
            return Err(ConfigError::NonPositive("window"));
        }
        if !(self.pulse_threshold.is_finite() && self.pulse_threshold > 0.0) {
            return Err(ConfigError::NonPositive("pulse_threshold"));
        }
        if !(self.outlier_k.is_finite() && self.outlier_k > 0.0) {
            return Err(ConfigError::NonPositive("outlier_k"));
        }
        Ok(())
    }
}

/// Calibration sequence parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationCfg {
    /// All heaters off; drift measurement.
    pub baseline: Duration,
    /// Time each heater stays on.
    pub heater: Duration,
    /// Wait after each heater before the next one.
    pub cooloff: Duration,
    /// Cancellation is checked at least this often while waiting.
    pub poll: Duration,
    /// 1-based heater indices in activation order.
    pub heater_sequence: Vec<usize>,
    /// Ohms, indexed by heater number - 1.
    pub resistances: [f64; HEATER_COUNT],
    /// Heater supply voltage (V).
    pub supply_voltage: f64,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            baseline: Duration::from_secs(10),
            heater: Duration::from_secs(2),
            cooloff: Duration::from_secs(20),
            poll: Duration::from_millis(50),
            heater_sequence: vec![1, 2, 3],
            resistances: [2300.0, 500.0, 200.0],
            supply_voltage: 5.0,
        }
    }
}

impl CalibrationCfg {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baseline.is_zero() {
            return Err(ConfigError::NonPositive("baseline"));
        }
        if self.heater.is_zero() {
            return Err(ConfigError::NonPositive("heater"));
        }
        if self.cooloff.is_zero() {
            return Err(ConfigError::NonPositive("cooloff"));
        }
        if self.poll.is_zero() {
            return Err(ConfigError::NonPositive("poll"));
        }
        if !(self.supply_voltage.is_finite() && self.supply_voltage > 0.0) {
            return Err(ConfigError::NonPositive("supply_voltage"));
        }
        if self.resistances.iter().any(|r| !(r.is_finite() && *r > 0.0)) {
            return Err(ConfigError::NonPositive("heater resistance"));
        }
        for (i, h) in self.heater_sequence.iter().enumerate() {
            if !(1..=HEATER_COUNT).contains(h) {
                return Err(ConfigError::HeaterSequence(format!(
                    "heater {h} out of range 1..={HEATER_COUNT}"
                )));
            }
            if self.heater_sequence[..i].contains(h) {
                return Err(ConfigError::HeaterSequence(format!("heater {h} repeated")));
            }
        }
        Ok(())
    }
}

//! Conversions bridging `lpm_config` types to `lpm_core` types.

use lpm_traits::HEATER_COUNT;

use crate::calibration::{CalibrationPoint, CalibrationTable};
use crate::config::{CalibrationCfg, MeasurementCfg};
use crate::error::ConfigError;
use crate::util::duration_from_secs;
use std::time::Duration;

// ── MeasurementCfg ───────────────────────────────────────────────────────────

impl TryFrom<&lpm_config::Measurement> for MeasurementCfg {
    type Error = ConfigError;

    fn try_from(c: &lpm_config::Measurement) -> Result<Self, Self::Error> {
        let cfg = Self {
            window: duration_from_secs("window", c.window_seconds)?,
            pulse_threshold: c.pulse_threshold,
            min_pulse_duration: duration_from_secs("min_pulse_duration", c.min_pulse_duration)?,
            gap_tolerance: c.gap_tolerance,
            outlier_k: c.outlier_rejection_factor,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

// ── CalibrationCfg ───────────────────────────────────────────────────────────

impl CalibrationCfg {
    /// Sequence timing from `[calibration]`, electrical values from `[heaters]`.
    pub fn from_config(
        cal: &lpm_config::Calibration,
        heaters: &lpm_config::Heaters,
    ) -> Result<Self, ConfigError> {
        let resistances: [f64; HEATER_COUNT] =
            heaters
                .resistances
                .as_slice()
                .try_into()
                .map_err(|_| ConfigError::HeaterCount {
                    expected: HEATER_COUNT,
                    got: heaters.resistances.len(),
                })?;
        let cfg = Self {
            baseline: Duration::from_millis(cal.baseline_ms),
            heater: Duration::from_millis(cal.heater_ms),
            cooloff: Duration::from_millis(cal.cooloff_ms),
            poll: Duration::from_millis(cal.poll_ms),
            heater_sequence: cal.heater_sequence.clone(),
            resistances,
            supply_voltage: heaters.supply_voltage,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

impl TryFrom<&lpm_config::Config> for CalibrationCfg {
    type Error = ConfigError;

    fn try_from(c: &lpm_config::Config) -> Result<Self, Self::Error> {
        Self::from_config(&c.calibration, &c.heaters)
    }
}

// ── Calibration points ───────────────────────────────────────────────────────

impl From<&lpm_config::CalibrationRow> for CalibrationPoint {
    fn from(r: &lpm_config::CalibrationRow) -> Self {
        Self::new(r.slope, r.power)
    }
}

impl From<CalibrationPoint> for lpm_config::CalibrationRow {
    fn from(p: CalibrationPoint) -> Self {
        Self {
            slope: p.slope,
            power: p.power,
        }
    }
}

impl TryFrom<&[lpm_config::CalibrationRow]> for CalibrationTable {
    type Error = ConfigError;

    fn try_from(rows: &[lpm_config::CalibrationRow]) -> Result<Self, Self::Error> {
        Self::new(rows.iter().map(CalibrationPoint::from).collect())
    }
}

impl CalibrationTable {
    /// Rows in persistence form.
    pub fn to_rows(&self) -> Vec<lpm_config::CalibrationRow> {
        self.points().iter().copied().map(Into::into).collect()
    }
}

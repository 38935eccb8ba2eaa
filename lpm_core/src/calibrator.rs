//! Calibration sequence: baseline, then each heater in turn with a cooloff.
//!
//! Every phase reads the slope the engine fitted to pulses that started after
//! the phase began. Heaters are forced off on every exit path, including
//! device failure and cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use lpm_traits::{Clock, HeaterBank};

use crate::calibration::{CalibrationPoint, CalibrationTable, by_slope_then_power};
use crate::config::CalibrationCfg;
use crate::engine::MeasurementEngine;
use crate::error::{CalibrationError, CalibrationFailure, CalibrationStage, ConfigError};
use crate::hw_error::map_hw_error;

/// Power (mW) dissipated by a resistor of `resistance` ohms at `voltage` volts.
pub fn known_power_mw(voltage: f64, resistance: f64) -> f64 {
    1000.0 * voltage * voltage / resistance
}

type StageResult<T> = Result<T, (CalibrationStage, CalibrationFailure)>;

pub struct Calibrator<H: HeaterBank, C: Clock> {
    engine: Arc<MeasurementEngine>,
    heaters: H,
    clock: C,
    cfg: CalibrationCfg,
    cancel: Arc<AtomicBool>,
}

impl<H: HeaterBank, C: Clock> Calibrator<H, C> {
    pub fn new(
        engine: Arc<MeasurementEngine>,
        heaters: H,
        clock: C,
        cfg: CalibrationCfg,
    ) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            engine,
            heaters,
            clock,
            cfg,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Share an externally owned cancellation flag (e.g. a Ctrl-C handler).
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn heaters(&self) -> &H {
        &self.heaters
    }

    pub fn into_heaters(self) -> H {
        self.heaters
    }

    /// Run the whole sequence. On abort the error carries the failed stage
    /// and the points collected so far, sorted by slope.
    pub fn run(&mut self) -> Result<CalibrationTable, CalibrationError> {
        let mut points = Vec::with_capacity(self.cfg.heater_sequence.len() + 1);
        let outcome = self.sequence(&mut points);

        if let Err(e) = self.heaters.all_off() {
            tracing::warn!(error = %e, "failed to force heaters off");
        }

        points.sort_by(by_slope_then_power);
        match outcome {
            Ok(()) => CalibrationTable::new(points.clone()).map_err(|e| CalibrationError {
                stage: CalibrationStage::Finalize,
                cause: e.into(),
                partial: points,
            }),
            Err((stage, cause)) => {
                tracing::warn!(%stage, %cause, collected = points.len(), "calibration aborted");
                Err(CalibrationError {
                    stage,
                    cause,
                    partial: points,
                })
            }
        }
    }

    fn sequence(&mut self, points: &mut Vec<CalibrationPoint>) -> StageResult<()> {
        let stage = CalibrationStage::Baseline;
        tracing::info!(duration = ?self.cfg.baseline, "calibration: baseline");
        self.switch(stage, None)?;
        let slope = self.measure(stage, self.cfg.baseline)?;
        tracing::info!(slope, "baseline slope");
        points.push(CalibrationPoint::new(slope, 0.0));

        let sequence = self.cfg.heater_sequence.clone();
        for heater in sequence {
            let stage = CalibrationStage::Heater(heater);
            let power = known_power_mw(self.cfg.supply_voltage, self.cfg.resistances[heater - 1]);
            tracing::info!(
                heater,
                power_mw = power,
                duration = ?self.cfg.heater,
                "calibration: heater on"
            );
            self.switch(stage, Some(heater))?;
            let slope = self.measure(stage, self.cfg.heater)?;
            tracing::info!(heater, slope, power_mw = power, "heater point");
            points.push(CalibrationPoint::new(slope, power));
            self.switch(stage, None)?;

            let stage = CalibrationStage::Cooloff(heater);
            let since = self.engine.latest_timestamp().unwrap_or_default();
            self.wait(self.cfg.cooloff).map_err(|c| (stage, c))?;
            match self.engine.latest_slope_since(since) {
                Some(slope) => tracing::debug!(heater, slope, "cooloff slope"),
                None => tracing::debug!(heater, "no pulse during cooloff"),
            }
        }
        Ok(())
    }

    fn switch(&mut self, stage: CalibrationStage, heater: Option<usize>) -> StageResult<()> {
        let res = match heater {
            Some(h) => self.heaters.only(h),
            None => self.heaters.all_off(),
        };
        res.map_err(|e| (stage, CalibrationFailure::Device(map_hw_error(&*e))))
    }

    /// Wait `d`, then report the slope of the latest pulse that began during
    /// the wait; no pulse reads as zero slope.
    fn measure(&self, stage: CalibrationStage, d: Duration) -> StageResult<f64> {
        let since = self.engine.latest_timestamp().unwrap_or_default();
        self.wait(d).map_err(|c| (stage, c))?;
        Ok(self.engine.latest_slope_since(since).unwrap_or(0.0))
    }

    fn wait(&self, d: Duration) -> Result<(), CalibrationFailure> {
        let start = self.clock.now();
        loop {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(CalibrationFailure::Cancelled);
            }
            let elapsed = self.clock.elapsed_since(start);
            if elapsed >= d {
                return Ok(());
            }
            self.clock.sleep((d - elapsed).min(self.cfg.poll));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_power_is_in_milliwatts() {
        assert!((known_power_mw(5.0, 500.0) - 50.0).abs() < 1e-12);
        assert!((known_power_mw(5.0, 200.0) - 125.0).abs() < 1e-12);
    }
}

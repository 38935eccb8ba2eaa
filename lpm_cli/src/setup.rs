//! Config mapping and assembly of the simulated sensor head and engine.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use eyre::{WrapErr, eyre};
use lpm_config::{CalibrationRow, Config};
use lpm_core::{AveragingSource, CalibrationPoint, MeasurementCfg, MeasurementEngine};
use lpm_hardware::SimConfig;
use lpm_traits::{HEATER_COUNT, SampleSource};

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

pub fn sim_config(cfg: &Config) -> eyre::Result<SimConfig> {
    let s = &cfg.simulation;
    let resistances =
        <[f64; HEATER_COUNT]>::try_from(cfg.heaters.resistances.as_slice()).map_err(|_| {
            eyre!(
                "invalid configuration: heaters.resistances must list exactly {} values",
                HEATER_COUNT
            )
        })?;
    Ok(SimConfig {
        sample_period: ms(s.sample_period_ms),
        bias: s.bias,
        noise_level: s.noise_level,
        laser_power_mw: s.laser_power_mw,
        laser_duration: ms(s.laser_duration_ms),
        laser_period: ms(s.laser_period_ms),
        volts_per_mw: s.volts_per_mw,
        time_constant: ms(s.time_constant_ms),
        supply_voltage: cfg.heaters.supply_voltage,
        resistances,
        max_samples: (s.max_samples > 0).then_some(s.max_samples),
    })
}

/// Per-read timeout: two sample periods, at least 10 ms.
pub fn read_timeout(sim: &SimConfig) -> Duration {
    (sim.sample_period * 2).max(Duration::from_millis(10))
}

/// Wrap `head` so `measurement.average_samples` raw readings make one sample.
pub fn averaged<S: SampleSource>(cfg: &Config, head: S) -> AveragingSource<S> {
    let source = AveragingSource::new(head, cfg.measurement.average_samples);
    if source.window() > 1 {
        tracing::info!(samples = source.window(), "averaging sensor readings");
    }
    source
}

/// The table given on the command line wins over `calibration.points`.
pub fn calibration_rows(cfg: &Config, csv: Option<&Path>) -> eyre::Result<Vec<CalibrationRow>> {
    match csv {
        Some(path) => lpm_config::load_calibration_csv(path)
            .wrap_err("invalid configuration: calibration table"),
        None => Ok(cfg.calibration.points.clone()),
    }
}

pub fn engine(cfg: &Config, rows: &[CalibrationRow]) -> eyre::Result<Arc<MeasurementEngine>> {
    let mcfg = MeasurementCfg::try_from(&cfg.measurement)?;
    let points = rows.iter().map(CalibrationPoint::from).collect();
    let engine = MeasurementEngine::with_table(mcfg, points)?;
    Ok(Arc::new(engine))
}

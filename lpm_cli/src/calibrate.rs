//! `lpm calibrate`: run the heater sequence against the simulated head.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use lpm_config::Config;
use lpm_core::{Acquisition, CalibrationCfg, CalibrationTable, Calibrator};
use lpm_hardware::SimulatedCalorimeter;
use lpm_traits::MonotonicClock;
use serde_json::json;

use crate::setup;

/// Test hook: make the simulated bank refuse its n-th switch-on command.
const FAIL_HEATER_ENV: &str = "LPM_SIM_FAIL_SWITCH_ON";

#[derive(Debug, Default, Clone, Copy)]
pub struct Durations {
    pub baseline_ms: Option<u64>,
    pub heater_ms: Option<u64>,
    pub cooloff_ms: Option<u64>,
}

fn fail_hook() -> Option<usize> {
    let raw = std::env::var(FAIL_HEATER_ENV).ok()?;
    match raw.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(value = %raw, "ignoring malformed {}", FAIL_HEATER_ENV);
            None
        }
    }
}

fn print_table(table: &CalibrationTable, json: bool) {
    if json {
        let points: Vec<_> = table
            .points()
            .iter()
            .map(|p| json!({ "slope": p.slope, "power_mw": p.power }))
            .collect();
        println!("{}", json!({ "event": "calibration", "points": points }));
        return;
    }
    println!("{:>14}  {:>12}", "slope (V/s)", "power (mW)");
    for p in table.points() {
        println!("{:>14.6}  {:>12.3}", p.slope, p.power);
    }
}

pub fn run(
    cfg: &Config,
    overrides: Durations,
    save: Option<&Path>,
    json: bool,
    stop: &Arc<AtomicBool>,
) -> eyre::Result<CalibrationTable> {
    let mut cal = cfg.calibration.clone();
    if let Some(v) = overrides.baseline_ms {
        cal.baseline_ms = v;
    }
    if let Some(v) = overrides.heater_ms {
        cal.heater_ms = v;
    }
    if let Some(v) = overrides.cooloff_ms {
        cal.cooloff_ms = v;
    }
    let ccfg = CalibrationCfg::from_config(&cal, &cfg.heaters)?;

    let mut sim_cfg = setup::sim_config(cfg)?;
    // The laser stays dark while heaters are being characterised.
    sim_cfg.laser_power_mw = 0.0;
    sim_cfg.max_samples = None;
    let timeout = setup::read_timeout(&sim_cfg);
    let engine = setup::engine(cfg, &[])?;

    let head = SimulatedCalorimeter::new(sim_cfg, MonotonicClock::new());
    let heaters = head.heaters();
    if let Some(n) = fail_hook() {
        heaters.fail_on_switch_on(n);
    }
    let source = setup::averaged(cfg, head);
    let acquisition = Acquisition::spawn(source, Arc::clone(&engine), timeout);

    let mut calibrator = Calibrator::new(engine, heaters, MonotonicClock::new(), ccfg)?
        .with_cancel_flag(Arc::clone(stop));
    let outcome = calibrator.run();
    acquisition.stop();
    let table = outcome?;

    print_table(&table, json);
    if let Some(path) = save {
        lpm_config::save_calibration_csv(path, &table.to_rows())?;
        tracing::info!(path = %path.display(), points = table.len(), "calibration table saved");
        if !json {
            println!("saved to {}", path.display());
        }
    }
    Ok(table)
}

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
mod calibrate;
mod cli;
mod error_fmt;
mod logging;
mod measure;
mod setup;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;
use lpm_config::{CalibrationRow, Config};
use lpm_core::{CalibrationCfg, CalibrationTable, MeasurementCfg};
use lpm_hardware::SimulatedCalorimeter;
use lpm_traits::{ManualClock, SampleSource};

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error reporter: {e}");
    }
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(err) = run(cli) {
        tracing::debug!(error = ?err, "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(exit_code_for_error(&err));
    }
}

fn run(cli: Cli) -> eyre::Result<()> {
    let cfg = lpm_config::load_path(&cli.config).wrap_err("invalid configuration")?;
    cfg.validate().wrap_err("invalid configuration")?;
    logging::init(&cfg.logging, cli.log_level.as_deref(), cli.json)?;
    tracing::debug!(config = %cli.config.display(), "configuration loaded");

    let rows = setup::calibration_rows(&cfg, cli.calibration.as_deref())?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        if let Err(e) = ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed)) {
            tracing::warn!(error = %e, "Ctrl-C handler not installed");
        }
    }

    match cli.cmd {
        Commands::Measure { seconds } => {
            measure::run(&cfg, &rows, seconds, cli.json, &stop)?;
        }
        Commands::Calibrate {
            save,
            baseline_ms,
            heater_ms,
            cooloff_ms,
        } => {
            let overrides = calibrate::Durations {
                baseline_ms,
                heater_ms,
                cooloff_ms,
            };
            calibrate::run(&cfg, overrides, save.as_deref(), cli.json, &stop)?;
        }
        Commands::SelfCheck => self_check(&cfg, &rows, cli.json)?,
    }
    Ok(())
}

/// Validate everything the other commands would build, then read a few
/// samples from the simulated head without waiting in real time.
fn self_check(cfg: &Config, rows: &[CalibrationRow], json: bool) -> eyre::Result<()> {
    let table = CalibrationTable::try_from(rows)?;
    MeasurementCfg::try_from(&cfg.measurement)?.validate()?;
    CalibrationCfg::try_from(cfg)?;

    let sim_cfg = setup::sim_config(cfg)?;
    let timeout = setup::read_timeout(&sim_cfg);
    let mut head = SimulatedCalorimeter::new(sim_cfg, ManualClock::new());
    let mut read = 0;
    for _ in 0..3 {
        match head.next_sample(timeout) {
            Ok(Some(_)) => read += 1,
            Ok(None) => break,
            Err(e) => eyre::bail!("sensor read failed: {e}"),
        }
    }
    if read == 0 {
        eyre::bail!("sensor produced no samples");
    }

    if json {
        println!(
            "{}",
            serde_json::json!({
                "event": "self_check",
                "ok": true,
                "calibration_points": table.len(),
                "samples_read": read,
            })
        );
    } else {
        println!(
            "self-check ok: {} calibration point(s), {} sample(s) read",
            table.len(),
            read
        );
    }
    tracing::info!(?timeout, "self-check passed");
    Ok(())
}

//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "lpm", version, about = "Calorimetric laser power meter")]
pub struct Cli {
    /// Path to config TOML (missing file means defaults)
    #[arg(long, value_name = "FILE", default_value = "etc/lpm.toml")]
    pub config: PathBuf,

    /// Calibration table CSV (`slope,power`); overrides `calibration.points`
    #[arg(long, value_name = "FILE")]
    pub calibration: Option<PathBuf>,

    /// Print results and errors as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides `logging.level`
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Measure absorbed power from the simulated sensor head
    Measure {
        /// Stop after this many seconds (the stream may end sooner)
        #[arg(long, value_name = "S", default_value_t = 30.0)]
        seconds: f64,
    },
    /// Run the heater calibration sequence and print the resulting table
    Calibrate {
        /// Write the table to this CSV (atomically replaced)
        #[arg(long, value_name = "FILE")]
        save: Option<PathBuf>,
        /// Override calibration.baseline_ms
        #[arg(long, value_name = "MS")]
        baseline_ms: Option<u64>,
        /// Override calibration.heater_ms
        #[arg(long, value_name = "MS")]
        heater_ms: Option<u64>,
        /// Override calibration.cooloff_ms
        #[arg(long, value_name = "MS")]
        cooloff_ms: Option<u64>,
    },
    /// Validate config and calibration table, read a few simulated samples
    SelfCheck,
}

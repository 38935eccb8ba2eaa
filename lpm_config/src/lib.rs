#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and calibration-table persistence for the power meter.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//!   Every section has defaults, so a missing or partial file still yields a
//!   usable configuration.
//! - Calibration tables persist as CSV with strict `slope,power` headers and
//!   are replaced atomically on save.
use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use std::path::Path;

mod persist;

pub use persist::{load_calibration_csv, save_calibration_csv};

/// One `(slope, power)` calibration pair.
///
/// CSV form:
/// slope,power
/// 0.0,0.0
/// 0.0041,10.87
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct CalibrationRow {
    /// Fitted slope (V/s)
    pub slope: f64,
    /// Known absorbed power (mW)
    pub power: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Measurement {
    /// Trailing window of retained samples (s)
    pub window_seconds: f64,
    /// Derivative above which a sample pair counts as heating (V/s)
    pub pulse_threshold: f64,
    /// Pulses shorter than this are treated as noise (s)
    pub min_pulse_duration: f64,
    /// Samples an open pulse may skip and still be extended
    pub gap_tolerance: usize,
    /// Residuals beyond k·σ are dropped before the final fit
    pub outlier_rejection_factor: f64,
    /// Consecutive raw samples averaged into one before ingestion (0 = off)
    pub average_samples: usize,
}

impl Default for Measurement {
    fn default() -> Self {
        Self {
            window_seconds: 10.0,
            pulse_threshold: 0.001,
            min_pulse_duration: 1.0,
            gap_tolerance: 2,
            outlier_rejection_factor: 3.0,
            average_samples: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Heaters {
    /// Heater supply voltage (V)
    pub supply_voltage: f64,
    /// Resistance of heaters 1..=3 (Ω)
    pub resistances: Vec<f64>,
}

impl Default for Heaters {
    fn default() -> Self {
        Self {
            supply_voltage: 5.0,
            resistances: vec![2300.0, 500.0, 200.0],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Calibration {
    pub baseline_ms: u64,
    pub heater_ms: u64,
    pub cooloff_ms: u64,
    /// Granularity of cancellation checks while waiting (ms)
    pub poll_ms: u64,
    /// 1-based heater indices in activation order
    pub heater_sequence: Vec<usize>,
    /// Persisted table. Accepts either:
    /// - array of tables: [{ slope = 0.0, power = 0.0 }, ...]
    /// - array of tuples: [[0.0, 0.0], [0.004, 10.8], ...]
    #[serde(deserialize_with = "de_points")]
    pub points: Vec<CalibrationRow>,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            baseline_ms: 10_000,
            heater_ms: 2_000,
            cooloff_ms: 20_000,
            poll_ms: 50,
            heater_sequence: vec![1, 2, 3],
            points: vec![CalibrationRow {
                slope: 0.0,
                power: 0.0,
            }],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Simulation {
    pub sample_period_ms: u64,
    /// Resting thermopile reading (V)
    pub bias: f64,
    /// Peak amplitude of the deterministic noise term (V)
    pub noise_level: f64,
    /// Simulated laser power (mW); 0 disables the laser
    pub laser_power_mw: f64,
    pub laser_duration_ms: u64,
    /// Time between laser pulse starts (ms); 0 disables the laser
    pub laser_period_ms: u64,
    /// Steady-state reading rise per absorbed milliwatt (V/mW)
    pub volts_per_mw: f64,
    /// First-order thermal time constant (ms)
    pub time_constant_ms: u64,
    /// Stop producing samples after this many (0 = unbounded)
    pub max_samples: u64,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            sample_period_ms: 100,
            bias: 0.0,
            noise_level: 0.00002,
            laser_power_mw: 40.0,
            laser_duration_ms: 2_000,
            laser_period_ms: 20_000,
            volts_per_mw: 0.001,
            time_constant_ms: 2_000,
            max_samples: 0,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub measurement: Measurement,
    pub heaters: Heaters,
    pub calibration: Calibration,
    pub simulation: Simulation,
    pub logging: Logging,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PointToml {
    Tuple((f64, f64)),
    Table { slope: f64, power: f64 },
}

fn de_points<'de, D>(deserializer: D) -> Result<Vec<CalibrationRow>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<Vec<PointToml>> = Option::deserialize(deserializer)?;
    let mut out = Vec::new();
    if let Some(items) = opt {
        for p in items {
            match p {
                PointToml::Tuple((slope, power)) => out.push(CalibrationRow { slope, power }),
                PointToml::Table { slope, power } => out.push(CalibrationRow { slope, power }),
            }
        }
    }
    Ok(out)
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read and parse a config file. A missing file yields the defaults.
pub fn load_path(path: &Path) -> eyre::Result<Config> {
    match std::fs::read_to_string(path) {
        Ok(text) => load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
        Err(e) => Err(eyre::eyre!("read config {:?}: {}", path, e)),
    }
}

/// Check that a calibration table is usable for interpolation: finite values,
/// slopes non-decreasing and power non-decreasing with slope.
pub fn check_points(points: &[CalibrationRow]) -> eyre::Result<()> {
    for (i, p) in points.iter().enumerate() {
        if !p.slope.is_finite() || !p.power.is_finite() {
            eyre::bail!("calibration point {} is not finite", i);
        }
    }
    for (i, w) in points.windows(2).enumerate() {
        if w[1].slope < w[0].slope {
            eyre::bail!(
                "calibration points must be sorted by slope (index {} and {})",
                i,
                i + 1
            );
        }
        if w[1].power < w[0].power {
            eyre::bail!(
                "calibration power must not decrease with slope (index {} and {})",
                i,
                i + 1
            );
        }
    }
    Ok(())
}

fn positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Measurement
        let m = &self.measurement;
        if !positive(m.window_seconds) {
            eyre::bail!("measurement.window_seconds must be > 0");
        }
        if !positive(m.pulse_threshold) {
            eyre::bail!("measurement.pulse_threshold must be > 0");
        }
        if !(m.min_pulse_duration.is_finite() && m.min_pulse_duration >= 0.0) {
            eyre::bail!("measurement.min_pulse_duration must be >= 0");
        }
        if m.min_pulse_duration > m.window_seconds {
            eyre::bail!("measurement.min_pulse_duration must not exceed window_seconds");
        }
        if !positive(m.outlier_rejection_factor) {
            eyre::bail!("measurement.outlier_rejection_factor must be > 0");
        }

        // Heaters
        if !positive(self.heaters.supply_voltage) {
            eyre::bail!("heaters.supply_voltage must be > 0");
        }
        if self.heaters.resistances.len() != 3 {
            eyre::bail!(
                "heaters.resistances must list exactly 3 values, got {}",
                self.heaters.resistances.len()
            );
        }
        if let Some(i) = self.heaters.resistances.iter().position(|r| !positive(*r)) {
            eyre::bail!("heaters.resistances[{}] must be > 0", i);
        }

        // Calibration
        let c = &self.calibration;
        if c.baseline_ms == 0 {
            eyre::bail!("calibration.baseline_ms must be >= 1");
        }
        if c.heater_ms == 0 {
            eyre::bail!("calibration.heater_ms must be >= 1");
        }
        if c.cooloff_ms == 0 {
            eyre::bail!("calibration.cooloff_ms must be >= 1");
        }
        if c.poll_ms == 0 {
            eyre::bail!("calibration.poll_ms must be >= 1");
        }
        if c.heater_sequence.is_empty() {
            eyre::bail!("calibration.heater_sequence must not be empty");
        }
        for (i, h) in c.heater_sequence.iter().enumerate() {
            if !(1..=3).contains(h) {
                eyre::bail!("calibration.heater_sequence[{}] must be in 1..=3, got {}", i, h);
            }
            if c.heater_sequence[..i].contains(h) {
                eyre::bail!("calibration.heater_sequence repeats heater {}", h);
            }
        }
        check_points(&c.points)?;

        // Simulation
        let s = &self.simulation;
        if s.sample_period_ms == 0 {
            eyre::bail!("simulation.sample_period_ms must be >= 1");
        }
        if s.time_constant_ms == 0 {
            eyre::bail!("simulation.time_constant_ms must be >= 1");
        }
        if !positive(s.volts_per_mw) {
            eyre::bail!("simulation.volts_per_mw must be > 0");
        }
        if !(s.noise_level.is_finite() && s.noise_level >= 0.0) {
            eyre::bail!("simulation.noise_level must be >= 0");
        }
        if !(s.laser_power_mw.is_finite() && s.laser_power_mw >= 0.0) {
            eyre::bail!("simulation.laser_power_mw must be >= 0");
        }
        if s.laser_period_ms > 0 && s.laser_duration_ms > s.laser_period_ms {
            eyre::bail!("simulation.laser_duration_ms must not exceed laser_period_ms");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly, got {}", r);
        }

        Ok(())
    }
}

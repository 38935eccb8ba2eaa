use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::calibration::CalibrationPoint;

/// Invalid configuration or calibration table. Raised at construction or
/// call time; values are never silently corrected.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be > 0")]
    NonPositive(&'static str),
    #[error("{0} must be >= 0")]
    Negative(&'static str),
    #[error("calibration point {0} is not finite")]
    NonFinitePoint(usize),
    #[error("calibration points must be sorted by slope (index {0} and {next})", next = .0 + 1)]
    UnsortedTable(usize),
    #[error("calibration power must not decrease with slope (index {0} and {next})", next = .0 + 1)]
    NonMonotonicPower(usize),
    #[error("expected {expected} heater resistances, got {got}")]
    HeaterCount { expected: usize, got: usize },
    #[error("invalid heater sequence: {0}")]
    HeaterSequence(String),
}

/// A sample the engine refused to ingest. Logged and counted, never fatal.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum IngestAnomaly {
    #[error("duplicate timestamp {0:?}")]
    DuplicateTimestamp(Duration),
    #[error("timestamp {got:?} precedes latest {latest:?}")]
    OutOfOrder { latest: Duration, got: Duration },
    #[error("non-finite reading at {0:?}")]
    NonFiniteReading(Duration),
}

/// Heater collaborator failure.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeviceError {
    #[error("heater command failed: {0}")]
    Command(String),
    #[error("device fault: {0}")]
    Fault(String),
    #[error("device timed out")]
    Timeout,
}

/// Phase of the calibration sequence; heater numbers are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationStage {
    Baseline,
    Heater(usize),
    Cooloff(usize),
    Finalize,
}

impl fmt::Display for CalibrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Baseline => f.write_str("baseline"),
            Self::Heater(n) => write!(f, "heater {n}"),
            Self::Cooloff(n) => write!(f, "cooloff after heater {n}"),
            Self::Finalize => f.write_str("table assembly"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationFailure {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("calibration cancelled")]
    Cancelled,
    #[error(transparent)]
    Table(#[from] ConfigError),
}

/// Aborted calibration run: where it stopped, why, and the points collected
/// up to that moment (sorted by slope).
#[derive(Debug, Error, Clone, PartialEq)]
#[error("calibration aborted during {stage}: {cause}")]
pub struct CalibrationError {
    pub stage: CalibrationStage,
    pub cause: CalibrationFailure,
    pub partial: Vec<CalibrationPoint>,
}

impl CalibrationError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause, CalibrationFailure::Cancelled)
    }
}

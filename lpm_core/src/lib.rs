#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Calorimetric power measurement core (hardware-agnostic).
//!
//! Samples from a thermopile-style sensor flow through a time-windowed
//! buffer, are differentiated, segmented into heating pulses, and each pulse
//! is fitted for its rate of rise. A calibration table maps that slope to
//! absorbed power. All hardware goes through `lpm_traits::SampleSource` and
//! `lpm_traits::HeaterBank`.
//!
//! ## Architecture
//!
//! - **Buffer**: samples and lock-step derivatives over a trailing window (`buffer`)
//! - **Detection**: pulse state machine keyed by timestamps (`pulse`)
//! - **Fitting**: OLS with one round of k·σ outlier rejection (`fit`)
//! - **Interpolation**: slope → power over a validated table (`calibration`)
//! - **Engine**: single-writer ingestion, snapshots, subscriptions (`engine`)
//! - **Acquisition**: background thread draining a sample source (`sampler`),
//!   optionally block-averaged first (`averaging`)
//! - **Calibrator**: baseline/heater/cooloff sequence (`calibrator`)

pub mod averaging;
pub mod buffer;
pub mod calibration;
pub mod calibrator;
pub mod config;
pub mod conversions;
pub mod engine;
pub mod error;
pub mod fit;
pub mod hw_error;
pub mod mocks;
pub mod pulse;
pub mod sampler;
pub mod util;

pub use averaging::AveragingSource;
pub use buffer::MeasurementBuffer;
pub use calibration::{CalibrationPoint, CalibrationTable};
pub use calibrator::{Calibrator, known_power_mw};
pub use config::{CalibrationCfg, MeasurementCfg};
pub use engine::{MeasurementEngine, Snapshot, SubscriptionId};
pub use error::{
    CalibrationError, CalibrationFailure, CalibrationStage, ConfigError, DeviceError,
    IngestAnomaly,
};
pub use fit::{LineFit, PulseFitter};
pub use pulse::{DetectorState, Pulse, PulseDetector, PulseRecord, PulseState};
pub use sampler::Acquisition;

pub use lpm_traits::Sample;

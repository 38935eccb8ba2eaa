//! Hardware-facing seams shared by the measurement core, the simulator and
//! real device drivers.

pub mod clock;

use std::time::Duration;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Number of independently switchable calibration heaters on the sensor head.
pub const HEATER_COUNT: usize = 3;

/// One processed measurement in physical units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sample {
    /// Offset from the source's epoch.
    pub timestamp: Duration,
    /// Thermopile differential reading (V).
    pub reading: f64,
    /// Heater supply voltage as measured (V).
    pub voltage: f64,
    /// Total power dissipated by the active heaters (W).
    pub heater_power: f64,
}

impl Sample {
    pub fn new(timestamp: Duration, reading: f64) -> Self {
        Self {
            timestamp,
            reading,
            ..Self::default()
        }
    }
}

/// Ordered, time-increasing producer of samples.
///
/// `Ok(None)` marks the end of the stream; errors are transient and the caller
/// may retry.
pub trait SampleSource {
    fn next_sample(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Sample>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Switches the calibration heaters. Implementations must not have more than
/// one command in flight.
pub trait HeaterBank {
    fn set_heaters(
        &mut self,
        h1: bool,
        h2: bool,
        h3: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Switch every heater off.
    fn all_off(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.set_heaters(false, false, false)
    }

    /// Switch on exactly one heater (1-based index), all others off.
    fn only(&mut self, heater: usize) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.set_heaters(heater == 1, heater == 2, heater == 3)
    }
}

impl<H: HeaterBank + ?Sized> HeaterBank for Box<H> {
    fn set_heaters(
        &mut self,
        h1: bool,
        h2: bool,
        h3: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set_heaters(h1, h2, h3)
    }
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn next_sample(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Sample>, Box<dyn std::error::Error + Send + Sync>> {
        (**self).next_sample(timeout)
    }
}

//! Device-side implementations of the `lpm_traits` seams.
//!
//! The simulated calorimeter models the sensor head as a first-order thermal
//! lag driven by the calibration heaters and a periodic laser, and shares its
//! heater state with a `SimHeaters` handle so a calibration run can switch
//! heaters while another thread drains samples.
pub mod error;
mod sim;

pub use sim::{SimConfig, SimHeaters, SimulatedCalorimeter};

//! Small time helpers shared by config mapping and pulse fitting.

use std::time::Duration;

use crate::error::ConfigError;

/// Seconds as `f64` to `Duration`; negative or non-finite values are a
/// config error naming `key`.
pub fn duration_from_secs(key: &'static str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::Negative(key))
}

/// Fractional seconds between two offsets, saturating at zero.
#[inline]
pub fn secs_between(from: Duration, to: Duration) -> f64 {
    to.saturating_sub(from).as_secs_f64()
}

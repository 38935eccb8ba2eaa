//! Maps `Box<dyn Error>` from trait boundaries to typed `DeviceError`.
//!
//! `lpm_traits` uses `Box<dyn Error + Send + Sync>` so drivers stay free to
//! pick their own error types; the simulator's `HwError` is recognised
//! precisely when the `hardware-errors` feature is on.

use crate::error::DeviceError;

/// Map a heater-bank error to a typed `DeviceError`.
///
/// Known hardware error types are downcast first, anything else falls back
/// to its message.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> DeviceError {
    #[cfg(feature = "hardware-errors")]
    {
        use lpm_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => DeviceError::Timeout,
                HwError::CommandRejected(msg) => DeviceError::Command(msg.clone()),
                other => DeviceError::Fault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timed out") || s.to_lowercase().contains("timeout") {
        DeviceError::Timeout
    } else {
        DeviceError::Command(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_errors_fall_back_to_message() {
        let e = std::io::Error::other("relay stuck");
        assert_eq!(map_hw_error(&e), DeviceError::Command("relay stuck".into()));
        let t = std::io::Error::other("read timeout");
        assert_eq!(map_hw_error(&t), DeviceError::Timeout);
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn simulator_errors_are_downcast() {
        use lpm_hardware::error::HwError;
        assert_eq!(map_hw_error(&HwError::Timeout), DeviceError::Timeout);
        assert!(matches!(
            map_hw_error(&HwError::Disconnected),
            DeviceError::Fault(_)
        ));
    }
}

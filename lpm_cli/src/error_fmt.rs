//! Human-readable error descriptions, exit codes and structured JSON errors.

use lpm_core::{CalibrationError, CalibrationFailure, ConfigError, DeviceError};
use serde_json::json;

const EXIT_OTHER: i32 = 1;
const EXIT_CONFIG: i32 = 2;
const EXIT_DEVICE: i32 = 3;
const EXIT_CANCELLED: i32 = 4;

fn chain_text(err: &eyre::Report) -> String {
    err.chain()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ")
}

fn is_config_error(err: &eyre::Report) -> bool {
    err.downcast_ref::<ConfigError>().is_some()
        || err
            .chain()
            .any(|e| e.to_string().starts_with("invalid configuration"))
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(ce) = err.downcast_ref::<CalibrationError>() {
        let kept = ce.partial.len();
        return match &ce.cause {
            CalibrationFailure::Cancelled => format!(
                "What happened: Calibration was cancelled during {}.\nCollected before stopping: {kept} point(s), not saved.\nHow to fix: Re-run `lpm calibrate` and let it finish.",
                ce.stage
            ),
            CalibrationFailure::Device(DeviceError::Timeout) => format!(
                "What happened: The heater bank timed out during {}.\nCollected before stopping: {kept} point(s), not saved.\nHow to fix: Check the heater driver link, then re-run the calibration.",
                ce.stage
            ),
            CalibrationFailure::Device(dev) => format!(
                "What happened: A heater command failed during {} ({dev}).\nCollected before stopping: {kept} point(s), not saved.\nHow to fix: Check the heater wiring and supply, then re-run the calibration.",
                ce.stage
            ),
            CalibrationFailure::Table(te) => format!(
                "What happened: The measured points do not form a usable table ({te}).\nLikely causes: No pulse was detected while a heater was on, or the phases are too short.\nHow to fix: Lengthen calibration.heater_ms or lower measurement.pulse_threshold."
            ),
        };
    }

    let full = chain_text(err);
    let lower = full.to_ascii_lowercase();

    if lower.contains("calibration csv must have headers") {
        return "Invalid headers in calibration CSV. Expected 'slope,power'.".to_string();
    }

    if is_config_error(err) {
        return format!(
            "What happened: Configuration is invalid ({full}).\nLikely causes: Out-of-range values in the TOML or a malformed calibration table.\nHow to fix: Edit the config file, then rerun. `lpm self-check` validates without measuring."
        );
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {err}"
    )
}

/// Stable exit codes: 2 configuration, 3 device, 4 cancelled, 1 anything else.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(ce) = err.downcast_ref::<CalibrationError>() {
        return match ce.cause {
            CalibrationFailure::Cancelled => EXIT_CANCELLED,
            CalibrationFailure::Device(_) => EXIT_DEVICE,
            CalibrationFailure::Table(_) => EXIT_OTHER,
        };
    }
    if is_config_error(err) {
        return EXIT_CONFIG;
    }
    EXIT_OTHER
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    let msg = humanize(err);
    if let Some(ce) = err.downcast_ref::<CalibrationError>() {
        let reason = match ce.cause {
            CalibrationFailure::Cancelled => "Cancelled",
            CalibrationFailure::Device(_) => "DeviceFailure",
            CalibrationFailure::Table(_) => "InvalidTable",
        };
        let partial: Vec<_> = ce
            .partial
            .iter()
            .map(|p| json!({ "slope": p.slope, "power_mw": p.power }))
            .collect();
        return json!({
            "reason": reason,
            "stage": ce.stage.to_string(),
            "partial": partial,
            "message": msg,
        })
        .to_string();
    }
    let reason = if is_config_error(err) {
        "InvalidConfig"
    } else {
        "Error"
    };
    json!({ "reason": reason, "message": msg }).to_string()
}

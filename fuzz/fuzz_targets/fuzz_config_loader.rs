#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse errors are fine; panics are not. A config that validates must
    // also convert into engine and calibration settings.
    if let Ok(cfg) = lpm_config::load_toml(data)
        && cfg.validate().is_ok()
    {
        let _ = lpm_core::MeasurementCfg::try_from(&cfg.measurement);
        let _ = lpm_core::CalibrationCfg::try_from(&cfg);
        let _ = lpm_core::CalibrationTable::try_from(cfg.calibration.points.as_slice());
    }
});

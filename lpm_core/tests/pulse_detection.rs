//! Pulse lifecycle: opening, gap tolerance, closing, noise rejection,
//! eviction and power annotation.

use lpm_core::{CalibrationPoint, ConfigError, MeasurementCfg, MeasurementEngine, Sample};
use std::time::Duration;

/// Samples 100 ms apart whose reading changes by `step` between neighbours.
fn trace(steps: &[f64]) -> Vec<Sample> {
    let mut reading = 0.0;
    let mut out = vec![Sample::new(Duration::ZERO, reading)];
    for (i, s) in steps.iter().enumerate() {
        reading += s;
        let t = Duration::from_millis((i as u64 + 1) * 100);
        out.push(Sample::new(t, reading));
    }
    out
}

fn engine_with(cfg: MeasurementCfg) -> MeasurementEngine {
    MeasurementEngine::new(cfg).unwrap()
}

fn cfg(min_pulse_ms: u64) -> MeasurementCfg {
    MeasurementCfg {
        pulse_threshold: 0.45,
        min_pulse_duration: Duration::from_millis(min_pulse_ms),
        gap_tolerance: 2,
        ..MeasurementCfg::default()
    }
}

const UP: f64 = 0.05; // 0.5 V/s at 100 ms spacing

#[test]
fn dip_within_gap_tolerance_extends_the_pulse() {
    let e = engine_with(cfg(0));
    let mut steps = vec![UP; 5];
    steps.push(0.0);
    steps.extend([UP; 4]);
    for s in trace(&steps) {
        e.ingest(s);
    }
    let snap = e.snapshot();
    assert_eq!(snap.pulses.len(), 1);
    assert_eq!(snap.pulses[0].start_index, 0);
    assert_eq!(snap.pulses[0].end_index, 10);
    assert!(snap.pulses[0].is_active);
}

#[test]
fn gap_beyond_tolerance_closes_and_opens_a_new_pulse() {
    let e = engine_with(cfg(0));
    let mut steps = vec![UP; 5];
    steps.extend([0.0; 3]);
    steps.extend([UP; 4]);
    for s in trace(&steps) {
        e.ingest(s);
    }
    let snap = e.snapshot();
    assert_eq!(snap.pulses.len(), 2);
    let (first, second) = (&snap.pulses[0], &snap.pulses[1]);
    assert!(!first.is_active);
    assert_eq!((first.start_index, first.end_index), (0, 5));
    assert!(second.is_active);
    assert_eq!((second.start_index, second.end_index), (8, 12));
}

#[test]
fn below_threshold_samples_alone_do_not_close() {
    let e = engine_with(cfg(0));
    let mut steps = vec![UP; 5];
    steps.extend([0.0; 2]);
    for s in trace(&steps) {
        e.ingest(s);
    }
    let snap = e.snapshot();
    assert_eq!(snap.pulses.len(), 1);
    assert!(snap.pulses[0].is_active);
    assert_eq!(snap.pulses[0].end_index, 5);
}

#[test]
fn closed_pulse_is_frozen() {
    let e = engine_with(cfg(0));
    let mut steps = vec![UP; 5];
    steps.extend([0.0; 3]);
    for s in trace(&steps) {
        e.ingest(s);
    }
    let before = e.snapshot().pulses[0].clone();
    assert!(!before.is_active);

    // Noise after closure must not touch the stored fit.
    let last = e.latest_timestamp().unwrap();
    for i in 1..=5u64 {
        let jitter = 0.01 * (i % 2) as f64;
        e.ingest(Sample::new(last + Duration::from_millis(i * 100), 0.25 + jitter));
    }
    let after = e.snapshot().pulses[0].clone();
    assert_eq!(before.slope, after.slope);
    assert_eq!(before.integrated_power, after.integrated_power);
    assert_eq!(before.end_time, after.end_time);
}

#[test]
fn short_pulses_are_dropped_as_noise() {
    let e = engine_with(cfg(1000));
    let mut steps = vec![UP; 3];
    // Still open and too short: tracked but not surfaced.
    for s in trace(&steps) {
        e.ingest(s);
    }
    assert!(e.snapshot().pulses.is_empty());
    assert_eq!(e.latest_slope_since(Duration::ZERO), None);

    steps.extend([0.0; 5]);
    let e = engine_with(cfg(1000));
    for s in trace(&steps) {
        e.ingest(s);
    }
    assert!(e.snapshot().pulses.is_empty());
    assert_eq!(e.latest_slope_since(Duration::ZERO), None);
}

#[test]
fn single_step_under_default_minimum_reports_no_slope() {
    let e = engine_with(MeasurementCfg::default());
    for (ms, reading) in [(0, 0.0), (100, 0.0), (200, 0.0), (300, 0.01)] {
        e.ingest(Sample::new(Duration::from_millis(ms), reading));
    }
    assert!(e.snapshot().pulses.is_empty());
    assert_eq!(e.latest_slope_since(Duration::ZERO), None);
}

#[test]
fn rejecting_every_point_leaves_a_degenerate_pulse() {
    let e = engine_with(MeasurementCfg {
        pulse_threshold: 0.001,
        min_pulse_duration: Duration::ZERO,
        outlier_k: 1e-6,
        ..MeasurementCfg::default()
    });
    for (ms, reading) in [(0, 0.0), (100, 0.1), (200, 0.3), (300, 0.35)] {
        e.ingest(Sample::new(Duration::from_millis(ms), reading));
    }
    let snap = e.snapshot();
    assert_eq!(snap.pulses.len(), 1);
    let p = &snap.pulses[0];
    assert_eq!((p.start_index, p.end_index), (0, 3));
    assert!(p.degenerate);
    assert_eq!(p.slope, 0.0);
    assert_eq!(e.latest_slope_since(Duration::ZERO), Some(0.0));
}

#[test]
fn pulse_leaves_with_its_start_sample() {
    let e = engine_with(MeasurementCfg {
        window: Duration::from_secs(1),
        ..cfg(0)
    });
    let mut steps = vec![UP; 3];
    steps.extend([0.0; 17]);
    let samples = trace(&steps);
    for s in &samples[..8] {
        e.ingest(*s);
    }
    assert_eq!(e.snapshot().pulses.len(), 1);
    for s in &samples[8..] {
        e.ingest(*s);
    }
    let snap = e.snapshot();
    assert!(snap.pulses.is_empty());
    assert_eq!(snap.samples[0].timestamp, Duration::from_millis(1100));
}

#[test]
fn indices_track_eviction() {
    let e = engine_with(MeasurementCfg {
        window: Duration::from_millis(500),
        ..cfg(0)
    });
    // Flat lead-in, then a long rise: the start index shrinks as the lead-in
    // is evicted while start_time stays put.
    let mut steps = vec![0.0; 3];
    steps.extend([UP; 3]);
    for s in trace(&steps) {
        e.ingest(s);
    }
    let snap = e.snapshot();
    let p = &snap.pulses[0];
    assert_eq!(p.start_time, Duration::from_millis(300));
    assert_eq!(snap.samples[p.start_index].timestamp, p.start_time);
    assert_eq!(snap.samples[p.end_index].timestamp, p.end_time);
    assert!(p.end_index < snap.samples.len());
}

#[test]
fn pulses_carry_interpolated_power() {
    let e = MeasurementEngine::with_table(
        cfg(0),
        vec![CalibrationPoint::new(0.0, 0.0), CalibrationPoint::new(1.0, 100.0)],
    )
    .unwrap();
    for s in trace(&[UP; 6]) {
        e.ingest(s);
    }
    let power = e.snapshot().pulses[0].power.unwrap();
    assert!((power - 50.0).abs() < 1e-6);

    e.set_calibration_table(vec![
        CalibrationPoint::new(0.0, 0.0),
        CalibrationPoint::new(1.0, 200.0),
    ])
    .unwrap();
    let power = e.snapshot().pulses[0].power.unwrap();
    assert!((power - 100.0).abs() < 1e-6);
}

#[test]
fn no_table_means_no_power() {
    let e = engine_with(cfg(0));
    for s in trace(&[UP; 6]) {
        e.ingest(s);
    }
    assert_eq!(e.snapshot().pulses[0].power, None);
    assert_eq!(e.power_for(0.5), None);
}

#[test]
fn invalid_tables_are_refused_and_the_old_one_kept() {
    let e = engine_with(cfg(0));
    let good = vec![CalibrationPoint::new(0.0, 0.0), CalibrationPoint::new(1.0, 10.0)];
    e.set_calibration_table(good.clone()).unwrap();

    let unsorted = vec![CalibrationPoint::new(1.0, 10.0), CalibrationPoint::new(0.0, 0.0)];
    assert_eq!(
        e.set_calibration_table(unsorted),
        Err(ConfigError::UnsortedTable(0))
    );
    let falling = vec![CalibrationPoint::new(0.0, 10.0), CalibrationPoint::new(1.0, 0.0)];
    assert_eq!(
        e.set_calibration_table(falling),
        Err(ConfigError::NonMonotonicPower(0))
    );
    let nan = vec![CalibrationPoint::new(f64::NAN, 0.0)];
    assert_eq!(e.set_calibration_table(nan), Err(ConfigError::NonFinitePoint(0)));

    assert_eq!(e.calibration_table().points(), good.as_slice());
}

#[test]
fn invalid_measurement_config_fails_fast() {
    let bad = MeasurementCfg {
        window: Duration::ZERO,
        ..MeasurementCfg::default()
    };
    assert_eq!(
        MeasurementEngine::new(bad).unwrap_err(),
        ConfigError::NonPositive("window")
    );
    let bad = MeasurementCfg {
        pulse_threshold: -1.0,
        ..MeasurementCfg::default()
    };
    assert!(MeasurementEngine::new(bad).is_err());
}

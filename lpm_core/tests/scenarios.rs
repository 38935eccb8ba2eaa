//! End-to-end behaviour of the measurement pipeline on hand-built traces.

use lpm_core::{CalibrationPoint, CalibrationTable, MeasurementCfg, MeasurementEngine, Sample};
use rstest::rstest;
use std::time::Duration;

fn at(ms: u64, reading: f64) -> Sample {
    Sample::new(Duration::from_millis(ms), reading)
}

/// `n` samples 100 ms apart rising at `rate` V/s.
fn ramp(n: u64, rate: f64) -> Vec<Sample> {
    (0..n).map(|i| at(i * 100, rate * 0.1 * i as f64)).collect()
}

fn engine(threshold: f64, min_pulse_ms: u64) -> MeasurementEngine {
    MeasurementEngine::new(MeasurementCfg {
        pulse_threshold: threshold,
        min_pulse_duration: Duration::from_millis(min_pulse_ms),
        ..MeasurementCfg::default()
    })
    .unwrap()
}

#[test]
fn derivatives_follow_readings() {
    let e = engine(10.0, 0);
    for s in [at(0, 1.0), at(100, 1.1), at(200, 1.2)] {
        e.ingest(s);
    }
    let snap = e.snapshot();
    assert_eq!(snap.samples.len(), 3);
    assert_eq!(snap.derivatives.len(), 2);
    for d in snap.derivatives {
        assert!((d - 1.0).abs() < 1e-9, "derivative {d}");
    }
}

#[test]
fn steady_rise_above_threshold_yields_one_pulse() {
    // 0.5 V/s sits exactly on a 0.5 threshold; stay clear of float ties.
    let e = engine(0.45, 100);
    for s in ramp(12, 0.5) {
        e.ingest(s);
    }
    let snap = e.snapshot();
    assert_eq!(snap.pulses.len(), 1);
    let p = &snap.pulses[0];
    assert!((p.raw_value - 0.5).abs() < 1e-9);
    assert_eq!(p.duration, Duration::from_millis(1100));
    assert_eq!((p.start_index, p.end_index), (0, 11));
    assert!(p.is_active);
    assert!((p.slope - 0.5).abs() < 1e-9);
    assert!((p.integrated_power - 0.55).abs() < 1e-9);
    assert!(!p.degenerate);
}

#[test]
fn slow_rise_below_threshold_yields_nothing() {
    let e = engine(0.45, 100);
    for s in ramp(12, 0.1) {
        e.ingest(s);
    }
    assert!(e.snapshot().pulses.is_empty());
}

#[test]
fn exact_threshold_splits_the_ramp_on_float_ties() {
    // 0.05 * i steps do not divide evenly by 0.1 s, so only some derivatives
    // land strictly above 0.5.
    let e = engine(0.5, 100);
    for s in ramp(12, 0.5) {
        e.ingest(s);
    }
    let spans: Vec<_> = e
        .snapshot()
        .pulses
        .iter()
        .map(|p| (p.start_index, p.end_index))
        .collect();
    assert_eq!(spans, vec![(2, 3), (5, 6), (10, 11)]);
}

fn one_second_window() -> MeasurementEngine {
    MeasurementEngine::new(MeasurementCfg {
        window: Duration::from_secs(1),
        ..MeasurementCfg::default()
    })
    .unwrap()
}

#[test]
fn window_evicts_sample_and_its_derivative() {
    let e = one_second_window();
    e.ingest(at(0, 0.0));
    e.ingest(at(600, 1.0));
    e.ingest(at(1500, 3.0));
    let snap = e.snapshot();
    assert_eq!(snap.samples.len(), 2);
    assert_eq!(snap.samples[0].timestamp, Duration::from_millis(600));
    assert_eq!(snap.derivatives.len(), 1);
    assert!((snap.derivatives[0] - 2.0 / 0.9).abs() < 1e-9);
}

#[test]
fn sample_exactly_one_window_old_is_evicted() {
    let e = one_second_window();
    e.ingest(at(0, 0.0));
    e.ingest(at(500, 1.0));
    e.ingest(at(1500, 3.0));
    let snap = e.snapshot();
    assert_eq!(snap.samples.len(), 1);
    assert_eq!(snap.samples[0].timestamp, Duration::from_millis(1500));
    assert!(snap.derivatives.is_empty());
}

#[rstest]
#[case(0.0005, 5.0)]
#[case(0.002, 20.0)]
#[case(-0.001, -10.0)]
#[case(0.001, 10.0)]
#[case(0.0, 0.0)]
fn table_interpolates_and_extrapolates(#[case] slope: f64, #[case] power: f64) {
    let t = CalibrationTable::new(vec![
        CalibrationPoint::new(0.0, 0.0),
        CalibrationPoint::new(0.001, 10.0),
    ])
    .unwrap();
    let got = t.power_for(slope).unwrap();
    assert!((got - power).abs() < 1e-9, "power_for({slope}) = {got}");
}

#[test]
fn brackets_inside_a_multi_point_table() {
    let t = CalibrationTable::new(vec![
        CalibrationPoint::new(0.0, 0.0),
        CalibrationPoint::new(0.01, 10.0),
        CalibrationPoint::new(0.03, 50.0),
    ])
    .unwrap();
    assert!((t.power_for(0.02).unwrap() - 30.0).abs() < 1e-9);
    assert!((t.power_for(0.04).unwrap() - 70.0).abs() < 1e-9);
}

#[test]
fn empty_and_single_point_tables() {
    assert_eq!(CalibrationTable::default().power_for(1.0), None);
    let one = CalibrationTable::new(vec![CalibrationPoint::new(0.5, 7.0)]).unwrap();
    assert_eq!(one.power_for(0.0), Some(7.0));
    assert_eq!(one.power_for(9.0), Some(7.0));
}

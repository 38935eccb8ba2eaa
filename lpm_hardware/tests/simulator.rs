use lpm_hardware::error::HwError;
use lpm_hardware::{SimConfig, SimHeaters, SimulatedCalorimeter};
use lpm_traits::{HeaterBank, ManualClock, Sample, SampleSource};
use rstest::rstest;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(1);

fn quiet() -> SimConfig {
    SimConfig {
        noise_level: 0.0,
        laser_power_mw: 0.0,
        ..SimConfig::default()
    }
}

fn take(sim: &mut SimulatedCalorimeter<ManualClock>, n: usize) -> Vec<Sample> {
    (0..n)
        .map(|_| sim.next_sample(TIMEOUT).unwrap().unwrap())
        .collect()
}

#[test]
fn samples_are_paced_and_strictly_increasing() {
    let clock = ManualClock::new();
    let mut sim = SimulatedCalorimeter::new(quiet(), clock.clone());
    let samples = take(&mut sim, 10);
    for (i, s) in samples.iter().enumerate() {
        assert_eq!(s.timestamp, Duration::from_millis(i as u64 * 100));
    }
    assert_eq!(clock.elapsed(), Duration::from_millis(900));
    assert_eq!(sim.produced(), 10);
}

#[rstest]
#[case(1, 10.869_565)]
#[case(2, 50.0)]
#[case(3, 125.0)]
fn heater_settles_at_its_power(#[case] heater: usize, #[case] power_mw: f64) {
    let mut sim = SimulatedCalorimeter::new(quiet(), ManualClock::new());
    let mut heaters = sim.heaters();
    heaters.only(heater).unwrap();
    // 20 s is ten time constants.
    let last = *take(&mut sim, 200).last().unwrap();
    let steady = power_mw * 0.001;
    assert!((last.reading - steady).abs() < steady * 1e-3, "{}", last.reading);
    assert!((last.heater_power * 1000.0 - power_mw).abs() < 1e-3);
    assert_eq!(last.voltage, 5.0);
}

#[test]
fn reading_lags_behind_the_heater() {
    let mut sim = SimulatedCalorimeter::new(quiet(), ManualClock::new());
    sim.heaters().only(3).unwrap();
    let samples = take(&mut sim, 20);
    let diffs: Vec<f64> = samples
        .windows(2)
        .map(|w| w[1].reading - w[0].reading)
        .collect();
    assert!(diffs.iter().all(|d| *d > 0.0));
    // First-order lag: the rise slows down.
    assert!(diffs.windows(2).all(|w| w[1] < w[0]));
}

#[test]
fn laser_heats_after_one_period() {
    let cfg = SimConfig {
        noise_level: 0.0,
        laser_period: Duration::from_secs(1),
        laser_duration: Duration::from_millis(500),
        ..SimConfig::default()
    };
    let mut sim = SimulatedCalorimeter::new(cfg, ManualClock::new());
    let samples = take(&mut sim, 15);
    assert!(samples[..10].iter().all(|s| s.reading == 0.0));
    assert!(samples[10].reading > 0.0);
    assert!(samples.iter().all(|s| s.heater_power == 0.0));
}

#[test]
fn stream_ends_after_max_samples() {
    let cfg = SimConfig {
        max_samples: Some(3),
        ..quiet()
    };
    let mut sim = SimulatedCalorimeter::new(cfg, ManualClock::new());
    take(&mut sim, 3);
    assert!(sim.next_sample(TIMEOUT).unwrap().is_none());
}

#[test]
fn slow_period_times_out() {
    let cfg = SimConfig {
        sample_period: Duration::from_secs(5),
        ..quiet()
    };
    let clock = ManualClock::new();
    let mut sim = SimulatedCalorimeter::new(cfg, clock.clone());
    take(&mut sim, 1);
    let err = sim.next_sample(Duration::from_millis(10)).unwrap_err();
    assert_eq!(err.downcast_ref::<HwError>(), Some(&HwError::Timeout));
    assert_eq!(clock.elapsed(), Duration::from_millis(10));
}

#[test]
fn injected_failure_hits_the_nth_switch_on() {
    let sim = SimulatedCalorimeter::new(quiet(), ManualClock::new());
    let mut heaters: SimHeaters = sim.heaters();
    heaters.fail_on_switch_on(2);
    heaters.only(1).unwrap();
    heaters.all_off().unwrap();
    let err = heaters.only(2).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<HwError>(),
        Some(HwError::CommandRejected(_))
    ));
    assert_eq!(heaters.state(), [false; 3]);
    heaters.only(3).unwrap();
    assert_eq!(heaters.state(), [false, false, true]);
}

#[test]
fn disconnect_fails_reads_and_commands() {
    let mut sim = SimulatedCalorimeter::new(quiet(), ManualClock::new());
    let mut heaters = sim.heaters();
    heaters.set_connected(false);
    let err = sim.next_sample(TIMEOUT).unwrap_err();
    assert_eq!(err.downcast_ref::<HwError>(), Some(&HwError::Disconnected));
    assert!(heaters.all_off().is_err());
    heaters.set_connected(true);
    assert!(sim.next_sample(TIMEOUT).unwrap().is_some());
}

//! Acquisition thread lifecycle: end of stream, source failure and drop.

use lpm_core::mocks::VecSource;
use lpm_core::{Acquisition, MeasurementCfg, MeasurementEngine, Sample};
use lpm_traits::SampleSource;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn engine() -> Arc<MeasurementEngine> {
    Arc::new(MeasurementEngine::new(MeasurementCfg::default()).unwrap())
}

fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for acquisition");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn end_of_stream_shuts_the_engine_down() {
    let e = engine();
    let samples = (0..50).map(|i| Sample::new(Duration::from_millis(i * 100), 0.0));
    let acq = Acquisition::spawn(VecSource::new(samples), e.clone(), Duration::from_millis(10));
    wait_until(|| acq.is_finished());
    assert_eq!(acq.ingested(), 50);
    assert!(e.is_shutdown());
    assert_eq!(e.snapshot().samples.len(), 50);
}

struct FailingSource;

impl SampleSource for FailingSource {
    fn next_sample(
        &mut self,
        _timeout: Duration,
    ) -> Result<Option<Sample>, Box<dyn std::error::Error + Send + Sync>> {
        Err(Box::new(std::io::Error::other("link lost")))
    }
}

#[test]
fn source_error_stops_acquisition() {
    let e = engine();
    let acq = Acquisition::spawn(FailingSource, e.clone(), Duration::from_millis(10));
    wait_until(|| acq.is_finished());
    assert_eq!(acq.ingested(), 0);
    assert!(e.is_shutdown());
}

/// Never ends; each call blocks for the timeout and yields one sample.
struct EndlessSource {
    t: Duration,
}

impl SampleSource for EndlessSource {
    fn next_sample(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Sample>, Box<dyn std::error::Error + Send + Sync>> {
        std::thread::sleep(timeout);
        self.t += Duration::from_millis(100);
        Ok(Some(Sample::new(self.t, 0.0)))
    }
}

#[test]
fn drop_joins_a_running_thread() {
    for _ in 0..5 {
        let e = engine();
        let acq = Acquisition::spawn(
            EndlessSource { t: Duration::ZERO },
            e.clone(),
            Duration::from_millis(2),
        );
        wait_until(|| acq.ingested() > 0);
        drop(acq);
        // The thread released its engine handle on exit.
        assert_eq!(Arc::strong_count(&e), 1);
        assert!(!e.is_shutdown());
    }
}

#[test]
fn explicit_stop_is_equivalent_to_drop() {
    let e = engine();
    let acq = Acquisition::spawn(
        EndlessSource { t: Duration::ZERO },
        e.clone(),
        Duration::from_millis(2),
    );
    wait_until(|| acq.ingested() > 2);
    acq.stop();
    let n = e.snapshot().samples.len();
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(e.snapshot().samples.len(), n);
}

#[cfg(feature = "hardware-errors")]
#[test]
fn source_timeouts_are_retried() {
    use lpm_hardware::{SimConfig, SimulatedCalorimeter};
    use lpm_traits::ManualClock;

    let cfg = SimConfig {
        sample_period: Duration::from_secs(1),
        max_samples: Some(3),
        ..SimConfig::default()
    };
    let sim = SimulatedCalorimeter::new(cfg, ManualClock::new());
    let e = engine();
    let acq = Acquisition::spawn(sim, e.clone(), Duration::from_millis(100));
    wait_until(|| acq.is_finished());
    assert_eq!(acq.ingested(), 3);
    assert!(e.is_shutdown());
    assert_eq!(e.latest_timestamp(), Some(Duration::from_secs(2)));
}

#![no_main]
use std::time::Duration;

use libfuzzer_sys::arbitrary::{self, Arbitrary};
use libfuzzer_sys::fuzz_target;
use lpm_core::{MeasurementCfg, MeasurementEngine, Sample};

#[derive(Debug, Arbitrary)]
struct Step {
    /// Milliseconds to the next sample; 0 produces a duplicate.
    dt_ms: u8,
    reading: f64,
    back_ms: Option<u8>,
}

fuzz_target!(|steps: Vec<Step>| {
    let cfg = MeasurementCfg {
        window: Duration::from_secs(2),
        min_pulse_duration: Duration::from_millis(50),
        ..MeasurementCfg::default()
    };
    let Ok(engine) = MeasurementEngine::new(cfg) else {
        return;
    };
    let mut t = Duration::from_secs(1);
    for s in steps.iter().take(4096) {
        t += Duration::from_millis(u64::from(s.dt_ms));
        let ts = s
            .back_ms
            .map_or(t, |b| t.saturating_sub(Duration::from_millis(u64::from(b))));
        engine.ingest(Sample::new(ts, s.reading));

        let snap = engine.snapshot();
        assert_eq!(snap.samples.len(), snap.derivatives.len());
        assert!(snap.samples.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        for p in &snap.pulses {
            assert!(p.start_index <= p.end_index && p.end_index < snap.samples.len());
        }
        assert!(snap.pulses.iter().filter(|p| p.is_active).count() <= 1);
    }
});

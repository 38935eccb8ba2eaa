//! `lpm measure`: stream the simulated head through the engine and report
//! every pulse once it has closed.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use lpm_config::{CalibrationRow, Config};
use lpm_core::{Acquisition, Pulse};
use lpm_hardware::SimulatedCalorimeter;
use lpm_traits::MonotonicClock;
use serde_json::json;

use crate::setup;

#[derive(Debug, Clone, Copy)]
pub struct Summary {
    pub samples: u64,
    pub pulses: usize,
    pub anomalies: u64,
    pub elapsed: Duration,
}

struct Reporter {
    json: bool,
    seen: HashSet<Duration>,
}

impl Reporter {
    /// Print closed pulses not reported before; returns how many were new.
    fn closed(&mut self, pulses: &[Pulse]) -> usize {
        let mut fresh = 0;
        for p in pulses.iter().filter(|p| !p.is_active) {
            if self.seen.insert(p.start_time) {
                print_pulse(p, self.json);
                fresh += 1;
            }
        }
        fresh
    }
}

fn print_pulse(p: &Pulse, json: bool) {
    if json {
        println!(
            "{}",
            json!({
                "event": "pulse",
                "start_s": p.start_time.as_secs_f64(),
                "duration_s": p.duration.as_secs_f64(),
                "slope": p.slope,
                "power_mw": p.power,
                "integrated": p.integrated_power,
                "degenerate": p.degenerate,
            })
        );
        return;
    }
    let power = p
        .power
        .map_or_else(|| "n/a (no calibration)".to_string(), |mw| format!("{mw:.2} mW"));
    println!(
        "pulse at {:>8.3} s  duration {:.3} s  slope {:.6} V/s  power {}",
        p.start_time.as_secs_f64(),
        p.duration.as_secs_f64(),
        p.slope,
        power
    );
}

fn print_summary(s: &Summary, json: bool) {
    if json {
        println!(
            "{}",
            json!({
                "event": "summary",
                "samples": s.samples,
                "pulses": s.pulses,
                "anomalies": s.anomalies,
                "elapsed_ms": u64::try_from(s.elapsed.as_millis()).unwrap_or(u64::MAX),
            })
        );
    } else {
        println!(
            "measured {} samples in {:.1} s: {} pulse(s), {} skipped sample(s)",
            s.samples,
            s.elapsed.as_secs_f64(),
            s.pulses,
            s.anomalies
        );
    }
}

pub fn run(
    cfg: &Config,
    rows: &[CalibrationRow],
    seconds: f64,
    json: bool,
    stop: &Arc<AtomicBool>,
) -> eyre::Result<Summary> {
    if !(seconds.is_finite() && seconds > 0.0) {
        eyre::bail!("invalid configuration: --seconds must be > 0");
    }
    let started = Instant::now();
    let Some(deadline) = Duration::try_from_secs_f64(seconds)
        .ok()
        .and_then(|span| started.checked_add(span))
    else {
        eyre::bail!("invalid configuration: --seconds {seconds} is out of range");
    };
    let sim_cfg = setup::sim_config(cfg)?;
    let timeout = setup::read_timeout(&sim_cfg);
    let engine = setup::engine(cfg, rows)?;
    let (sub, rx) = engine.subscribe_channel(256);

    let head = SimulatedCalorimeter::new(sim_cfg, MonotonicClock::new());
    let source = setup::averaged(cfg, head);
    let acquisition = Acquisition::spawn(source, Arc::clone(&engine), timeout);
    tracing::info!(seconds, calibration_points = rows.len(), "measurement started");

    let mut reporter = Reporter {
        json,
        seen: HashSet::new(),
    };
    let mut pulses = 0;
    loop {
        if stop.load(Ordering::Relaxed) {
            tracing::info!("interrupted");
            break;
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        match rx.recv_timeout((deadline - now).min(Duration::from_millis(100))) {
            Ok(snapshot) => pulses += reporter.closed(&snapshot.pulses),
            Err(e) if e.is_timeout() => {
                if acquisition.is_finished() && rx.is_empty() {
                    break;
                }
            }
            Err(_) => break,
        }
    }

    let samples = acquisition.ingested();
    acquisition.stop();
    engine.unsubscribe(sub);
    engine.shutdown();
    // Pulses closed by the final samples never reached the channel.
    pulses += reporter.closed(&engine.snapshot().pulses);

    let summary = Summary {
        samples,
        pulses,
        anomalies: engine.anomaly_count(),
        elapsed: started.elapsed(),
    };
    tracing::info!(
        samples = summary.samples,
        pulses = summary.pulses,
        anomalies = summary.anomalies,
        "measurement finished"
    );
    print_summary(&summary, json);
    Ok(summary)
}

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use lpm_traits::{Clock, HEATER_COUNT, HeaterBank, Sample, SampleSource};

use crate::error::HwError;

/// Simulator parameters. Powers are in mW, readings in V.
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    pub sample_period: Duration,
    /// Resting reading.
    pub bias: f64,
    /// Peak amplitude of the deterministic noise term.
    pub noise_level: f64,
    /// 0 disables the laser.
    pub laser_power_mw: f64,
    pub laser_duration: Duration,
    /// Zero disables the laser. The first shot fires one period after start.
    pub laser_period: Duration,
    /// Steady-state reading per absorbed mW.
    pub volts_per_mw: f64,
    pub time_constant: Duration,
    pub supply_voltage: f64,
    pub resistances: [f64; HEATER_COUNT],
    /// End the stream after this many samples.
    pub max_samples: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            sample_period: Duration::from_millis(100),
            bias: 0.0,
            noise_level: 0.00002,
            laser_power_mw: 40.0,
            laser_duration: Duration::from_secs(2),
            laser_period: Duration::from_secs(20),
            volts_per_mw: 0.001,
            time_constant: Duration::from_secs(2),
            supply_voltage: 5.0,
            resistances: [2300.0, 500.0, 200.0],
            max_samples: None,
        }
    }
}

impl SimConfig {
    /// Dissipated power of the given heater combination (V²/R, in mW).
    pub fn heater_power_mw(&self, heaters: [bool; HEATER_COUNT]) -> f64 {
        heaters
            .iter()
            .zip(self.resistances)
            .filter(|(on, _)| **on)
            .map(|(_, r)| 1000.0 * self.supply_voltage * self.supply_voltage / r)
            .sum()
    }

    pub fn laser_on(&self, t: Duration) -> bool {
        if self.laser_period.is_zero() || self.laser_power_mw <= 0.0 || t < self.laser_period {
            return false;
        }
        t.as_nanos() % self.laser_period.as_nanos() < self.laser_duration.as_nanos()
    }
}

/// Bounded, repeatable pseudo-noise in [-1, 1].
fn noise(t: Duration) -> f64 {
    let ms = t.as_secs_f64() * 1000.0;
    0.5 * ((ms * 0.917).sin() + (ms * 1.313).cos())
}

#[derive(Debug, Default)]
struct Bench {
    heaters: [bool; HEATER_COUNT],
    disconnected: bool,
    switch_ons: usize,
    fail_on: Option<usize>,
}

fn lock(bench: &Mutex<Bench>) -> MutexGuard<'_, Bench> {
    bench.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Simulated sensor head, paced by `C`.
pub struct SimulatedCalorimeter<C: Clock> {
    cfg: SimConfig,
    clock: C,
    epoch: Instant,
    bench: Arc<Mutex<Bench>>,
    temperature: f64,
    next: Duration,
    produced: u64,
}

impl<C: Clock> SimulatedCalorimeter<C> {
    pub fn new(cfg: SimConfig, clock: C) -> Self {
        let epoch = clock.now();
        Self {
            temperature: cfg.bias,
            cfg,
            clock,
            epoch,
            bench: Arc::new(Mutex::new(Bench::default())),
            next: Duration::ZERO,
            produced: 0,
        }
    }

    /// Heater handle sharing this head's state.
    pub fn heaters(&self) -> SimHeaters {
        SimHeaters {
            bench: Arc::clone(&self.bench),
        }
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }

    pub fn config(&self) -> &SimConfig {
        &self.cfg
    }

    fn step(&mut self, heaters: [bool; HEATER_COUNT]) -> Sample {
        let t = self.next;
        let dt = self.cfg.sample_period.as_secs_f64();
        let tau = self.cfg.time_constant.as_secs_f64();
        let alpha = if tau > 0.0 { (dt / tau).min(1.0) } else { 1.0 };

        let heater_mw = self.cfg.heater_power_mw(heaters);
        let laser_mw = if self.cfg.laser_on(t) {
            self.cfg.laser_power_mw
        } else {
            0.0
        };
        let target = self.cfg.bias + (heater_mw + laser_mw) * self.cfg.volts_per_mw;
        self.temperature += alpha * (target - self.temperature);

        Sample {
            timestamp: t,
            reading: self.temperature + noise(t) * self.cfg.noise_level,
            voltage: if heaters.iter().any(|h| *h) {
                self.cfg.supply_voltage
            } else {
                0.0
            },
            heater_power: heater_mw / 1000.0,
        }
    }
}

impl<C: Clock> SampleSource for SimulatedCalorimeter<C> {
    fn next_sample(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Sample>, Box<dyn std::error::Error + Send + Sync>> {
        if let Some(max) = self.cfg.max_samples
            && self.produced >= max
        {
            return Ok(None);
        }

        let elapsed = self.clock.elapsed_since(self.epoch);
        if self.next > elapsed {
            let wait = self.next - elapsed;
            if wait > timeout {
                self.clock.sleep(timeout);
                return Err(Box::new(HwError::Timeout));
            }
            self.clock.sleep(wait);
        }

        let heaters = {
            let bench = lock(&self.bench);
            if bench.disconnected {
                return Err(Box::new(HwError::Disconnected));
            }
            bench.heaters
        };
        let sample = self.step(heaters);
        tracing::trace!(t = ?sample.timestamp, reading = sample.reading, "simulated sample");
        self.produced += 1;
        self.next += self.cfg.sample_period;
        Ok(Some(sample))
    }
}

/// Heater bank of a `SimulatedCalorimeter`. Clones share state.
#[derive(Debug, Clone)]
pub struct SimHeaters {
    bench: Arc<Mutex<Bench>>,
}

impl SimHeaters {
    pub fn state(&self) -> [bool; HEATER_COUNT] {
        lock(&self.bench).heaters
    }

    /// Refuse the `n`-th command (1-based) that switches any heater on.
    pub fn fail_on_switch_on(&self, n: usize) {
        lock(&self.bench).fail_on = Some(n);
    }

    /// Simulate losing the link: sensor reads and heater commands fail.
    pub fn set_connected(&self, connected: bool) {
        lock(&self.bench).disconnected = !connected;
    }
}

impl HeaterBank for SimHeaters {
    fn set_heaters(
        &mut self,
        h1: bool,
        h2: bool,
        h3: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut bench = lock(&self.bench);
        if bench.disconnected {
            return Err(Box::new(HwError::Disconnected));
        }
        if h1 || h2 || h3 {
            bench.switch_ons += 1;
            if bench.fail_on == Some(bench.switch_ons) {
                tracing::warn!(command = bench.switch_ons, "injected heater failure");
                return Err(Box::new(HwError::CommandRejected(format!(
                    "switch-on command {} refused",
                    bench.switch_ons
                ))));
            }
        }
        bench.heaters = [h1, h2, h3];
        tracing::debug!(h1, h2, h3, "heaters set");
        Ok(())
    }
}

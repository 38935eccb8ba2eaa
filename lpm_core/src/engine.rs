//! The measurement engine: sole owner and mutator of buffer, derivative and
//! pulse state.
//!
//! Every ingested sample runs buffer update, pulse update, fit update and
//! notification in that order on the caller's thread. Readers get copies.
//! Subscribers are notified after the state lock has been released, so a slow
//! callback never stalls the next `ingest`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crossbeam_channel as xch;
use lpm_traits::Sample;

use crate::buffer::MeasurementBuffer;
use crate::calibration::{CalibrationPoint, CalibrationTable};
use crate::config::MeasurementCfg;
use crate::error::ConfigError;
use crate::fit::PulseFitter;
use crate::pulse::{Pulse, PulseDetector};

/// Consistent point-in-time copy of the engine state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub samples: Vec<Sample>,
    pub derivatives: Vec<f64>,
    /// Pulses at least `min_pulse_duration` long; indices refer to `samples`.
    pub pulses: Vec<Pulse>,
}

impl Snapshot {
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.last()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&Snapshot) + Send + Sync>;

#[derive(Clone)]
enum Sink {
    Callback(Callback),
    Channel(xch::Sender<Arc<Snapshot>>),
}

struct Subscriber {
    id: SubscriptionId,
    sink: Sink,
}

struct EngineState {
    cfg: MeasurementCfg,
    buffer: MeasurementBuffer,
    detector: PulseDetector,
    fitter: PulseFitter,
    table: CalibrationTable,
}

impl EngineState {
    fn new(cfg: MeasurementCfg) -> Self {
        Self {
            buffer: MeasurementBuffer::new(cfg.window),
            detector: PulseDetector::new(
                cfg.pulse_threshold,
                cfg.min_pulse_duration,
                cfg.gap_tolerance,
            ),
            fitter: PulseFitter::new(cfg.outlier_k),
            table: CalibrationTable::default(),
            cfg,
        }
    }

    /// Pulse update, then fit update for every pulse still taking fits.
    fn step(&mut self) {
        self.detector.discard_evicted(&self.buffer);
        self.detector.update(&self.buffer);
        for p in self.detector.pulses_mut().iter_mut().filter(|p| p.is_fitting()) {
            self.fitter.apply(&self.buffer, p);
            p.power = self.table.power_for(p.slope);
        }
        for p in self.detector.settle() {
            tracing::debug!(
                start = ?p.start_time,
                duration = ?p.duration(),
                slope = p.slope,
                power = ?p.power,
                "pulse closed"
            );
        }
    }

    fn snapshot(&self) -> Snapshot {
        let min = self.cfg.min_pulse_duration;
        Snapshot {
            samples: self.buffer.samples().iter().copied().collect(),
            derivatives: self.buffer.derivatives().iter().copied().collect(),
            pulses: self
                .detector
                .pulses()
                .iter()
                .filter(|p| p.duration() >= min)
                .filter_map(|p| Pulse::resolve(p, &self.buffer))
                .collect(),
        }
    }
}

pub struct MeasurementEngine {
    state: RwLock<EngineState>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
    shutdown: AtomicBool,
    anomalies: AtomicU64,
}

impl std::fmt::Debug for MeasurementEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeasurementEngine")
            .field("shutdown", &self.is_shutdown())
            .field("anomalies", &self.anomaly_count())
            .finish_non_exhaustive()
    }
}

impl MeasurementEngine {
    pub fn new(cfg: MeasurementCfg) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            state: RwLock::new(EngineState::new(cfg)),
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            shutdown: AtomicBool::new(false),
            anomalies: AtomicU64::new(0),
        })
    }

    /// Like `new`, with an initial calibration table.
    pub fn with_table(
        cfg: MeasurementCfg,
        points: Vec<CalibrationPoint>,
    ) -> Result<Self, ConfigError> {
        let engine = Self::new(cfg)?;
        engine.set_calibration_table(points)?;
        Ok(engine)
    }

    fn read(&self) -> RwLockReadGuard<'_, EngineState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn subs(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Feed one sample. Refused samples are logged and counted, never fatal.
    pub fn ingest(&self, sample: Sample) {
        let update = {
            let mut st = self.write();
            if let Err(anomaly) = st.buffer.push(sample) {
                self.anomalies.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%anomaly, "sample skipped");
                return;
            }
            st.step();
            if self.is_shutdown() || self.subs().is_empty() {
                None
            } else {
                Some(Arc::new(st.snapshot()))
            }
        };
        if let Some(snapshot) = update {
            self.notify(&snapshot);
        }
    }

    /// Ingest a finite stream, then enter shutdown.
    pub fn process<I>(&self, samples: I)
    where
        I: IntoIterator<Item = Sample>,
    {
        for s in samples {
            self.ingest(s);
        }
        self.shutdown();
    }

    fn notify(&self, snapshot: &Arc<Snapshot>) {
        let sinks: Vec<(SubscriptionId, Sink)> = self
            .subs()
            .iter()
            .map(|s| (s.id, s.sink.clone()))
            .collect();
        let mut gone = Vec::new();
        for (id, sink) in sinks {
            match sink {
                Sink::Callback(cb) => cb(snapshot),
                Sink::Channel(tx) => match tx.try_send(Arc::clone(snapshot)) {
                    Ok(()) => {}
                    Err(xch::TrySendError::Full(_)) => {
                        tracing::warn!(subscriber = id.0, "subscriber lagging, update dropped");
                    }
                    Err(xch::TrySendError::Disconnected(_)) => gone.push(id),
                },
            }
        }
        if !gone.is_empty() {
            self.subs().retain(|s| !gone.contains(&s.id));
            tracing::debug!(count = gone.len(), "dropped disconnected subscribers");
        }
    }

    fn add(&self, sink: Sink) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subs().push(Subscriber { id, sink });
        id
    }

    /// Call `callback` with a fresh snapshot after every ingested sample.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        self.add(Sink::Callback(Arc::new(callback)))
    }

    /// Deliver snapshots over a bounded channel. Updates that find the channel
    /// full are dropped for this subscriber; a dropped receiver unsubscribes.
    pub fn subscribe_channel(
        &self,
        capacity: usize,
    ) -> (SubscriptionId, xch::Receiver<Arc<Snapshot>>) {
        let (tx, rx) = xch::bounded(capacity.max(1));
        (self.add(Sink::Channel(tx)), rx)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subs();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subs().len()
    }

    /// Stop notifications. Ingestion keeps working.
    pub fn shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            tracing::debug!("engine shut down");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Re-arm notifications for a new session. Accumulated data is kept.
    pub fn reset(&self) {
        self.shutdown.store(false, Ordering::Release);
        tracing::debug!("engine reset");
    }

    /// Drop all samples, derivatives and pulses. The table is kept.
    pub fn clear(&self) {
        let mut st = self.write();
        st.buffer.clear();
        st.detector.clear();
    }

    pub fn snapshot(&self) -> Snapshot {
        self.read().snapshot()
    }

    /// Replace the active table and re-annotate every tracked pulse.
    pub fn set_calibration_table(&self, points: Vec<CalibrationPoint>) -> Result<(), ConfigError> {
        let table = CalibrationTable::new(points)?;
        let mut st = self.write();
        let st = &mut *st;
        for p in st.detector.pulses_mut() {
            p.power = table.power_for(p.slope);
        }
        tracing::info!(points = table.len(), "calibration table replaced");
        st.table = table;
        Ok(())
    }

    pub fn calibration_table(&self) -> CalibrationTable {
        self.read().table.clone()
    }

    pub fn power_for(&self, slope: f64) -> Option<f64> {
        self.read().table.power_for(slope)
    }

    /// Fitted slope of the most recent pulse that started at or after `since`
    /// and already spans `min_pulse_duration`.
    pub fn latest_slope_since(&self, since: Duration) -> Option<f64> {
        let st = self.read();
        let min = st.cfg.min_pulse_duration;
        st.detector
            .pulses()
            .iter()
            .rev()
            .find(|p| p.start_time >= since && p.duration() >= min)
            .map(|p| p.slope)
    }

    pub fn latest_timestamp(&self) -> Option<Duration> {
        self.read().buffer.latest().map(|s| s.timestamp)
    }

    pub fn anomaly_count(&self) -> u64 {
        self.anomalies.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> MeasurementCfg {
        self.read().cfg.clone()
    }
}

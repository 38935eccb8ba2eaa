//! Background acquisition thread.
//!
//! Owns a `SampleSource` and feeds every sample into a shared engine. The
//! thread ends on end of stream (engine enters shutdown), on a source error
//! other than a timeout (logged, engine enters shutdown) or when the handle is
//! dropped.
//!
//! Each `Acquisition` spawns exactly one thread, joined on drop.
use lpm_traits::SampleSource;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::engine::MeasurementEngine;
use crate::error::DeviceError;
use crate::hw_error::map_hw_error;

pub struct Acquisition {
    ingested: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl Acquisition {
    pub fn spawn<S: SampleSource + Send + 'static>(
        mut source: S,
        engine: Arc<MeasurementEngine>,
        timeout: Duration,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let ingested = Arc::new(AtomicU64::new(0));
        let ingested_clone = ingested.clone();
        let finished = Arc::new(AtomicBool::new(false));
        let finished_clone = finished.clone();

        let join_handle = std::thread::spawn(move || {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("acquisition thread received shutdown signal");
                    break;
                }
                match source.next_sample(timeout) {
                    Ok(Some(sample)) => {
                        engine.ingest(sample);
                        ingested_clone.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(None) => {
                        tracing::debug!("sample stream ended");
                        engine.shutdown();
                        break;
                    }
                    Err(e) => match map_hw_error(&*e) {
                        // Nothing arrived within `timeout`; poll again.
                        DeviceError::Timeout => {
                            tracing::trace!("sample source timed out");
                        }
                        other => {
                            tracing::error!(error = %other, "sample source failed");
                            engine.shutdown();
                            break;
                        }
                    },
                }
            }
            finished_clone.store(true, Ordering::Release);
            tracing::trace!("acquisition thread exiting cleanly");
        });

        Self {
            ingested,
            finished,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Samples handed to the engine so far (refused ones included).
    pub fn ingested(&self) -> u64 {
        self.ingested.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Stop the thread and wait for it.
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        // Exits after the in-flight `next_sample` returns (bounded by timeout).
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("acquisition thread joined"),
                Err(e) => tracing::warn!(?e, "acquisition thread panicked during shutdown"),
            }
        }
    }
}

impl Drop for Acquisition {
    fn drop(&mut self) {
        self.halt();
    }
}

//! Test and helper mocks for lpm_core

use std::collections::VecDeque;
use std::time::Duration;

use lpm_traits::{HEATER_COUNT, HeaterBank, Sample, SampleSource};

/// Replays a fixed list of samples, then reports end of stream.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    samples: VecDeque<Sample>,
}

impl VecSource {
    pub fn new(samples: impl IntoIterator<Item = Sample>) -> Self {
        Self {
            samples: samples.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.samples.len()
    }
}

impl SampleSource for VecSource {
    fn next_sample(
        &mut self,
        _timeout: Duration,
    ) -> Result<Option<Sample>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.samples.pop_front())
    }
}

/// Heater bank that records every command and can refuse to switch a given
/// heater on.
#[derive(Debug, Clone, Default)]
pub struct RecordingHeaters {
    commands: Vec<[bool; HEATER_COUNT]>,
    fail_on: Option<usize>,
}

impl RecordingHeaters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any command that would switch heater `n` (1-based) on.
    pub fn failing_on(n: usize) -> Self {
        Self {
            commands: Vec::new(),
            fail_on: Some(n),
        }
    }

    /// Commands accepted so far.
    pub fn commands(&self) -> &[[bool; HEATER_COUNT]] {
        &self.commands
    }

    /// State after the last accepted command.
    pub fn current(&self) -> [bool; HEATER_COUNT] {
        self.commands.last().copied().unwrap_or_default()
    }
}

impl HeaterBank for RecordingHeaters {
    fn set_heaters(
        &mut self,
        h1: bool,
        h2: bool,
        h3: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let state = [h1, h2, h3];
        if let Some(n) = self.fail_on
            && state.get(n.wrapping_sub(1)) == Some(&true)
        {
            return Err(Box::new(std::io::Error::other(format!(
                "heater {n} did not respond"
            ))));
        }
        self.commands.push(state);
        Ok(())
    }
}

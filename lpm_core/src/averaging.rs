//! Block averaging in front of a sample source.
//!
//! Every `n` consecutive samples collapse into one whose reading, voltage and
//! heater power are the means of the block and whose timestamp is the last
//! one seen. A partial block is flushed once the inner source ends.

use std::time::Duration;

use lpm_traits::{Sample, SampleSource};

#[derive(Debug)]
pub struct AveragingSource<S> {
    inner: S,
    n: usize,
    block: Vec<Sample>,
    done: bool,
}

impl<S: SampleSource> AveragingSource<S> {
    /// `n` of 0 or 1 passes samples through unchanged.
    pub fn new(inner: S, n: usize) -> Self {
        let n = n.max(1);
        Self {
            inner,
            n,
            block: Vec::with_capacity(n),
            done: false,
        }
    }

    pub fn window(&self) -> usize {
        self.n
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

fn mean_of(block: &[Sample]) -> Option<Sample> {
    let last = block.last()?;
    let n = block.len() as f64;
    let (mut reading, mut voltage, mut heater_power) = (0.0, 0.0, 0.0);
    for s in block {
        reading += s.reading;
        voltage += s.voltage;
        heater_power += s.heater_power;
    }
    Some(Sample {
        timestamp: last.timestamp,
        reading: reading / n,
        voltage: voltage / n,
        heater_power: heater_power / n,
    })
}

impl<S: SampleSource> SampleSource for AveragingSource<S> {
    fn next_sample(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Sample>, Box<dyn std::error::Error + Send + Sync>> {
        if self.n == 1 {
            return self.inner.next_sample(timeout);
        }
        while !self.done && self.block.len() < self.n {
            // Errors leave the partial block in place for the next call.
            match self.inner.next_sample(timeout)? {
                Some(s) => self.block.push(s),
                None => self.done = true,
            }
        }
        let avg = mean_of(&self.block);
        if avg.is_some() && self.done && self.block.len() < self.n {
            tracing::debug!(samples = self.block.len(), "flushing partial average");
        }
        self.block.clear();
        Ok(avg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_takes_the_last_timestamp() {
        let block = [
            Sample {
                timestamp: Duration::from_millis(10),
                reading: 1.0,
                voltage: 5.0,
                heater_power: 0.0,
            },
            Sample {
                timestamp: Duration::from_millis(20),
                reading: 3.0,
                voltage: 5.2,
                heater_power: 0.1,
            },
        ];
        let m = mean_of(&block).unwrap();
        assert_eq!(m.timestamp, Duration::from_millis(20));
        assert!((m.reading - 2.0).abs() < 1e-12);
        assert!((m.voltage - 5.1).abs() < 1e-12);
        assert!((m.heater_power - 0.05).abs() < 1e-12);
    }

    #[test]
    fn empty_block_has_no_mean() {
        assert!(mean_of(&[]).is_none());
    }
}

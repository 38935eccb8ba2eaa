//! Per-pulse linear regression with one round of outlier rejection.

use crate::buffer::MeasurementBuffer;
use crate::pulse::PulseRecord;
use crate::util::secs_between;

/// Result of fitting `reading = slope * t + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub slope: f64,
    pub intercept: f64,
    /// Points that survived outlier rejection.
    pub used: usize,
    /// Fewer than two distinct time points were usable; slope reported as 0.
    pub degenerate: bool,
}

impl LineFit {
    fn degenerate(used: usize) -> Self {
        Self {
            slope: 0.0,
            intercept: 0.0,
            used,
            degenerate: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PulseFitter {
    outlier_k: f64,
}

impl PulseFitter {
    pub fn new(outlier_k: f64) -> Self {
        Self { outlier_k }
    }

    /// OLS fit over `(t, y)` points, then drop `|residual| > k * sigma` and
    /// refit once on the inliers.
    pub fn fit(&self, pts: &[(f64, f64)]) -> LineFit {
        let Some((a0, b0)) = ols(pts) else {
            return LineFit::degenerate(pts.len());
        };

        // Residuals of an OLS fit have zero mean, so their RMS is the std dev.
        let sumsq: f64 = pts
            .iter()
            .map(|(x, y)| {
                let r = y - (a0 * x + b0);
                r * r
            })
            .sum();
        let sigma = (sumsq / pts.len() as f64).sqrt();
        let thr = self.outlier_k * sigma;
        if !(thr.is_finite() && thr > 0.0) {
            return LineFit {
                slope: a0,
                intercept: b0,
                used: pts.len(),
                degenerate: false,
            };
        }

        // Online (Welford/Chan) means and covariance over inliers only.
        let mut n_in: usize = 0;
        let mut mean_x = 0.0f64;
        let mut mean_y = 0.0f64;
        let mut cxx = 0.0f64;
        let mut cxy = 0.0f64;
        for (x, y) in pts {
            if (y - (a0 * x + b0)).abs() > thr {
                continue;
            }
            n_in += 1;
            let n = n_in as f64;
            let dx = x - mean_x;
            let dy = y - mean_y;
            mean_x += dx / n;
            mean_y += dy / n;
            cxx += dx * (x - mean_x);
            cxy += dx * (y - mean_y);
        }

        if n_in == pts.len() {
            return LineFit {
                slope: a0,
                intercept: b0,
                used: n_in,
                degenerate: false,
            };
        }
        if n_in < 2 || !(cxx.is_finite() && cxx > 0.0) {
            return LineFit::degenerate(n_in);
        }
        let slope = cxy / cxx;
        if !slope.is_finite() {
            return LineFit::degenerate(n_in);
        }
        LineFit {
            slope,
            intercept: mean_y - slope * mean_x,
            used: n_in,
            degenerate: false,
        }
    }

    /// Refit `pulse` from the samples it spans and recompute its integrated
    /// derivative. No-op if the pulse no longer maps onto `buffer`.
    pub fn apply(&self, buffer: &MeasurementBuffer, pulse: &mut PulseRecord) {
        let (Some(s), Some(e)) = (
            buffer.index_of(pulse.start_time),
            buffer.index_of(pulse.end_time),
        ) else {
            return;
        };
        let samples = buffer.samples();
        let pts: Vec<(f64, f64)> = samples
            .range(s..=e)
            .map(|x| (secs_between(pulse.start_time, x.timestamp), x.reading))
            .collect();
        let line = self.fit(&pts);
        if line.degenerate && !pulse.degenerate {
            tracing::debug!(start = ?pulse.start_time, used = line.used, "degenerate pulse fit");
        }
        pulse.slope = line.slope;
        pulse.degenerate = line.degenerate;

        let derivs = buffer.derivatives();
        pulse.integrated_power = (s..e)
            .map(|j| derivs[j] * secs_between(samples[j].timestamp, samples[j + 1].timestamp))
            .sum();
    }
}

/// Ordinary least squares in f64; `None` when the x variance is zero.
fn ols(pts: &[(f64, f64)]) -> Option<(f64, f64)> {
    if pts.len() < 2 {
        return None;
    }
    let n = pts.len() as f64;
    let mean_x = pts.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pts.iter().map(|p| p.1).sum::<f64>() / n;
    let mut sxx = 0.0f64;
    let mut sxy = 0.0f64;
    for (x, y) in pts {
        let dx = x - mean_x;
        sxx += dx * dx;
        sxy += dx * (y - mean_y);
    }
    if !sxx.is_finite() || sxx == 0.0 {
        return None;
    }
    let a = sxy / sxx;
    if !a.is_finite() {
        return None;
    }
    Some((a, mean_y - a * mean_x))
}

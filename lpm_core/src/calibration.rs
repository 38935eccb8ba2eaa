//! Slope → absorbed power mapping over a table of calibration points.

use std::cmp::Ordering;

use crate::error::ConfigError;

/// Known power (mW) that produced a fitted slope (V/s).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationPoint {
    pub slope: f64,
    pub power: f64,
}

impl CalibrationPoint {
    pub const fn new(slope: f64, power: f64) -> Self {
        Self { slope, power }
    }
}

/// Validated calibration table: finite, non-decreasing in slope and in power.
///
/// Interpolation is piecewise linear between bracketing points and
/// extrapolates with the first or last segment outside the table. A table with
/// a single point maps every slope to that point's power; an empty table maps
/// nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationTable {
    points: Vec<CalibrationPoint>,
}

impl CalibrationTable {
    pub fn new(points: Vec<CalibrationPoint>) -> Result<Self, ConfigError> {
        for (i, p) in points.iter().enumerate() {
            if !p.slope.is_finite() || !p.power.is_finite() {
                return Err(ConfigError::NonFinitePoint(i));
            }
        }
        for (i, w) in points.windows(2).enumerate() {
            if w[1].slope < w[0].slope {
                return Err(ConfigError::UnsortedTable(i));
            }
            if w[1].power < w[0].power {
                return Err(ConfigError::NonMonotonicPower(i));
            }
        }
        Ok(Self { points })
    }

    /// Sort by slope, then validate.
    pub fn from_unsorted(mut points: Vec<CalibrationPoint>) -> Result<Self, ConfigError> {
        points.sort_by(by_slope_then_power);
        Self::new(points)
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn power_for(&self, slope: f64) -> Option<f64> {
        let pts = &self.points;
        match pts.len() {
            0 => None,
            1 => Some(pts[0].power),
            n => {
                let upper = pts.partition_point(|p| p.slope <= slope).clamp(1, n - 1);
                Some(lerp(pts[upper - 1], pts[upper], slope))
            }
        }
    }
}

/// Table order: slope, ties broken by power.
pub(crate) fn by_slope_then_power(a: &CalibrationPoint, b: &CalibrationPoint) -> Ordering {
    a.slope
        .total_cmp(&b.slope)
        .then(a.power.total_cmp(&b.power))
}

fn lerp(a: CalibrationPoint, b: CalibrationPoint, x: f64) -> f64 {
    let width = b.slope - a.slope;
    if width == 0.0 {
        return if x < a.slope { a.power } else { b.power };
    }
    a.power + (x - a.slope) * (b.power - a.power) / width
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_width_segment_does_not_divide() {
        let t = CalibrationTable::new(vec![
            CalibrationPoint::new(0.001, 5.0),
            CalibrationPoint::new(0.001, 5.0),
        ])
        .unwrap();
        assert_eq!(t.power_for(0.002), Some(5.0));
        assert_eq!(t.power_for(0.0), Some(5.0));
    }
}

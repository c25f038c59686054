//! Robust location/scale estimates and outlier scores.
//!
//! Scores are `|x - median| / scale` where the scale is the Median Absolute
//! Deviation times 1.4826 (consistent with the standard deviation under
//! normality). When the MAD collapses to zero the scale falls back to the
//! mean absolute deviation around the median times 1.2533; when that is also
//! zero, or there are fewer than [`MIN_ROBUST_SAMPLES`] values, no scale
//! exists and every score is zero.

use serde::{Deserialize, Serialize};

/// MAD to standard-deviation factor under normality.
pub const MAD_NORMAL_CONSISTENCY: f64 = 1.4826;

/// Mean absolute deviation to standard-deviation factor under normality.
pub const MEAN_AD_NORMAL_CONSISTENCY: f64 = 1.2533;

/// Fewest defined values for which a scale is estimated.
pub const MIN_ROBUST_SAMPLES: usize = 3;

/// Median of the non-NaN values.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) * 0.5)
    }
}

/// Median absolute deviation around the median (unscaled).
pub fn mad(values: &[f64]) -> Option<f64> {
    let center = median(values)?;
    let deviations: Vec<f64> = values
        .iter()
        .filter(|v| !v.is_nan())
        .map(|v| (v - center).abs())
        .collect();
    median(&deviations)
}

/// Which estimator produced a [`RobustScale`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleSource {
    Mad,
    MeanAbsDeviation,
}

/// Center and spread used to score a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RobustScale {
    pub center: f64,
    pub scale: f64,
    pub source: ScaleSource,
}

impl RobustScale {
    /// Robust z-score of a single value.
    pub fn score(&self, value: f64) -> f64 {
        (value - self.center).abs() / self.scale
    }
}

/// Estimate a robust scale for finite values.
pub fn robust_scale(values: &[f64]) -> Option<RobustScale> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() < MIN_ROBUST_SAMPLES {
        return None;
    }
    let center = median(&finite)?;
    let mad = mad(&finite)?;
    if mad > 0.0 {
        return Some(RobustScale {
            center,
            scale: MAD_NORMAL_CONSISTENCY * mad,
            source: ScaleSource::Mad,
        });
    }

    let mean_ad = finite.iter().map(|v| (v - center).abs()).sum::<f64>() / finite.len() as f64;
    (mean_ad > 0.0).then(|| RobustScale {
        center,
        scale: MEAN_AD_NORMAL_CONSISTENCY * mean_ad,
        source: ScaleSource::MeanAbsDeviation,
    })
}

/// Per-position robust scores for a series with holes.
#[derive(Debug, Clone, PartialEq)]
pub struct RobustScores {
    /// One score per input position; holes and non-finite values score 0.
    pub scores: Vec<f64>,
    /// Scale used, `None` when undefined (all scores are then 0).
    pub scale: Option<RobustScale>,
}

/// Score every defined position of `series` against the series' own robust
/// center and scale.
pub fn robust_z_scores(series: &[Option<f64>]) -> RobustScores {
    let defined: Vec<f64> = series.iter().flatten().copied().collect();
    let scale = robust_scale(&defined);
    let scores = series
        .iter()
        .map(|v| match (v, &scale) {
            (Some(x), Some(s)) if x.is_finite() => s.score(*x),
            _ => 0.0,
        })
        .collect();
    RobustScores { scores, scale }
}

/// First difference of a series with holes: `out[i]` is `x[i]` minus the
/// closest earlier defined value, so a step that follows a hole is still
/// measured. `None` where `x[i]` is undefined or nothing defined precedes it.
pub fn first_difference(series: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut prev: Option<f64> = None;
    series
        .iter()
        .map(|cur| {
            let cur = (*cur)?;
            let diff = prev.map(|p| cur - p);
            prev = Some(cur);
            diff
        })
        .collect()
}

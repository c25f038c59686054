//! Bucket aggregators.
//!
//! The set is closed: every aggregator the overview can carry is a variant
//! here, and each one owns its null policy.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Statistic computed over the values of one signal inside one bucket.
///
/// Declaration order is the canonical column order of an overview, so the
/// default set normalizes to min, mean, max.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggFunc {
    Min,
    Mean,
    Max,
    Median,
    Sum,
    /// Sample standard deviation (ddof = 1).
    Std,
    /// Number of present values.
    Count,
    First,
    Last,
}

impl AggFunc {
    /// Default aggregators for an overview.
    pub const DEFAULT: [AggFunc; 3] = [AggFunc::Min, AggFunc::Mean, AggFunc::Max];

    pub fn all() -> [AggFunc; 9] {
        [
            AggFunc::Min,
            AggFunc::Mean,
            AggFunc::Max,
            AggFunc::Median,
            AggFunc::Sum,
            AggFunc::Std,
            AggFunc::Count,
            AggFunc::First,
            AggFunc::Last,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::Mean => "mean",
            AggFunc::Median => "median",
            AggFunc::Sum => "sum",
            AggFunc::Std => "std",
            AggFunc::Count => "count",
            AggFunc::First => "first",
            AggFunc::Last => "last",
        }
    }

    /// Apply the aggregator to the values of one bucket.
    ///
    /// Missing values are ignored. Returns `None` (the missing marker) when no
    /// value is present, except for `Count`, which always yields a number.
    /// `Std` also needs at least two values.
    pub fn apply(self, values: &[Option<f64>]) -> Option<f64> {
        let present = values.iter().flatten().copied();
        match self {
            AggFunc::Count => Some(present.count() as f64),
            AggFunc::Min => present.reduce(f64::min),
            AggFunc::Max => present.reduce(f64::max),
            AggFunc::Sum => present.reduce(|a, b| a + b),
            AggFunc::First => present.into_iter().next(),
            AggFunc::Last => present.last(),
            AggFunc::Mean => {
                let (sum, n) = present.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
                (n > 0).then(|| sum / n as f64)
            }
            AggFunc::Median => ap_math::median(&present.collect::<Vec<f64>>()),
            AggFunc::Std => {
                let vals: Vec<f64> = present.collect();
                if vals.len() < 2 {
                    return None;
                }
                let n = vals.len() as f64;
                let mean = vals.iter().sum::<f64>() / n;
                let ss: f64 = vals.iter().map(|v| (v - mean).powi(2)).sum();
                Some((ss / (n - 1.0)).sqrt())
            }
        }
    }
}

impl FromStr for AggFunc {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        AggFunc::all()
            .into_iter()
            .find(|agg| agg.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| Error::UnknownAggregator(s.to_string()))
    }
}

impl fmt::Display for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

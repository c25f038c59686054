//! Overview (downsampling) configuration.

use ap_common::{AggFunc, Error, Result};
use serde::{Deserialize, Serialize};

/// How a measurement is bucketed into an overview table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OverviewConfig {
    /// Signals to aggregate. `None` means every numeric column except the
    /// time column.
    pub signals: Option<Vec<String>>,

    /// Buckets per second; each bucket spans `1 / hz` seconds.
    pub hz: f64,

    /// Aggregators computed for every signal.
    pub agg: Vec<AggFunc>,

    /// Name of the time column. When the column is absent (or `None`), the
    /// row index is used as seconds.
    pub time_col: Option<String>,
}

impl Default for OverviewConfig {
    fn default() -> Self {
        Self {
            signals: None,
            hz: 1.0,
            agg: AggFunc::DEFAULT.to_vec(),
            time_col: Some("timestamp".to_string()),
        }
    }
}

impl OverviewConfig {
    /// Config for an explicit signal list with default aggregators.
    pub fn for_signals<I, S>(signals: I, hz: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            signals: Some(signals.into_iter().map(Into::into).collect()),
            hz,
            ..Self::default()
        }
    }

    /// Set the time column.
    pub fn with_time_col(mut self, time_col: Option<&str>) -> Self {
        self.time_col = time_col.map(str::to_string);
        self
    }

    /// Set the aggregators.
    pub fn with_agg(mut self, agg: impl Into<Vec<AggFunc>>) -> Self {
        self.agg = agg.into();
        self
    }

    /// Bucket width in seconds.
    pub fn bucket_width(&self) -> f64 {
        1.0 / self.hz
    }

    /// Semantic validation.
    pub fn validate(&self) -> Result<()> {
        if !self.hz.is_finite() || self.hz <= 0.0 {
            return Err(Error::Config(format!(
                "hz must be finite and > 0, got {}",
                self.hz
            )));
        }
        if self.agg.is_empty() {
            return Err(Error::Config("at least one aggregator is required".into()));
        }
        if let Some(signals) = &self.signals {
            if signals.is_empty() {
                return Err(Error::Config(
                    "signal list is empty; use None to infer signals".into(),
                ));
            }
            if signals.iter().any(|s| s.trim().is_empty()) {
                return Err(Error::Config("signal names must be non-empty".into()));
            }
            if let Some(time_col) = &self.time_col {
                if signals.contains(time_col) {
                    return Err(Error::Config(format!(
                        "time column '{}' cannot also be a signal",
                        time_col
                    )));
                }
            }
        }
        if matches!(&self.time_col, Some(t) if t.trim().is_empty()) {
            return Err(Error::Config("time column name must be non-empty".into()));
        }
        Ok(())
    }

    /// Validated copy with option order removed: signals and aggregators are
    /// sorted and de-duplicated.
    ///
    /// The aggregator builds from the normalized form, so two configs that
    /// normalize equal always describe the same artifact.
    pub fn normalized(&self) -> Result<Self> {
        self.validate()?;
        let mut out = self.clone();
        if let Some(signals) = out.signals.as_mut() {
            signals.sort();
            signals.dedup();
        }
        out.agg.sort();
        out.agg.dedup();
        Ok(out)
    }
}

//! Pass-1 autopsy thresholds.

use ap_common::{Error, Result};
use serde::{Deserialize, Serialize};

/// Thresholds and limits for the coarse anomaly pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Pass1Config {
    /// Missing-rate at or above which a signal's missing buckets are flagged.
    pub missing_rate: f64,

    /// Maximum value range still considered flat.
    pub flatline_eps: f64,

    /// Minimum number of consecutive flat buckets forming a flatline run.
    pub flatline_min_run: usize,

    /// Robust z-score at or above which a bucket is spiking.
    pub spike_mad_z: f64,

    /// Number of ranked windows retained.
    pub top_k_windows: usize,

    /// Number of contributing signals retained per window.
    pub top_n_signals: usize,

    /// Unflagged buckets that may be bridged when merging flagged buckets
    /// into windows. Zero means any unflagged bucket breaks a window.
    pub merge_gap_buckets: usize,
}

impl Default for Pass1Config {
    fn default() -> Self {
        Self {
            missing_rate: 0.1,
            flatline_eps: 1e-6,
            flatline_min_run: 10,
            spike_mad_z: 5.0,
            top_k_windows: 10,
            top_n_signals: 3,
            merge_gap_buckets: 0,
        }
    }
}

impl Pass1Config {
    /// Semantic validation.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.missing_rate) {
            return Err(Error::Config(format!(
                "missing_rate must be in [0.0, 1.0], got {}",
                self.missing_rate
            )));
        }
        if !self.flatline_eps.is_finite() || self.flatline_eps < 0.0 {
            return Err(Error::Config(format!(
                "flatline_eps must be finite and >= 0, got {}",
                self.flatline_eps
            )));
        }
        if self.flatline_min_run == 0 {
            return Err(Error::Config("flatline_min_run must be >= 1".into()));
        }
        if !self.spike_mad_z.is_finite() || self.spike_mad_z <= 0.0 {
            return Err(Error::Config(format!(
                "spike_mad_z must be finite and > 0, got {}",
                self.spike_mad_z
            )));
        }
        if self.top_k_windows == 0 || self.top_n_signals == 0 {
            return Err(Error::Config(
                "top_k_windows and top_n_signals must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// Validated copy in canonical numeric form.
    pub fn normalized(&self) -> Result<Self> {
        self.validate()?;
        let mut out = self.clone();
        // -0.0 and 0.0 must key identically
        out.flatline_eps += 0.0;
        out.missing_rate += 0.0;
        Ok(out)
    }
}

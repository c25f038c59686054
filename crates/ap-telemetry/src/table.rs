//! In-memory overview table.

use ap_common::AggFunc;
use serde::{Deserialize, Serialize};

/// Largest bucket index magnitude: every index, its successor and any span
/// between two indices stay exact in `f64` and cannot overflow `i64`.
pub const MAX_BUCKET_INDEX: i64 = 1 << 53;

/// One fixed-width bucket of the overview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    /// `floor(t · hz)` of the rows grouped here.
    pub index: i64,
    /// `index / hz`, seconds.
    pub start_time: f64,
    /// `(index + 1) / hz`, seconds.
    pub end_time: f64,
    /// Rows that fell into the bucket.
    pub row_count: u64,
    /// Aggregates, signal-major: slot `s * aggs.len() + a`. `None` is the
    /// missing marker.
    pub values: Vec<Option<f64>>,
}

/// Downsampled measurement: ordered buckets plus the layout they were built
/// with. Buckets with no rows are absent, never zero-filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewTable {
    pub hz: f64,
    pub signals: Vec<String>,
    pub aggs: Vec<AggFunc>,
    /// Configured time column (kept even when synthetic time was used).
    pub time_col: Option<String>,
    /// True when the configured time column was absent and row indices were
    /// used as seconds.
    pub synthetic_time: bool,
    /// Rows skipped because their time value was missing.
    pub dropped_rows: u64,
    /// Raw rows whose time value was smaller than the previous row's.
    pub source_time_regressions: u64,
    pub buckets: Vec<Bucket>,
}

impl OverviewTable {
    pub fn bucket_width(&self) -> f64 {
        1.0 / self.hz
    }

    /// Slot of `(signal, agg)` inside [`Bucket::values`].
    pub fn slot(&self, signal: &str, agg: AggFunc) -> Option<usize> {
        let s = self.signals.iter().position(|name| name == signal)?;
        let a = self.aggs.iter().position(|x| *x == agg)?;
        Some(s * self.aggs.len() + a)
    }

    /// Values of one signal aggregate, one entry per emitted bucket.
    pub fn series(&self, signal: &str, agg: AggFunc) -> Option<Vec<Option<f64>>> {
        let slot = self.slot(signal, agg)?;
        Some(self.buckets.iter().map(|b| b.values[slot]).collect())
    }

    pub fn has_agg(&self, agg: AggFunc) -> bool {
        self.aggs.contains(&agg)
    }

    pub fn first_index(&self) -> Option<i64> {
        self.buckets.first().map(|b| b.index)
    }

    pub fn last_index(&self) -> Option<i64> {
        self.buckets.last().map(|b| b.index)
    }

    /// Number of indices in `first ..= last`, gaps included.
    pub fn span(&self) -> u64 {
        match (self.first_index(), self.last_index()) {
            (Some(first), Some(last)) => last.abs_diff(first) + 1,
            _ => 0,
        }
    }

    pub fn total_rows(&self) -> u64 {
        self.buckets.iter().map(|b| b.row_count).sum()
    }

    /// Structural invariants every table must hold; used to reject corrupted
    /// artifacts.
    pub fn check_invariants(&self) -> Result<(), String> {
        if !self.hz.is_finite() || self.hz <= 0.0 {
            return Err(format!("invalid hz {}", self.hz));
        }
        let width = self.signals.len() * self.aggs.len();
        for (pos, bucket) in self.buckets.iter().enumerate() {
            if bucket.values.len() != width {
                return Err(format!(
                    "bucket {} has {} values, expected {}",
                    bucket.index,
                    bucket.values.len(),
                    width
                ));
            }
            if bucket.index.abs() > MAX_BUCKET_INDEX {
                return Err(format!("bucket index {} out of range", bucket.index));
            }
            if bucket.row_count == 0 {
                return Err(format!("bucket {} is empty", bucket.index));
            }
            if pos > 0 && self.buckets[pos - 1].index >= bucket.index {
                return Err(format!(
                    "bucket indices not strictly increasing at position {}",
                    pos
                ));
            }
        }
        Ok(())
    }
}

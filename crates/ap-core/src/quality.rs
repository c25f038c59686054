//! Quality metrics over an overview table.
//!
//! Metrics walk the emitted buckets only. An index gap between two emitted
//! buckets counts as missing data for every signal and breaks flatline runs,
//! but it enters the metrics as an index range, never cell by cell, so work
//! and memory follow the bucket count rather than the time span.

use std::collections::BTreeMap;

use ap_common::{AggFunc, Error, Result};
use ap_config::Pass1Config;
use ap_math::{chained_runs, first_difference, robust_z_scores, RobustScale};
use ap_telemetry::OverviewTable;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Spacing tolerance, as a fraction of the expected bucket spacing, before
/// a timestamp gap is recorded.
pub const GAP_TOLERANCE: f64 = 0.5;

/// Cap on the spike severity of one bucket.
pub const MAX_SPIKE_SEVERITY: f64 = 10.0;

/// Inclusive range of absolute bucket indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRange {
    pub start: i64,
    pub end: i64,
}

impl BucketRange {
    pub fn single(index: i64) -> Self {
        BucketRange {
            start: index,
            end: index,
        }
    }

    pub fn len(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.end.abs_diff(self.start) + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn contains(&self, index: i64) -> bool {
        index >= self.start && index <= self.end
    }

    /// Number of indices shared with `other`.
    pub fn overlap(&self, other: &BucketRange) -> u64 {
        BucketRange {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        }
        .len()
    }
}

/// Sort `ranges` and merge those that overlap or are separated by at most
/// `max_gap` uncovered indices. With `max_gap` 0, adjacent ranges merge.
pub fn merge_ranges(mut ranges: Vec<BucketRange>, max_gap: u64) -> Vec<BucketRange> {
    ranges.retain(|r| !r.is_empty());
    ranges.sort_by_key(|r| (r.start, r.end));
    let mut merged: Vec<BucketRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start <= last.end || range.start.abs_diff(last.end) - 1 <= max_gap => {
                last.end = last.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// Check that raised a [`Flag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    Flatline,
    Missing,
    Spike,
}

/// Indices one signal flagged through one check, each weighing `severity`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Flag {
    pub kind: FlagKind,
    pub range: BucketRange,
    pub severity: f64,
}

/// Quality indicators of one signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcMetric {
    pub signal: String,
    /// Fraction of the indices in `first ..= last` lacking a mean value;
    /// index gaps count as missing.
    pub missing_rate: f64,
    /// `missing_rate` reached the configured threshold.
    pub missing_rate_flagged: bool,
    /// Index ranges lacking a mean value, gaps included.
    pub missing_runs: Vec<BucketRange>,
    pub flatline_runs: Vec<BucketRange>,
    /// Robust z-score of the mean's step into each emitted bucket from the
    /// closest earlier bucket with a mean, aligned with
    /// [`QualityReport::bucket_indices`].
    pub spike_scores: Vec<f64>,
    pub spike_max: f64,
    /// Scale behind `spike_scores`; `None` when it was undefined and every
    /// score is zero.
    pub spike_scale: Option<RobustScale>,
    /// Indices flagged by any check for this signal.
    pub flagged_buckets: u64,
}

impl QcMetric {
    /// Flags raised by this signal. Flatline and missing indices weigh 1
    /// each, a spike weighs `min(score / z, 10)`; missing runs only count
    /// once `missing_rate_flagged` is set.
    pub fn flags(&self, bucket_indices: &[i64], cfg: &Pass1Config) -> Vec<Flag> {
        let mut flags: Vec<Flag> = self
            .flatline_runs
            .iter()
            .map(|&range| Flag {
                kind: FlagKind::Flatline,
                range,
                severity: 1.0,
            })
            .collect();
        if self.missing_rate_flagged {
            flags.extend(self.missing_runs.iter().map(|&range| Flag {
                kind: FlagKind::Missing,
                range,
                severity: 1.0,
            }));
        }
        let spikes = bucket_indices
            .iter()
            .zip(&self.spike_scores)
            .filter(|(_, score)| **score >= cfg.spike_mad_z)
            .map(|(&index, &score)| Flag {
                kind: FlagKind::Spike,
                range: BucketRange::single(index),
                severity: (score / cfg.spike_mad_z).min(MAX_SPIKE_SEVERITY),
            });
        flags.extend(spikes);
        flags
    }
}

/// Spacing between consecutive emitted buckets that exceeded the tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimestampGap {
    pub after_bucket: i64,
    pub before_bucket: i64,
    pub spacing_secs: f64,
}

/// Timestamp integrity of the overview's time base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampCheck {
    /// False for synthetic time, where the checks are vacuous.
    pub applied: bool,
    pub monotonic: bool,
    pub expected_spacing_secs: f64,
    pub gaps: Vec<TimestampGap>,
    pub source_time_regressions: u64,
    pub dropped_rows: u64,
}

/// Output of [`analyze`].
#[derive(Debug, Clone, PartialEq)]
pub struct QualityReport {
    /// First bucket index; `None` for an overview without buckets.
    pub first_bucket: Option<i64>,
    /// Indices in `first ..= last`, gaps included.
    pub bucket_count: u64,
    /// Index of every emitted bucket, in overview order.
    pub bucket_indices: Vec<i64>,
    pub metrics: BTreeMap<String, QcMetric>,
    pub timestamp: TimestampCheck,
}

/// Compute per-signal quality metrics and the timestamp check.
pub fn analyze(overview: &OverviewTable, cfg: &Pass1Config) -> Result<QualityReport> {
    let cfg = cfg.normalized()?;
    for required in [AggFunc::Min, AggFunc::Mean, AggFunc::Max] {
        if !overview.has_agg(required) {
            return Err(Error::Config(format!(
                "pass-1 needs the '{}' aggregator in the overview",
                required
            )));
        }
    }

    let indices: Vec<i64> = overview.buckets.iter().map(|b| b.index).collect();
    let span = overview.span();
    let mut metrics = BTreeMap::new();
    for signal in &overview.signals {
        let metric = signal_metric(overview, signal, &indices, span, &cfg)?;
        metrics.insert(signal.clone(), metric);
    }
    let timestamp = check_timestamps(overview);

    debug!(
        signals = metrics.len(),
        buckets = indices.len(),
        span,
        monotonic = timestamp.monotonic,
        gaps = timestamp.gaps.len(),
        "analyzed overview quality"
    );

    Ok(QualityReport {
        first_bucket: overview.first_index(),
        bucket_count: span,
        bucket_indices: indices,
        metrics,
        timestamp,
    })
}

fn signal_metric(
    overview: &OverviewTable,
    signal: &str,
    indices: &[i64],
    span: u64,
    cfg: &Pass1Config,
) -> Result<QcMetric> {
    let series = |agg| {
        overview.series(signal, agg).ok_or_else(|| Error::UnknownSignal {
            signal: signal.to_string(),
        })
    };
    let mins = series(AggFunc::Min)?;
    let means = series(AggFunc::Mean)?;
    let maxs = series(AggFunc::Max)?;

    let mut holes = Vec::new();
    for (pos, (&index, mean)) in indices.iter().zip(&means).enumerate() {
        if let Some(&prev) = pos.checked_sub(1).and_then(|p| indices.get(p)) {
            if index - prev > 1 {
                holes.push(BucketRange {
                    start: prev + 1,
                    end: index - 1,
                });
            }
        }
        if mean.is_none() {
            holes.push(BucketRange::single(index));
        }
    }
    let missing_runs = merge_ranges(holes, 0);
    let missing_count: u64 = missing_runs.iter().map(BucketRange::len).sum();
    let missing_rate = if span == 0 {
        0.0
    } else {
        missing_count as f64 / span as f64
    };
    let missing_rate_flagged = span > 0 && missing_rate >= cfg.missing_rate;

    let envelope = |pos: usize| mins[pos].zip(maxs[pos]);
    let flatline_runs: Vec<BucketRange> = chained_runs(
        indices.len(),
        |pos| matches!(envelope(pos), Some((lo, hi)) if hi - lo <= cfg.flatline_eps),
        |pos| {
            indices[pos] - indices[pos - 1] == 1
                && match (envelope(pos - 1), envelope(pos)) {
                    (Some((lo_a, hi_a)), Some((lo_b, hi_b))) => {
                        hi_a.max(hi_b) - lo_a.min(lo_b) <= cfg.flatline_eps
                    }
                    _ => false,
                }
        },
    )
    .into_iter()
    // runs never cross a gap, so positions and indices count alike
    .filter(|run| run.len() >= cfg.flatline_min_run)
    .map(|run| BucketRange {
        start: indices[run.start],
        end: indices[run.end],
    })
    .collect();

    let robust = robust_z_scores(&first_difference(&means));
    let spike_max = robust.scores.iter().copied().fold(0.0, f64::max);

    let mut metric = QcMetric {
        signal: signal.to_string(),
        missing_rate,
        missing_rate_flagged,
        missing_runs,
        flatline_runs,
        spike_scores: robust.scores,
        spike_max,
        spike_scale: robust.scale,
        flagged_buckets: 0,
    };
    let flagged = metric.flags(indices, cfg).iter().map(|f| f.range).collect();
    metric.flagged_buckets = merge_ranges(flagged, 0).iter().map(BucketRange::len).sum();
    Ok(metric)
}

fn check_timestamps(overview: &OverviewTable) -> TimestampCheck {
    let expected = overview.bucket_width();
    let mut check = TimestampCheck {
        applied: !overview.synthetic_time,
        monotonic: true,
        expected_spacing_secs: expected,
        gaps: Vec::new(),
        source_time_regressions: overview.source_time_regressions,
        dropped_rows: overview.dropped_rows,
    };
    if overview.synthetic_time {
        return check;
    }

    check.monotonic = overview.source_time_regressions == 0;
    let limit = expected * (1.0 + GAP_TOLERANCE);
    for pair in overview.buckets.windows(2) {
        let spacing = pair[1].start_time - pair[0].start_time;
        if spacing < 0.0 {
            check.monotonic = false;
        }
        if spacing > limit {
            check.gaps.push(TimestampGap {
                after_bucket: pair[0].index,
                before_bucket: pair[1].index,
                spacing_secs: spacing,
            });
        }
    }
    check
}

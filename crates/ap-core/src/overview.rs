//! Time-bucket aggregator.
//!
//! Groups the rows of a measurement into fixed-width buckets of `1 / hz`
//! seconds and reduces every configured signal with every configured
//! aggregator. Buckets without rows are not emitted.

use ap_common::{Error, Result};
use ap_config::OverviewConfig;
use ap_telemetry::{Bucket, OverviewTable, MAX_BUCKET_INDEX};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::debug;

use crate::rows::{Column, RowSource};

/// Distance to an integer below which `t · hz` snaps to it.
const INDEX_SNAP_TOLERANCE: f64 = 1e-9;

/// Naive layouts accepted for text timestamps, read as UTC.
const NAIVE_TIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Bucket index of time `t`: `floor(t · hz)`, snapped to the nearest integer
/// when float error puts the product just below it (`0.29 · 100`).
///
/// `None` when `t · hz` is not finite or its magnitude exceeds
/// [`MAX_BUCKET_INDEX`].
pub fn bucket_index(t: f64, hz: f64) -> Option<i64> {
    let x = t * hz;
    if !x.is_finite() || x.abs() > MAX_BUCKET_INDEX as f64 {
        return None;
    }
    let nearest = x.round();
    if (x - nearest).abs() <= INDEX_SNAP_TOLERANCE {
        Some(nearest as i64)
    } else {
        Some(x.floor() as i64)
    }
}

/// Seconds since the Unix epoch of an RFC 3339 timestamp, or of a naive
/// ISO-8601 date or date-time taken as UTC.
pub fn parse_timestamp(text: &str) -> Option<f64> {
    let text = text.trim();
    let utc = DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NAIVE_TIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .or_else(|| {
                    NaiveDate::parse_from_str(text, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                })
                .map(|naive| naive.and_utc())
        })?;
    Some(utc.timestamp() as f64 + f64::from(utc.timestamp_subsec_nanos()) * 1e-9)
}

/// Where each row's time value comes from.
#[derive(Clone, Copy)]
enum TimeBase<'a> {
    /// Row index as seconds.
    Synthetic,
    Numeric(&'a [Option<f64>]),
    Text(&'a [Option<String>]),
}

impl TimeBase<'_> {
    /// Finite time of `row`, or `None` when the row must be dropped.
    fn at(self, row: usize) -> Option<f64> {
        let t = match self {
            TimeBase::Synthetic => Some(row as f64),
            TimeBase::Numeric(values) => values.get(row).copied().flatten(),
            TimeBase::Text(values) => values.get(row)?.as_deref().and_then(parse_timestamp),
        };
        t.filter(|t| t.is_finite())
    }
}

/// Build the overview of `rows` for `cfg`.
///
/// The config is normalized first, so the table's signal and aggregator
/// order is canonical regardless of how the config listed them. A text time
/// column is parsed as timestamps; rows whose time is missing or unparseable
/// are dropped and counted.
pub fn aggregate(rows: &dyn RowSource, cfg: &OverviewConfig) -> Result<OverviewTable> {
    let cfg = cfg.normalized()?;
    let n = rows.row_count();
    if n == 0 {
        return Err(Error::EmptyInput);
    }

    let time_base = match cfg.time_col.as_deref().and_then(|name| rows.column(name)) {
        Some(Column::Numeric(values)) => TimeBase::Numeric(values),
        Some(Column::Text(values)) => TimeBase::Text(values),
        None => TimeBase::Synthetic,
    };
    let synthetic_time = matches!(time_base, TimeBase::Synthetic);

    let signals = resolve_signals(rows, &cfg, synthetic_time)?;
    let signal_columns: Vec<&[Option<f64>]> = signals
        .iter()
        .map(|name| {
            rows.column(name)
                .and_then(|c| c.as_numeric())
                .ok_or_else(|| Error::UnknownSignal {
                    signal: name.clone(),
                })
        })
        .collect::<Result<_>>()?;

    // (bucket index, row) for every row with a usable time value
    let mut keyed: Vec<(i64, usize)> = Vec::with_capacity(n);
    let mut dropped_rows = 0u64;
    let mut source_time_regressions = 0u64;
    let mut previous: Option<f64> = None;
    for row in 0..n {
        let Some(t) = time_base.at(row) else {
            dropped_rows += 1;
            continue;
        };
        if matches!(previous, Some(p) if t < p) {
            source_time_regressions += 1;
        }
        previous = Some(t);
        let index = bucket_index(t, cfg.hz).ok_or_else(|| {
            Error::Config(format!(
                "time value {} at row {} is out of range at {} Hz",
                t, row, cfg.hz
            ))
        })?;
        keyed.push((index, row));
    }
    if keyed.is_empty() {
        return Err(Error::EmptyInput);
    }
    keyed.sort_unstable();

    let mut buckets = Vec::new();
    let mut scratch: Vec<Option<f64>> = Vec::new();
    let mut start = 0;
    while start < keyed.len() {
        let index = keyed[start].0;
        let end = start + keyed[start..].iter().take_while(|(i, _)| *i == index).count();
        let group = &keyed[start..end];
        start = end;
        let mut values = Vec::with_capacity(signals.len() * cfg.agg.len());
        for column in &signal_columns {
            scratch.clear();
            scratch.extend(group.iter().map(|&(_, row)| column[row]));
            values.extend(cfg.agg.iter().map(|agg| agg.apply(&scratch)));
        }
        buckets.push(Bucket {
            index,
            start_time: index as f64 / cfg.hz,
            end_time: (index + 1) as f64 / cfg.hz,
            row_count: group.len() as u64,
            values,
        });
    }

    debug!(
        rows = n,
        buckets = buckets.len(),
        signals = signals.len(),
        synthetic_time,
        dropped_rows,
        source_time_regressions,
        "aggregated overview"
    );

    Ok(OverviewTable {
        hz: cfg.hz,
        signals,
        aggs: cfg.agg,
        time_col: cfg.time_col,
        synthetic_time,
        dropped_rows,
        source_time_regressions,
        buckets,
    })
}

fn resolve_signals(
    rows: &dyn RowSource,
    cfg: &OverviewConfig,
    synthetic_time: bool,
) -> Result<Vec<String>> {
    if let Some(requested) = &cfg.signals {
        for name in requested {
            if !matches!(rows.column(name), Some(Column::Numeric(_))) {
                return Err(Error::UnknownSignal {
                    signal: name.clone(),
                });
            }
        }
        return Ok(requested.clone());
    }

    let time_col = if synthetic_time {
        None
    } else {
        cfg.time_col.as_deref()
    };
    let mut inferred: Vec<String> = rows
        .column_names()
        .into_iter()
        .filter(|name| Some(name.as_str()) != time_col)
        .filter(|name| matches!(rows.column(name), Some(Column::Numeric(_))))
        .collect();
    inferred.sort();
    Ok(inferred)
}

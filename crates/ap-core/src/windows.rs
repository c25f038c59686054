//! Anomaly window builder and ranker.
//!
//! An index is flagged when any signal flags it through any check. Flagged
//! ranges merge into windows (optionally bridging short unflagged gaps),
//! windows are scored by summed severity, ranked, and truncated. Everything
//! runs on index ranges, so a window may cover a long gap at no cost.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use ap_common::Result;
use ap_config::Pass1Config;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::quality::{merge_ranges, BucketRange, Flag, FlagKind, QualityReport};

/// One signal's share of a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contributor {
    pub signal: String,
    /// Sum of this signal's severities over the window.
    pub severity: f64,
    pub flatline_buckets: u64,
    pub missing_buckets: u64,
    pub spike_buckets: u64,
}

impl Contributor {
    fn new(signal: &str) -> Self {
        Contributor {
            signal: signal.to_string(),
            severity: 0.0,
            flatline_buckets: 0,
            missing_buckets: 0,
            spike_buckets: 0,
        }
    }

    fn add(&mut self, flag: &Flag) {
        let n = flag.range.len();
        self.severity += n as f64 * flag.severity;
        match flag.kind {
            FlagKind::Flatline => self.flatline_buckets += n,
            FlagKind::Missing => self.missing_buckets += n,
            FlagKind::Spike => self.spike_buckets += n,
        }
    }
}

/// Ranked region of flagged buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyWindow {
    pub start_bucket: i64,
    /// Inclusive.
    pub end_bucket: i64,
    pub start_time: f64,
    pub end_time: f64,
    pub duration_buckets: u64,
    pub score: f64,
    /// Top contributors, highest severity first.
    pub contributing_signals: Vec<Contributor>,
}

/// Total order used for ranking: score descending, then earlier start, then
/// wider span.
pub fn rank_order(a: &AnomalyWindow, b: &AnomalyWindow) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then(a.start_bucket.cmp(&b.start_bucket))
        .then(b.duration_buckets.cmp(&a.duration_buckets))
}

fn contributor_order(a: &Contributor, b: &Contributor) -> Ordering {
    b.severity
        .total_cmp(&a.severity)
        .then_with(|| a.signal.cmp(&b.signal))
}

/// Build, score and rank the windows of a quality report.
pub fn build_windows(report: &QualityReport, hz: f64, cfg: &Pass1Config) -> Result<Vec<AnomalyWindow>> {
    let cfg = cfg.normalized()?;
    if report.first_bucket.is_none() {
        return Ok(Vec::new());
    }

    let per_signal: Vec<(&str, Vec<Flag>)> = report
        .metrics
        .iter()
        .map(|(name, metric)| (name.as_str(), metric.flags(&report.bucket_indices, &cfg)))
        .collect();
    let flagged = merge_ranges(
        per_signal
            .iter()
            .flat_map(|(_, flags)| flags.iter().map(|f| f.range))
            .collect(),
        0,
    );
    let spans = merge_ranges(flagged.clone(), cfg.merge_gap_buckets as u64);

    // each flag lies inside exactly one span
    let mut shares: Vec<BTreeMap<&str, Contributor>> = vec![BTreeMap::new(); spans.len()];
    for (name, flags) in &per_signal {
        for flag in flags {
            let at = spans.partition_point(|span| span.end < flag.range.start);
            if let Some(share) = shares.get_mut(at) {
                share
                    .entry(*name)
                    .or_insert_with(|| Contributor::new(name))
                    .add(flag);
            }
        }
    }

    let mut windows: Vec<AnomalyWindow> = spans
        .iter()
        .zip(shares)
        .map(|(span, share)| {
            let mut contributors: Vec<Contributor> = share.into_values().collect();
            let score: f64 = contributors.iter().map(|c| c.severity).sum();
            contributors.sort_by(contributor_order);
            contributors.truncate(cfg.top_n_signals);
            AnomalyWindow {
                start_bucket: span.start,
                end_bucket: span.end,
                start_time: span.start as f64 / hz,
                end_time: (span.end + 1) as f64 / hz,
                duration_buckets: span.len(),
                score,
                contributing_signals: contributors,
            }
        })
        .collect();

    let candidates = windows.len();
    windows.sort_by(rank_order);
    windows.truncate(cfg.top_k_windows);

    debug!(
        flagged_buckets = flagged.iter().map(BucketRange::len).sum::<u64>(),
        candidates,
        retained = windows.len(),
        "ranked anomaly windows"
    );
    Ok(windows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::{QcMetric, TimestampCheck};
    use std::collections::BTreeMap;

    fn metric(signal: &str, span: usize) -> QcMetric {
        QcMetric {
            signal: signal.to_string(),
            missing_rate: 0.0,
            missing_rate_flagged: false,
            missing_runs: Vec::new(),
            flatline_runs: Vec::new(),
            spike_scores: vec![0.0; span],
            spike_max: 0.0,
            spike_scale: None,
            flagged_buckets: 0,
        }
    }

    /// Contiguous buckets `first .. first + span`.
    fn report(first: i64, span: usize, metrics: Vec<QcMetric>) -> QualityReport {
        QualityReport {
            first_bucket: Some(first),
            bucket_count: span as u64,
            bucket_indices: (first..first + span as i64).collect(),
            metrics: metrics
                .into_iter()
                .map(|m| (m.signal.clone(), m))
                .collect::<BTreeMap<_, _>>(),
            timestamp: TimestampCheck {
                applied: true,
                monotonic: true,
                expected_spacing_secs: 1.0,
                gaps: Vec::new(),
                source_time_regressions: 0,
                dropped_rows: 0,
            },
        }
    }

    #[test]
    fn test_windows_ranked_by_score_then_start() {
        let mut a = metric("a", 40);
        a.flatline_runs = vec![BucketRange { start: 110, end: 119 }];
        let mut b = metric("b", 40);
        // spike severity 100 / 5 capped at 10, ties with the flatline window
        b.spike_scores[5] = 100.0;
        b.spike_scores[30] = 6.0;

        let windows = build_windows(&report(100, 40, vec![a, b]), 1.0, &Pass1Config::default()).unwrap();
        assert_eq!(windows.len(), 3);
        assert_eq!((windows[0].start_bucket, windows[0].end_bucket), (105, 105));
        assert_eq!(windows[0].score, 10.0);
        assert_eq!((windows[1].start_bucket, windows[1].end_bucket), (110, 119));
        assert_eq!(windows[1].score, 10.0);
        assert_eq!(windows[1].duration_buckets, 10);
        assert_eq!(windows[1].start_time, 110.0);
        assert_eq!(windows[1].end_time, 120.0);
        assert_eq!(windows[2].start_bucket, 130);
        assert!((windows[2].score - 1.2).abs() < 1e-12);
        for pair in windows.windows(2) {
            assert_ne!(rank_order(&pair[0], &pair[1]), Ordering::Greater);
        }
    }

    #[test]
    fn test_union_across_signals_and_contributor_order() {
        let mut a = metric("a", 20);
        a.flatline_runs = vec![BucketRange { start: 2, end: 6 }];
        let mut b = metric("b", 20);
        b.flatline_runs = vec![BucketRange { start: 5, end: 9 }];
        let mut c = metric("c", 20);
        c.missing_rate = 0.5;
        c.missing_rate_flagged = true;
        c.missing_runs = vec![BucketRange { start: 6, end: 6 }];

        let cfg = Pass1Config {
            top_n_signals: 2,
            ..Pass1Config::default()
        };
        let windows = build_windows(&report(0, 20, vec![c, b, a]), 1.0, &cfg).unwrap();
        assert_eq!(windows.len(), 1);
        let w = &windows[0];
        assert_eq!((w.start_bucket, w.end_bucket), (2, 9));
        assert_eq!(w.score, 11.0);
        let names: Vec<&str> = w.contributing_signals.iter().map(|c| c.signal.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(w.contributing_signals[0].flatline_buckets, 5);
    }

    #[test]
    fn test_merge_gap_bridges_unflagged_buckets() {
        let mut a = metric("a", 20);
        a.flatline_runs = vec![
            BucketRange { start: 0, end: 3 },
            BucketRange { start: 6, end: 8 },
        ];
        let strict = build_windows(&report(0, 20, vec![a.clone()]), 1.0, &Pass1Config::default()).unwrap();
        assert_eq!(strict.len(), 2);

        let cfg = Pass1Config {
            merge_gap_buckets: 2,
            ..Pass1Config::default()
        };
        let bridged = build_windows(&report(0, 20, vec![a]), 1.0, &cfg).unwrap();
        assert_eq!(bridged.len(), 1);
        assert_eq!((bridged[0].start_bucket, bridged[0].end_bucket), (0, 8));
        assert_eq!(bridged[0].score, 7.0);
    }

    #[test]
    fn test_unflagged_missing_not_counted_and_top_k() {
        let mut a = metric("a", 50);
        a.missing_rate = 0.02;
        a.missing_runs = vec![BucketRange { start: 10, end: 10 }];
        for pos in [1, 11, 21, 31, 41] {
            a.spike_scores[pos] = 5.0 + pos as f64 / 10.0;
        }
        let cfg = Pass1Config {
            top_k_windows: 2,
            ..Pass1Config::default()
        };
        let windows = build_windows(&report(0, 50, vec![a]), 2.0, &cfg).unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].start_bucket, 41);
        assert_eq!(windows[1].start_bucket, 31);
        assert_eq!(windows[0].end_time, 21.0);
        assert!(windows.iter().all(|w| w.contributing_signals[0].missing_buckets == 0));
    }

    #[test]
    fn test_window_over_a_long_gap_is_scored_by_range() {
        let far = 1_i64 << 45;
        let mut a = metric("a", 2);
        a.missing_rate = 1.0;
        a.missing_rate_flagged = true;
        a.missing_runs = vec![BucketRange { start: 1, end: far - 1 }];
        a.spike_scores = vec![0.0, 6.0];
        let mut r = report(0, 2, vec![a]);
        r.bucket_indices = vec![0, far];
        r.bucket_count = (far + 1) as u64;

        let windows = build_windows(&r, 1.0, &Pass1Config::default()).unwrap();
        assert_eq!(windows.len(), 1);
        let w = &windows[0];
        assert_eq!((w.start_bucket, w.end_bucket), (1, far));
        assert_eq!(w.duration_buckets, far as u64);
        assert_eq!(w.contributing_signals[0].missing_buckets, (far - 1) as u64);
        assert_eq!(w.contributing_signals[0].spike_buckets, 1);
        assert_eq!(w.score, (far - 1) as f64 + 1.2);
    }

    #[test]
    fn test_empty_overview_has_no_windows() {
        let mut r = report(0, 0, Vec::new());
        r.first_bucket = None;
        assert!(build_windows(&r, 1.0, &Pass1Config::default()).unwrap().is_empty());
    }
}

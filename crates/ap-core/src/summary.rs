//! Compact text rendering of a pass-1 document.
//!
//! Output depends only on the document and floats use fixed precision, so
//! the same document always renders to the same bytes.

use std::fmt::Write;

use crate::autopsy::AutopsyResultPass1;
use crate::quality::TimestampCheck;
use crate::windows::Contributor;

fn timestamp_line(check: &TimestampCheck) -> String {
    if !check.applied {
        return "synthetic (row index), not checked".to_string();
    }
    let mut line = if check.monotonic {
        "monotonic".to_string()
    } else {
        format!(
            "NOT monotonic ({} source regressions)",
            check.source_time_regressions
        )
    };
    let _ = write!(line, ", {} gaps", check.gaps.len());
    if check.dropped_rows > 0 {
        let _ = write!(line, ", {} rows without time", check.dropped_rows);
    }
    line
}

fn contributor_label(c: &Contributor) -> String {
    let mut kinds = Vec::new();
    if c.flatline_buckets > 0 {
        kinds.push(format!("flatline {}", c.flatline_buckets));
    }
    if c.spike_buckets > 0 {
        kinds.push(format!("spike {}", c.spike_buckets));
    }
    if c.missing_buckets > 0 {
        kinds.push(format!("missing {}", c.missing_buckets));
    }
    format!("{} {:.3} [{}]", c.signal, c.severity, kinds.join(", "))
}

/// Render the summary text, newline-terminated.
pub fn render(result: &AutopsyResultPass1) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "measurement autopsy pass-1");
    let _ = writeln!(out, "measurement: {}", result.measurement_id);
    let _ = writeln!(out, "key: {}", result.key);
    let _ = writeln!(
        out,
        "hz: {:.3}  buckets: {}  first: {}",
        result.hz,
        result.bucket_count,
        result
            .first_bucket
            .map_or_else(|| "-".to_string(), |b| b.to_string())
    );
    let _ = writeln!(out, "timestamps: {}", timestamp_line(&result.timestamp_check));

    let _ = writeln!(
        out,
        "\nwindows ({} of top {}):",
        result.windows.len(),
        result.pass1_cfg.top_k_windows
    );
    if result.windows.is_empty() {
        let _ = writeln!(out, "  none");
    }
    for (rank, w) in result.windows.iter().enumerate() {
        let contributors: Vec<String> = w.contributing_signals.iter().map(contributor_label).collect();
        let _ = writeln!(
            out,
            "  #{:<2} buckets {}..{}  t={:.3}..{:.3}s  score={:.3}  {}",
            rank + 1,
            w.start_bucket,
            w.end_bucket,
            w.start_time,
            w.end_time,
            w.score,
            contributors.join("; ")
        );
    }

    let name_width = result.qc.keys().map(String::len).max().unwrap_or(6).max(6);
    let _ = writeln!(out, "\nsignals:");
    let _ = writeln!(
        out,
        "  {:<width$}  {:>8}  {:>8}  {:>9}  {:>7}",
        "signal",
        "missing",
        "flatline",
        "spike_max",
        "flagged",
        width = name_width
    );
    for metric in result.qc.values() {
        let _ = writeln!(
            out,
            "  {:<width$}  {:>8.3}  {:>8}  {:>9.3}  {:>7}",
            metric.signal,
            metric.missing_rate,
            metric.flatline_runs.len(),
            metric.spike_max,
            metric.flagged_buckets,
            width = name_width
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::{BucketRange, QcMetric};
    use crate::windows::AnomalyWindow;
    use ap_common::{ConfigKey, MeasurementId, SCHEMA_VERSION};
    use ap_config::{OverviewConfig, Pass1Config};
    use std::collections::BTreeMap;

    fn result() -> AutopsyResultPass1 {
        let mut qc = BTreeMap::new();
        qc.insert(
            "speed".to_string(),
            QcMetric {
                signal: "speed".into(),
                missing_rate: 0.25,
                missing_rate_flagged: true,
                missing_runs: vec![BucketRange { start: 3, end: 3 }],
                flatline_runs: Vec::new(),
                spike_scores: vec![0.0; 4],
                spike_max: 1.0 / 3.0,
                spike_scale: None,
                flagged_buckets: 1,
            },
        );
        AutopsyResultPass1 {
            schema_version: SCHEMA_VERSION.to_string(),
            measurement_id: MeasurementId::parse("drive_7").unwrap(),
            key: ConfigKey::from_digest(&[0x11; 32]),
            overview_key: ConfigKey::from_digest(&[0x22; 32]),
            overview_cfg: OverviewConfig::default(),
            pass1_cfg: Pass1Config::default(),
            hz: 1.0,
            synthetic_time: false,
            first_bucket: Some(0),
            bucket_count: 4,
            bucket_indices: vec![0, 1, 2, 3],
            windows: vec![AnomalyWindow {
                start_bucket: 3,
                end_bucket: 3,
                start_time: 3.0,
                end_time: 4.0,
                duration_buckets: 1,
                score: 1.0,
                contributing_signals: vec![Contributor {
                    signal: "speed".into(),
                    severity: 1.0,
                    flatline_buckets: 0,
                    missing_buckets: 1,
                    spike_buckets: 0,
                }],
            }],
            qc,
            timestamp_check: TimestampCheck {
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
    fn test_render_contents() {
        let text = render(&result());
        assert!(text.starts_with("measurement autopsy pass-1\nmeasurement: drive_7\n"));
        assert!(text.contains(&format!("key: {}", "11".repeat(32))));
        assert!(text.contains("timestamps: monotonic, 0 gaps\n"));
        assert!(text.contains("#1  buckets 3..3  t=3.000..4.000s  score=1.000  speed 1.000 [missing 1]"));
        assert!(text.contains("  speed      0.250         0      0.333        1\n"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_render_is_deterministic() {
        assert_eq!(render(&result()), render(&result().clone()));
    }

    #[test]
    fn test_render_without_windows() {
        let mut r = result();
        r.windows.clear();
        r.timestamp_check.applied = false;
        let text = render(&r);
        assert!(text.contains("windows (0 of top 10):\n  none\n"));
        assert!(text.contains("timestamps: synthetic (row index), not checked\n"));
    }
}

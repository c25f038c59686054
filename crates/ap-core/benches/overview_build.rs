//! Criterion benchmarks for the overview aggregator and the pass-1 engines
//! on a synthetic day-long measurement.

use ap_config::{OverviewConfig, Pass1Config};
use ap_core::{aggregate, analyze, build_windows, MemoryRows};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn synthetic_rows(seconds: usize, rate: usize) -> MemoryRows {
    let n = seconds * rate;
    let times = (0..n).map(|i| Some(i as f64 / rate as f64)).collect();
    let speed = (0..n)
        .map(|i| Some(((i as u64).wrapping_mul(2_654_435_761) % 1000) as f64 / 10.0))
        .collect();
    let temp = (0..n)
        .map(|i| if i % 500 == 0 { None } else { Some(20.0 + (i / 1000) as f64 * 0.1) })
        .collect();
    MemoryRows::default()
        .with_numeric("timestamp", times)
        .and_then(|r| r.with_numeric("speed", speed))
        .and_then(|r| r.with_numeric("temp", temp))
        .expect("synthetic rows")
}

fn bench_aggregate(c: &mut Criterion) {
    let rows = synthetic_rows(3_600, 10);
    let mut group = c.benchmark_group("aggregate_hour_at_10hz");
    for hz in [0.1, 1.0, 10.0] {
        let cfg = OverviewConfig::for_signals(["speed", "temp"], hz);
        group.bench_with_input(BenchmarkId::from_parameter(hz), &cfg, |b, cfg| {
            b.iter(|| aggregate(black_box(&rows), black_box(cfg)).expect("aggregate"))
        });
    }
    group.finish();
}

fn bench_pass1(c: &mut Criterion) {
    let rows = synthetic_rows(86_400, 1);
    let table = aggregate(&rows, &OverviewConfig::for_signals(["speed", "temp"], 1.0))
        .expect("aggregate");
    let cfg = Pass1Config::default();
    c.bench_function("pass1_day_at_1hz", |b| {
        b.iter(|| {
            let report = analyze(black_box(&table), &cfg).expect("analyze");
            build_windows(&report, table.hz, &cfg).expect("windows")
        })
    });
}

criterion_group!(benches, bench_aggregate, bench_pass1);
criterion_main!(benches);

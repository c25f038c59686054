//! Cache discipline: key sensitivity, corruption, missing prerequisites and
//! concurrent first builds.

use std::sync::{Arc, Barrier};
use std::thread;

use ap_common::{AggFunc, ArtifactKind, Error, MeasurementId};
use ap_config::{overview_key, OverviewConfig, Pass1Config};
use ap_core::{build_overview, load_overview, run_autopsy_pass1, CacheStore, ConfigOrKey, MemoryRows};
use tempfile::TempDir;

fn rows() -> MemoryRows {
    let mut rows = MemoryRows::new(["timestamp", "x", "y"]).unwrap();
    for i in 0..120 {
        let t = i as f64 * 0.5;
        rows.push_row([t, (i % 7) as f64, (i % 5) as f64 * 2.0]).unwrap();
    }
    rows
}

fn mid() -> MeasurementId {
    MeasurementId::parse("bench-42").unwrap()
}

#[test]
fn key_and_path_change_with_every_overview_field() {
    let dir = TempDir::new().unwrap();
    let store = CacheStore::new(dir.path());
    let base = OverviewConfig::for_signals(["x", "y"], 1.0);
    let variants = [
        base.clone(),
        OverviewConfig { hz: 2.0, ..base.clone() },
        OverviewConfig::for_signals(["x"], 1.0),
        base.clone().with_agg([AggFunc::Min, AggFunc::Mean, AggFunc::Max, AggFunc::Std]),
        base.clone().with_time_col(None),
    ];

    let mut paths = Vec::new();
    for cfg in &variants {
        let handle = build_overview(&store, &mid(), &rows(), cfg).unwrap();
        assert!(!handle.cache_hit);
        paths.push(handle.path);
    }
    for (i, a) in paths.iter().enumerate() {
        for b in &paths[i + 1..] {
            assert_ne!(a, b);
        }
    }

    // equivalent spellings reuse the first artifact
    let same = OverviewConfig {
        signals: Some(vec!["y".into(), "x".into(), "x".into()]),
        hz: 1.0,
        agg: vec![AggFunc::Max, AggFunc::Min, AggFunc::Mean],
        ..OverviewConfig::default()
    };
    let handle = build_overview(&store, &mid(), &rows(), &same).unwrap();
    assert!(handle.cache_hit);
    assert_eq!(handle.path, paths[0]);
}

#[test]
fn corrupted_overview_is_reported_not_rebuilt() {
    let dir = TempDir::new().unwrap();
    let store = CacheStore::new(dir.path());
    let cfg = OverviewConfig::for_signals(["x"], 1.0);
    let handle = build_overview(&store, &mid(), &rows(), &cfg).unwrap();

    std::fs::write(&handle.path, b"PAR1 but not really").unwrap();

    let err = load_overview(&store, &mid(), &ConfigOrKey::from(cfg.clone())).unwrap_err();
    assert!(matches!(err, Error::CacheCorruption { ref path, .. } if *path == handle.path));
    assert_eq!(err.code(), 40);

    let err = build_overview(&store, &mid(), &rows(), &cfg).unwrap_err();
    assert!(matches!(err, Error::CacheCorruption { .. }));
    // the damaged file is left for inspection
    assert_eq!(std::fs::read(&handle.path).unwrap(), b"PAR1 but not really");
}

#[test]
fn corrupted_pass1_document_is_reported() {
    let dir = TempDir::new().unwrap();
    let store = CacheStore::new(dir.path());
    let cfg = OverviewConfig::for_signals(["x", "y"], 1.0);
    build_overview(&store, &mid(), &rows(), &cfg).unwrap();
    let outcome = run_autopsy_pass1(&store, &mid(), &cfg, &Pass1Config::default()).unwrap();

    std::fs::write(&outcome.path, b"{\"schema_version\": ").unwrap();
    let err = run_autopsy_pass1(&store, &mid(), &cfg, &Pass1Config::default()).unwrap_err();
    assert!(matches!(err, Error::CacheCorruption { .. }));
}

#[test]
fn pass1_requires_a_cached_overview() {
    let dir = TempDir::new().unwrap();
    let store = CacheStore::new(dir.path());
    let cfg = OverviewConfig::for_signals(["x"], 1.0);

    let err = run_autopsy_pass1(&store, &mid(), &cfg, &Pass1Config::default()).unwrap_err();
    match err {
        Error::OverviewNotBuilt { measurement_id, key } => {
            assert_eq!(measurement_id, "bench-42");
            assert_eq!(key, overview_key(&cfg).unwrap().to_string());
        }
        other => panic!("unexpected error: {other}"),
    }

    // nothing was published for the failed run
    let pass1_dir = dir
        .path()
        .join("artifacts")
        .join("bench-42")
        .join(ArtifactKind::AutopsyPass1.dir_name());
    let published = std::fs::read_dir(&pass1_dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
                .count()
        })
        .unwrap_or(0);
    assert_eq!(published, 0);
}

#[test]
fn pass1_key_depends_on_thresholds() {
    let dir = TempDir::new().unwrap();
    let store = CacheStore::new(dir.path());
    let cfg = OverviewConfig::for_signals(["x", "y"], 1.0);
    build_overview(&store, &mid(), &rows(), &cfg).unwrap();

    let a = run_autopsy_pass1(&store, &mid(), &cfg, &Pass1Config::default()).unwrap();
    let strict = Pass1Config {
        spike_mad_z: 3.0,
        ..Pass1Config::default()
    };
    let b = run_autopsy_pass1(&store, &mid(), &cfg, &strict).unwrap();
    assert!(!b.cache_hit);
    assert_ne!(a.path, b.path);
    assert_ne!(a.result.key, b.result.key);
    assert_eq!(a.result.overview_key, b.result.overview_key);
}

#[test]
fn invalid_config_is_rejected_before_touching_disk() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("never-created");
    let store = CacheStore::new(&root);
    let cfg = OverviewConfig::for_signals(["x"], 0.0);
    let err = build_overview(&store, &mid(), &rows(), &cfg).unwrap_err();
    assert!(err.is_config());
    assert!(!root.exists());

    let unknown = OverviewConfig::for_signals(["nope"], 1.0);
    let err = build_overview(&store, &mid(), &rows(), &unknown).unwrap_err();
    assert!(matches!(err, Error::UnknownSignal { .. }));
    assert!(load_overview(&store, &mid(), &ConfigOrKey::from(unknown))
        .unwrap()
        .into_option()
        .is_none());
}

#[test]
fn concurrent_first_builds_produce_one_miss() {
    let dir = TempDir::new().unwrap();
    let store = CacheStore::new(dir.path());
    let cfg = OverviewConfig::for_signals(["x", "y"], 4.0);
    let threads = 4;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let store = store.clone();
            let cfg = cfg.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let rows = rows();
                barrier.wait();
                build_overview(&store, &mid(), &rows, &cfg).unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let misses = results.iter().filter(|h| !h.cache_hit).count();
    assert_eq!(misses, 1);
    assert!(results.windows(2).all(|w| w[0].path == w[1].path));
}

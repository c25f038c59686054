//! Boundary operations: build and load the cached overview and pass-1
//! artifacts of a measurement.
//!
//! These are the only functions besides [`crate::store`] that touch the
//! filesystem. Every one takes the store explicitly so callers (and tests)
//! own their cache root.

use std::collections::BTreeMap;
use std::path::PathBuf;

use ap_common::{ArtifactKind, ConfigKey, Error, MeasurementId, Result, SCHEMA_VERSION};
use ap_config::{overview_key, pass1_key, AutopsyConfig, OverviewConfig, Pass1Config};
use ap_telemetry::OverviewTable;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::overview::aggregate;
use crate::quality::{analyze, QcMetric, TimestampCheck};
use crate::rows::RowSource;
use crate::store::{Artifact, CacheLookup, CacheStore};
use crate::summary;
use crate::windows::{build_windows, AnomalyWindow};

/// A config whose artifact key can be derived.
pub trait KeyedConfig {
    fn config_key(&self) -> Result<ConfigKey>;
}

impl KeyedConfig for OverviewConfig {
    fn config_key(&self) -> Result<ConfigKey> {
        overview_key(self)
    }
}

impl KeyedConfig for AutopsyConfig {
    fn config_key(&self) -> Result<ConfigKey> {
        pass1_key(&self.overview, &self.pass1)
    }
}

/// Address of a cached artifact: either the config that produced it or its
/// key.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigOrKey<C> {
    Config(C),
    Key(ConfigKey),
}

impl<C: KeyedConfig> ConfigOrKey<C> {
    pub fn key(&self) -> Result<ConfigKey> {
        match self {
            ConfigOrKey::Config(cfg) => cfg.config_key(),
            ConfigOrKey::Key(key) => Ok(key.clone()),
        }
    }
}

impl<C> From<ConfigKey> for ConfigOrKey<C> {
    fn from(key: ConfigKey) -> Self {
        ConfigOrKey::Key(key)
    }
}

impl From<OverviewConfig> for ConfigOrKey<OverviewConfig> {
    fn from(cfg: OverviewConfig) -> Self {
        ConfigOrKey::Config(cfg)
    }
}

impl From<AutopsyConfig> for ConfigOrKey<AutopsyConfig> {
    fn from(cfg: AutopsyConfig) -> Self {
        ConfigOrKey::Config(cfg)
    }
}

/// Handle to a built or retrieved overview artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct OverviewHandle {
    pub path: PathBuf,
    pub key: ConfigKey,
    pub cache_hit: bool,
    /// Normalized config the overview was built with.
    pub config: OverviewConfig,
    pub bucket_count: usize,
}

/// Pass-1 autopsy document.
///
/// A pure function of the overview and the pass-1 config: it carries no
/// wall-clock fields, and cache status is reported beside it in
/// [`Pass1Outcome`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutopsyResultPass1 {
    pub schema_version: String,
    pub measurement_id: MeasurementId,
    /// Pass-1 key.
    pub key: ConfigKey,
    pub overview_key: ConfigKey,
    pub overview_cfg: OverviewConfig,
    pub pass1_cfg: Pass1Config,
    pub hz: f64,
    pub synthetic_time: bool,
    pub first_bucket: Option<i64>,
    /// Indices in `first ..= last`, gaps included.
    pub bucket_count: u64,
    /// Emitted bucket indices; every `spike_scores` series in `qc` is
    /// aligned with them.
    pub bucket_indices: Vec<i64>,
    pub windows: Vec<AnomalyWindow>,
    pub qc: BTreeMap<String, QcMetric>,
    pub timestamp_check: TimestampCheck,
}

impl Artifact for AutopsyResultPass1 {
    const KIND: ArtifactKind = ArtifactKind::AutopsyPass1;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn decode(bytes: Vec<u8>) -> Result<Self> {
        let result: AutopsyResultPass1 = serde_json::from_slice(&bytes)?;
        if !ap_common::schema::is_compatible(&result.schema_version) {
            return Err(Error::Artifact(format!(
                "incompatible pass-1 schema version {} (reader {})",
                result.schema_version, SCHEMA_VERSION
            )));
        }
        Ok(result)
    }
}

/// Result of [`run_autopsy_pass1`].
#[derive(Debug, Clone, PartialEq)]
pub struct Pass1Outcome {
    pub result: AutopsyResultPass1,
    pub cache_hit: bool,
    pub path: PathBuf,
    pub summary_path: PathBuf,
}

fn ensure_codec() -> Result<()> {
    if ap_telemetry::is_available() {
        Ok(())
    } else {
        Err(Error::MissingDependency("parquet".to_string()))
    }
}

/// Build (or retrieve) the overview of `rows` for `cfg`.
pub fn build_overview(
    store: &CacheStore,
    measurement_id: &MeasurementId,
    rows: &dyn RowSource,
    cfg: &OverviewConfig,
) -> Result<OverviewHandle> {
    ensure_codec()?;
    let config = cfg.normalized()?;
    let key = overview_key(&config)?;

    let cached = store.get_or_build(measurement_id, &key, || aggregate(rows, &config))?;
    info!(
        measurement_id = %measurement_id,
        key = key.short(),
        kind = %ArtifactKind::Overview,
        cache_hit = cached.cache_hit,
        buckets = cached.value.buckets.len(),
        "overview ready"
    );
    Ok(OverviewHandle {
        path: cached.path,
        key,
        cache_hit: cached.cache_hit,
        config,
        bucket_count: cached.value.buckets.len(),
    })
}

/// Retrieve a cached overview without building it.
pub fn load_overview(
    store: &CacheStore,
    measurement_id: &MeasurementId,
    config_or_key: &ConfigOrKey<OverviewConfig>,
) -> Result<CacheLookup<OverviewTable>> {
    ensure_codec()?;
    let key = config_or_key.key()?;
    let lookup = store.get::<OverviewTable>(measurement_id, &key)?;
    debug!(measurement_id = %measurement_id, key = key.short(), cache_hit = lookup.is_hit(), "overview lookup");
    Ok(lookup)
}

/// Run (or retrieve) the pass-1 autopsy of a measurement.
///
/// Reads only the cached overview built with `overview_cfg`; a missing
/// overview is `Error::OverviewNotBuilt`, never a rebuild from rows. The text
/// summary is written beside the JSON document.
pub fn run_autopsy_pass1(
    store: &CacheStore,
    measurement_id: &MeasurementId,
    overview_cfg: &OverviewConfig,
    pass1_cfg: &Pass1Config,
) -> Result<Pass1Outcome> {
    let overview_cfg = overview_cfg.normalized()?;
    let pass1_cfg = pass1_cfg.normalized()?;
    let okey = overview_key(&overview_cfg)?;
    let key = pass1_key(&overview_cfg, &pass1_cfg)?;

    let cached = store.get_or_build(measurement_id, &key, || {
        ensure_codec()?;
        let overview = match store.get::<OverviewTable>(measurement_id, &okey)? {
            CacheLookup::Hit(table) => table,
            CacheLookup::Miss => {
                return Err(Error::OverviewNotBuilt {
                    measurement_id: measurement_id.to_string(),
                    key: okey.to_string(),
                })
            }
        };
        let report = analyze(&overview, &pass1_cfg)?;
        let windows = build_windows(&report, overview.hz, &pass1_cfg)?;
        Ok(AutopsyResultPass1 {
            schema_version: SCHEMA_VERSION.to_string(),
            measurement_id: measurement_id.clone(),
            key: key.clone(),
            overview_key: okey.clone(),
            overview_cfg: overview_cfg.clone(),
            pass1_cfg: pass1_cfg.clone(),
            hz: overview.hz,
            synthetic_time: overview.synthetic_time,
            first_bucket: report.first_bucket,
            bucket_count: report.bucket_count,
            bucket_indices: report.bucket_indices,
            windows,
            qc: report.metrics,
            timestamp_check: report.timestamp,
        })
    })?;

    let summary_path = store.artifact_path(measurement_id, ArtifactKind::AutopsyPass1Summary, &key);
    if !cached.cache_hit || !summary_path.exists() {
        let text = summary::render(&cached.value);
        store.put_bytes(
            measurement_id,
            ArtifactKind::AutopsyPass1Summary,
            &key,
            text.as_bytes(),
        )?;
    }

    info!(
        measurement_id = %measurement_id,
        key = key.short(),
        kind = %ArtifactKind::AutopsyPass1,
        cache_hit = cached.cache_hit,
        windows = cached.value.windows.len(),
        "pass-1 autopsy ready"
    );
    Ok(Pass1Outcome {
        result: cached.value,
        cache_hit: cached.cache_hit,
        path: cached.path,
        summary_path,
    })
}

/// Retrieve a cached pass-1 document without computing it.
pub fn load_autopsy_pass1(
    store: &CacheStore,
    measurement_id: &MeasurementId,
    config_or_key: &ConfigOrKey<AutopsyConfig>,
) -> Result<CacheLookup<AutopsyResultPass1>> {
    let key = config_or_key.key()?;
    store.get::<AutopsyResultPass1>(measurement_id, &key)
}

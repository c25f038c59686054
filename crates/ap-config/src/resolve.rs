//! Config file loading and resolution.
//!
//! Resolution order for the autopsy config: explicit path → `AUTOPSY_CONFIG`
//! → built-in defaults. The cache root follows the same pattern with
//! `AUTOPSY_CACHE_DIR` and the platform cache directory.

use crate::overview::OverviewConfig;
use crate::pass1::Pass1Config;
use crate::{CACHE_DIR_ENV_VAR, CONFIG_ENV_VAR};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from loading a config file.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("unsupported config format for {0} (expected .json or .toml)")]
    UnsupportedFormat(PathBuf),

    #[error("invalid config in {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: ap_common::Error,
    },
}

impl From<ConfigFileError> for ap_common::Error {
    fn from(err: ConfigFileError) -> Self {
        match err {
            ConfigFileError::Invalid { source, .. } => source,
            other => ap_common::Error::Config(other.to_string()),
        }
    }
}

/// Complete autopsy configuration as stored in a config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutopsyConfig {
    pub overview: OverviewConfig,
    pub pass1: Pass1Config,
}

impl AutopsyConfig {
    pub fn validate(&self) -> ap_common::Result<()> {
        self.overview.validate()?;
        self.pass1.validate()
    }
}

/// Where a resolved config came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Explicit(PathBuf),
    Env(PathBuf),
    Defaults,
}

/// A resolved, validated config plus its provenance.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: AutopsyConfig,
    pub source: ConfigSource,
}

/// Load and validate a JSON or TOML config file.
pub fn load_config_file(path: &Path) -> Result<AutopsyConfig, ConfigFileError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let config: AutopsyConfig = match ext.as_deref() {
        Some("json") => serde_json::from_str(&content).map_err(|source| ConfigFileError::Json {
            path: path.to_path_buf(),
            source,
        })?,
        Some("toml") => toml::from_str(&content).map_err(|source| ConfigFileError::Toml {
            path: path.to_path_buf(),
            source,
        })?,
        _ => return Err(ConfigFileError::UnsupportedFormat(path.to_path_buf())),
    };

    config.validate().map_err(|source| ConfigFileError::Invalid {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(config)
}

/// Resolve the autopsy config: explicit path → `AUTOPSY_CONFIG` → defaults.
pub fn resolve_config(explicit: Option<&Path>) -> Result<ResolvedConfig, ConfigFileError> {
    resolve_config_with(explicit, |name| std::env::var_os(name).map(PathBuf::from))
}

fn resolve_config_with(
    explicit: Option<&Path>,
    env: impl Fn(&str) -> Option<PathBuf>,
) -> Result<ResolvedConfig, ConfigFileError> {
    if let Some(path) = explicit {
        return Ok(ResolvedConfig {
            config: load_config_file(path)?,
            source: ConfigSource::Explicit(path.to_path_buf()),
        });
    }
    if let Some(path) = env(CONFIG_ENV_VAR) {
        return Ok(ResolvedConfig {
            config: load_config_file(&path)?,
            source: ConfigSource::Env(path),
        });
    }
    Ok(ResolvedConfig {
        config: AutopsyConfig::default(),
        source: ConfigSource::Defaults,
    })
}

/// Resolve the cache root: explicit → `AUTOPSY_CACHE_DIR` → platform default.
pub fn resolve_cache_dir(explicit: Option<&Path>) -> PathBuf {
    resolve_cache_dir_with(explicit, |name| std::env::var_os(name).map(PathBuf::from))
}

fn resolve_cache_dir_with(
    explicit: Option<&Path>,
    env: impl Fn(&str) -> Option<PathBuf>,
) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| env(CACHE_DIR_ENV_VAR))
        .unwrap_or_else(default_cache_dir)
}

/// Get the default cache directory.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("measurement_autopsy")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ap_common::AggFunc;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<PathBuf> {
        None
    }

    #[test]
    fn test_defaults_when_nothing_configured() {
        let resolved = resolve_config_with(None, no_env).unwrap();
        assert_eq!(resolved.source, ConfigSource::Defaults);
        assert_eq!(resolved.config, AutopsyConfig::default());
    }

    #[test]
    fn test_load_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("autopsy.json");
        std::fs::write(
            &path,
            r#"{"overview": {"hz": 2, "agg": ["max", "min", "mean"]}, "pass1": {"top_k_windows": 2}}"#,
        )
        .unwrap();

        let cfg = load_config_file(&path).unwrap();
        assert_eq!(cfg.overview.hz, 2.0);
        assert_eq!(cfg.overview.agg.len(), 3);
        assert_eq!(cfg.pass1.top_k_windows, 2);
        assert_eq!(cfg.pass1.flatline_min_run, 10);
    }

    #[test]
    fn test_load_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("autopsy.toml");
        std::fs::write(
            &path,
            "[overview]\nsignals = [\"a\", \"b\"]\nhz = 0.5\nagg = [\"mean\"]\n\n[pass1]\nspike_mad_z = 3.5\n",
        )
        .unwrap();

        let cfg = load_config_file(&path).unwrap();
        assert_eq!(cfg.overview.signals, Some(vec!["a".into(), "b".into()]));
        assert_eq!(cfg.overview.agg, vec![AggFunc::Mean]);
        assert_eq!(cfg.pass1.spike_mad_z, 3.5);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"overview": {"hz": 0}}"#).unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigFileError::Invalid { .. }));
        let common: ap_common::Error = err.into();
        assert!(common.is_config());
    }

    #[test]
    fn test_unknown_aggregator_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"overview": {"agg": ["p99"]}}"#).unwrap();
        assert!(matches!(
            load_config_file(&path),
            Err(ConfigFileError::Json { .. })
        ));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("autopsy.yaml");
        std::fs::write(&path, "overview: {}").unwrap();
        assert!(matches!(
            load_config_file(&path),
            Err(ConfigFileError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_env_path_used_when_no_explicit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("env.json");
        std::fs::write(&path, r#"{"pass1": {"top_n_signals": 1}}"#).unwrap();

        let env_path = path.clone();
        let resolved = resolve_config_with(None, move |name| {
            (name == CONFIG_ENV_VAR).then(|| env_path.clone())
        })
        .unwrap();
        assert_eq!(resolved.source, ConfigSource::Env(path));
        assert_eq!(resolved.config.pass1.top_n_signals, 1);
    }

    #[test]
    fn test_cache_dir_precedence() {
        let explicit = PathBuf::from("/tmp/explicit");
        let from_env = |name: &str| (name == CACHE_DIR_ENV_VAR).then(|| PathBuf::from("/tmp/env"));

        assert_eq!(resolve_cache_dir_with(Some(&explicit), from_env), explicit);
        assert_eq!(resolve_cache_dir_with(None, from_env), PathBuf::from("/tmp/env"));
        assert_eq!(resolve_cache_dir_with(None, no_env), default_cache_dir());
        assert!(default_cache_dir()
            .to_string_lossy()
            .contains("measurement_autopsy"));
    }
}

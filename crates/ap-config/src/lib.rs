//! Measurement autopsy configuration loading, validation, and keying.
//!
//! This crate provides:
//! - Typed Rust structs for the overview and pass-1 configurations
//! - Semantic validation and normalization
//! - Deterministic config keys for content-addressed artifacts
//! - Config resolution (explicit path → env → defaults)

pub mod key;
pub mod overview;
pub mod pass1;
pub mod resolve;

pub use key::{overview_key, pass1_key};
pub use overview::OverviewConfig;
pub use pass1::Pass1Config;
pub use resolve::{
    default_cache_dir, load_config_file, resolve_cache_dir, resolve_config, AutopsyConfig,
    ConfigFileError, ConfigSource, ResolvedConfig,
};

/// Environment variable naming an autopsy config file.
pub const CONFIG_ENV_VAR: &str = "AUTOPSY_CONFIG";

/// Environment variable overriding the cache root directory.
pub const CACHE_DIR_ENV_VAR: &str = "AUTOPSY_CACHE_DIR";

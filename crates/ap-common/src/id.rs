//! Measurement and artifact identity types.
//!
//! Cached artifacts are addressed by (measurement, kind, config key). All three
//! end up as path components, so each type guarantees it is a single safe
//! component.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable handle for one measurement log.
///
/// Format: ASCII alphanumerics plus `_` and `-`, at most 128 characters.
/// Registered measurements use `m_<first 12 hex chars of the file fingerprint>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MeasurementId(String);

impl MeasurementId {
    const MAX_LEN: usize = 128;

    /// Parse and validate a measurement id.
    pub fn parse(s: &str) -> Result<Self> {
        let valid = !s.is_empty()
            && s.len() <= Self::MAX_LEN
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(MeasurementId(s.to_string()))
        } else {
            Err(Error::InvalidMeasurementId(s.to_string()))
        }
    }

    /// Derive the id of a registered measurement from its file fingerprint.
    pub fn from_fingerprint(fingerprint_hex: &str) -> Result<Self> {
        let prefix: String = fingerprint_hex.chars().take(12).collect();
        Self::parse(&format!("m_{}", prefix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MeasurementId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<MeasurementId> for String {
    fn from(id: MeasurementId) -> Self {
        id.0
    }
}

impl fmt::Display for MeasurementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic identity of a normalized configuration.
///
/// Lowercase hex SHA-256 digest (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConfigKey(String);

impl ConfigKey {
    pub const HEX_LEN: usize = 64;

    /// Parse a key previously produced by key derivation.
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() == Self::HEX_LEN && s.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')) {
            Ok(ConfigKey(s.to_string()))
        } else {
            Err(Error::Config(format!("malformed config key '{}'", s)))
        }
    }

    /// Key of a SHA-256 digest.
    pub fn from_digest(digest: &[u8; 32]) -> Self {
        ConfigKey(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for logs and summaries.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl TryFrom<String> for ConfigKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ConfigKey> for String {
    fn from(key: ConfigKey) -> Self {
        key.0
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of cached artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Downsampled bucket table (Parquet).
    Overview,
    /// Pass-1 autopsy document (JSON).
    AutopsyPass1,
    /// Compact text rendering of a pass-1 document, sibling of `AutopsyPass1`.
    AutopsyPass1Summary,
}

impl ArtifactKind {
    /// Directory name under the measurement's artifact directory.
    pub fn dir_name(self) -> &'static str {
        match self {
            ArtifactKind::Overview => "overview",
            ArtifactKind::AutopsyPass1 | ArtifactKind::AutopsyPass1Summary => "autopsy_pass1",
        }
    }

    /// File extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Overview => "parquet",
            ArtifactKind::AutopsyPass1 => "json",
            ArtifactKind::AutopsyPass1Summary => "txt",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Overview => write!(f, "overview"),
            ArtifactKind::AutopsyPass1 => write!(f, "autopsy_pass1"),
            ArtifactKind::AutopsyPass1Summary => write!(f, "autopsy_pass1_summary"),
        }
    }
}

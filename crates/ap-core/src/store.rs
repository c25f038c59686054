//! Content-addressed artifact cache and measurement registry.
//!
//! Layout under the cache root:
//!
//! ```text
//! <root>/artifacts/<measurement_id>/<kind dir>/<key>.<ext>
//! <root>/meta/<measurement_id>.json
//! ```
//!
//! Artifact paths are a pure function of (measurement, kind, key). Writes go
//! through a temporary file in the target directory followed by a rename, so
//! readers never observe a partial artifact. Concurrent first builds of the
//! same artifact serialize on an advisory lock next to it.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use ap_common::{ArtifactKind, ConfigKey, Error, MeasurementId, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

/// Bytes of file content hashed into a measurement fingerprint.
pub const DEFAULT_FINGERPRINT_HEAD_BYTES: usize = 2_000_000;

/// Result of a cache lookup. Cache status is always explicit, never inferred
/// from file timestamps.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    Hit(T),
    Miss,
}

impl<T> CacheLookup<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            CacheLookup::Hit(v) => Some(v),
            CacheLookup::Miss => None,
        }
    }
}

/// A value the store can persist under an [`ArtifactKind`].
pub trait Artifact: Sized {
    const KIND: ArtifactKind;

    fn encode(&self) -> Result<Vec<u8>>;

    /// Decode persisted bytes. `Error::Artifact` and `Error::Json` mean the
    /// bytes are damaged and are reported as cache corruption; any other
    /// error propagates unchanged.
    fn decode(bytes: Vec<u8>) -> Result<Self>;
}

impl Artifact for ap_telemetry::OverviewTable {
    const KIND: ArtifactKind = ArtifactKind::Overview;

    fn encode(&self) -> Result<Vec<u8>> {
        ap_telemetry::encode_overview(self).map_err(codec_error)
    }

    fn decode(bytes: Vec<u8>) -> Result<Self> {
        ap_telemetry::decode_overview(bytes).map_err(codec_error)
    }
}

fn codec_error(err: ap_telemetry::CodecError) -> Error {
    match err {
        ap_telemetry::CodecError::Unavailable(what) => Error::MissingDependency(what.to_string()),
        other => Error::Artifact(other.to_string()),
    }
}

/// Artifact returned by [`CacheStore::get_or_build`].
#[derive(Debug, Clone)]
pub struct Cached<T> {
    pub value: T,
    pub path: PathBuf,
    pub cache_hit: bool,
}

/// Registry entry of a measurement file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementMeta {
    pub measurement_id: MeasurementId,
    pub file_fingerprint: String,
    pub path: PathBuf,
    pub label: Option<String>,
    pub file_size_bytes: u64,
    /// Lowercase file extension, if any.
    pub format: Option<String>,
    pub registered_at: DateTime<Utc>,
}

/// Filesystem cache rooted at one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store at the resolved cache root (`AUTOPSY_CACHE_DIR`, else the user
    /// cache directory).
    pub fn from_env() -> Self {
        Self::new(ap_config::resolve_cache_dir(None))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic path of an artifact.
    pub fn artifact_path(&self, id: &MeasurementId, kind: ArtifactKind, key: &ConfigKey) -> PathBuf {
        self.root
            .join("artifacts")
            .join(id.as_str())
            .join(kind.dir_name())
            .join(format!("{}.{}", key.as_str(), kind.extension()))
    }

    fn meta_path(&self, id: &MeasurementId) -> PathBuf {
        self.root.join("meta").join(format!("{}.json", id.as_str()))
    }

    /// Raw bytes of an artifact, or a miss when the file does not exist.
    pub fn get_bytes(
        &self,
        id: &MeasurementId,
        kind: ArtifactKind,
        key: &ConfigKey,
    ) -> Result<CacheLookup<Vec<u8>>> {
        let path = self.artifact_path(id, kind, key);
        match fs::read(&path) {
            Ok(bytes) => Ok(CacheLookup::Hit(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CacheLookup::Miss),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically write raw artifact bytes and return the final path.
    pub fn put_bytes(
        &self,
        id: &MeasurementId,
        kind: ArtifactKind,
        key: &ConfigKey,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let path = self.artifact_path(id, kind, key);
        write_atomic(&path, bytes)?;
        debug!(
            measurement_id = %id,
            kind = %kind,
            key = key.short(),
            bytes = bytes.len(),
            "wrote artifact"
        );
        Ok(path)
    }

    /// Decoded artifact, a miss, or `Error::CacheCorruption` when the file
    /// exists but cannot be decoded.
    pub fn get<T: Artifact>(&self, id: &MeasurementId, key: &ConfigKey) -> Result<CacheLookup<T>> {
        let bytes = match self.get_bytes(id, T::KIND, key)? {
            CacheLookup::Hit(bytes) => bytes,
            CacheLookup::Miss => return Ok(CacheLookup::Miss),
        };
        match T::decode(bytes) {
            Ok(value) => Ok(CacheLookup::Hit(value)),
            Err(Error::Artifact(reason)) => Err(self.corruption(id, T::KIND, key, reason)),
            Err(Error::Json(e)) => Err(self.corruption(id, T::KIND, key, e.to_string())),
            Err(other) => Err(other),
        }
    }

    fn corruption(&self, id: &MeasurementId, kind: ArtifactKind, key: &ConfigKey, reason: String) -> Error {
        let path = self.artifact_path(id, kind, key);
        warn!(
            measurement_id = %id,
            kind = %kind,
            key = key.short(),
            path = %path.display(),
            reason = %reason,
            "cached artifact is corrupted"
        );
        Error::CacheCorruption { path, reason }
    }

    /// Encode and atomically persist an artifact.
    pub fn put<T: Artifact>(&self, id: &MeasurementId, key: &ConfigKey, value: &T) -> Result<PathBuf> {
        let bytes = value.encode()?;
        self.put_bytes(id, T::KIND, key, &bytes)
    }

    /// Return the cached artifact or build, persist and return it.
    ///
    /// The build runs under the artifact's lock and only after a second
    /// lookup, so of two concurrent callers exactly one builds and the other
    /// observes a hit.
    pub fn get_or_build<T: Artifact>(
        &self,
        id: &MeasurementId,
        key: &ConfigKey,
        build: impl FnOnce() -> Result<T>,
    ) -> Result<Cached<T>> {
        let path = self.artifact_path(id, T::KIND, key);
        if let CacheLookup::Hit(value) = self.get::<T>(id, key)? {
            return Ok(Cached {
                value,
                path,
                cache_hit: true,
            });
        }

        let _lock = ArtifactLock::acquire(&path)?;
        if let CacheLookup::Hit(value) = self.get::<T>(id, key)? {
            debug!(measurement_id = %id, key = key.short(), "artifact built by a concurrent writer");
            return Ok(Cached {
                value,
                path,
                cache_hit: true,
            });
        }

        let value = build()?;
        let path = self.put(id, key, &value)?;
        Ok(Cached {
            value,
            path,
            cache_hit: false,
        })
    }

    /// Register a measurement file and return its registry entry.
    ///
    /// The first registration writes the entry; later ones only update the
    /// label when a different one is given.
    pub fn register(&self, path: &Path, label: Option<&str>) -> Result<MeasurementMeta> {
        let path = fs::canonicalize(path)?;
        let fingerprint = fingerprint_file(&path, DEFAULT_FINGERPRINT_HEAD_BYTES)?;
        let id = MeasurementId::from_fingerprint(&fingerprint)?;
        let meta_path = self.meta_path(&id);

        if meta_path.exists() {
            let mut meta = self.meta(&id)?;
            if let Some(label) = label {
                if meta.label.as_deref() != Some(label) {
                    meta.label = Some(label.to_string());
                    write_atomic(&meta_path, &serde_json::to_vec_pretty(&meta)?)?;
                    info!(measurement_id = %id, label, "updated measurement label");
                }
            }
            return Ok(meta);
        }

        let meta = MeasurementMeta {
            measurement_id: id.clone(),
            file_fingerprint: fingerprint,
            file_size_bytes: fs::metadata(&path)?.len(),
            format: path
                .extension()
                .map(|ext| ext.to_string_lossy().to_ascii_lowercase()),
            path,
            label: label.map(str::to_string),
            registered_at: Utc::now(),
        };
        write_atomic(&meta_path, &serde_json::to_vec_pretty(&meta)?)?;
        info!(measurement_id = %id, path = %meta.path.display(), "registered measurement");
        Ok(meta)
    }

    /// Registry entry of a measurement.
    pub fn meta(&self, id: &MeasurementId) -> Result<MeasurementMeta> {
        let meta_path = self.meta_path(id);
        let bytes = match fs::read(&meta_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::UnknownMeasurement(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes).map_err(|e| Error::CacheCorruption {
            path: meta_path,
            reason: e.to_string(),
        })
    }
}

/// SHA-256 over the file size, its modification time in whole seconds, and
/// its first `head_bytes` bytes. Cheap enough for very large logs.
pub fn fingerprint_file(path: &Path, head_bytes: usize) -> Result<String> {
    let file = File::open(path)?;
    let metadata = file.metadata()?;
    let mtime_secs = metadata
        .modified()?
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut hasher = Sha256::new();
    hasher.update(metadata.len().to_string().as_bytes());
    hasher.update(mtime_secs.to_string().as_bytes());

    let mut head = Vec::with_capacity(head_bytes.min(1 << 20));
    file.take(head_bytes as u64).read_to_end(&mut head)?;
    hasher.update(&head);
    Ok(hex::encode(hasher.finalize()))
}

/// Write `bytes` to `path` through a temporary sibling file and a rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Config(format!("artifact path {} has no parent", path.display())))?;
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Exclusive advisory lock on `<artifact path>.lock`, released on drop.
struct ArtifactLock {
    file: File,
}

impl ArtifactLock {
    fn acquire(artifact: &Path) -> Result<Self> {
        let mut lock_path = artifact.as_os_str().to_owned();
        lock_path.push(".lock");
        let lock_path = PathBuf::from(lock_path);
        if let Some(dir) = lock_path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            // blocks until the current holder finishes its build
            let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if result != 0 {
                return Err(std::io::Error::last_os_error().into());
            }
        }

        Ok(Self { file })
    }
}

impl Drop for ArtifactLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
        // The lock file stays: removing it would let a waiter lock an
        // unlinked inode while a newcomer locks a fresh file.
    }
}

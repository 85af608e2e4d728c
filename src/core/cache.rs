//! On-disk fingerprint cache.
//!
//! One cache file holds a whole fingerprint map for a (directory, algorithm,
//! core size) combination. Files are rewritten wholesale on every save.

use crate::core::fingerprint::{Fingerprint, FingerprintMap};
use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Extension shared by every cache file.
pub const CACHE_EXTENSION: &str = ".fpcache";

/// Bump whenever the on-disk record layout changes.
pub const CACHE_SCHEMA_VERSION: u16 = 1;

const ZSTD_LEVEL: i32 = 3;
const MAX_DIRNAME_CHARS: usize = 30;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode cache: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Failed to decode cache: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("Unsupported cache schema version {found} (expected {expected})")]
    SchemaVersion { found: u16, expected: u16 },

    #[error("Cache columns are misaligned: {paths} paths, {hashes} hashes")]
    ColumnMismatch { paths: usize, hashes: usize },

    #[error("Failed to replace {path:?}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Columnar on-disk layout: `path[i]` owns `hash[i]`.
#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    schema_version: u16,
    path: Vec<String>,
    hash: Vec<Vec<bool>>,
}

impl CacheRecord {
    fn from_map(map: &FingerprintMap) -> Self {
        let (path, hash) = map
            .iter()
            .map(|(p, fp)| (p.to_string_lossy().into_owned(), fp.bits().to_vec()))
            .unzip();
        Self {
            schema_version: CACHE_SCHEMA_VERSION,
            path,
            hash,
        }
    }

    fn into_map(self) -> Result<FingerprintMap, CacheError> {
        if self.schema_version != CACHE_SCHEMA_VERSION {
            return Err(CacheError::SchemaVersion {
                found: self.schema_version,
                expected: CACHE_SCHEMA_VERSION,
            });
        }
        if self.path.len() != self.hash.len() {
            return Err(CacheError::ColumnMismatch {
                paths: self.path.len(),
                hashes: self.hash.len(),
            });
        }

        Ok(self
            .path
            .into_iter()
            .zip(self.hash)
            .map(|(p, bits)| (PathBuf::from(p), Fingerprint::new(bits)))
            .collect())
    }
}

/// Loads and saves fingerprint maps. Holds no per-call state.
#[derive(Debug, Clone, Copy, Default)]
pub struct FingerprintCache;

impl FingerprintCache {
    pub fn new() -> Self {
        Self
    }

    /// Reads a cache file. A missing or unreadable file yields an empty map.
    pub fn load(&self, cache_file: &Path) -> FingerprintMap {
        if !cache_file.exists() {
            log::info!("Cache file {} does not exist", cache_file.display());
            return FingerprintMap::new();
        }

        log::info!("Loading cache file {}", cache_file.display());
        match Self::read(cache_file) {
            Ok(map) => map,
            Err(e) => {
                log::warn!(
                    "Cache file {} is damaged, ignoring it: {}",
                    cache_file.display(),
                    e
                );
                FingerprintMap::new()
            }
        }
    }

    fn read(cache_file: &Path) -> Result<FingerprintMap, CacheError> {
        let compressed = fs::read(cache_file)?;
        let encoded = zstd::decode_all(compressed.as_slice())?;
        let (record, _): (CacheRecord, usize) = decode_from_slice(&encoded, standard())?;
        record.into_map()
    }

    /// Writes `map` to `cache_file`, replacing any previous contents.
    ///
    /// An empty map is not written. The new file becomes visible only once
    /// fully written.
    pub fn save(&self, map: &FingerprintMap, cache_file: &Path) -> Result<(), CacheError> {
        if map.is_empty() {
            log::warn!("Hash map is empty, skipping saving cache file");
            return Ok(());
        }

        let parent = match cache_file.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        log::info!(
            "Saving {} hashes to {}",
            map.len(),
            cache_file.file_name().unwrap_or_default().to_string_lossy()
        );

        let encoded = encode_to_vec(CacheRecord::from_map(map), standard())?;
        let compressed = zstd::encode_all(encoded.as_slice(), ZSTD_LEVEL)?;

        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(&compressed)?;
        tmp.as_file().sync_all()?;
        tmp.persist(cache_file).map_err(|e| CacheError::Persist {
            path: cache_file.to_path_buf(),
            source: e.error,
        })?;

        log::info!("Cache saved successfully.");
        Ok(())
    }

    /// Derives the cache file name for a source directory and algorithm
    /// configuration. Pure: equal inputs always give equal names.
    pub fn generate_cache_filename(
        source_path: &Path,
        hash_type: &str,
        core_size: u32,
        custom_name: Option<&str>,
    ) -> String {
        let suffix = format!("{}_s{}{}", hash_type, core_size, CACHE_EXTENSION);

        match custom_name {
            None => {
                let absolute = absolute_path(source_path);
                let digest = md5::compute(absolute.to_string_lossy().as_bytes());
                let dir_name = absolute
                    .file_name()
                    .or_else(|| source_path.file_name())
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let dir_name: String = sanitize(&dir_name).chars().take(MAX_DIRNAME_CHARS).collect();
                format!("cache_{:x}_d{}{}", digest, dir_name, suffix)
            }
            Some(name) => {
                let name = sanitize(name);
                let name = name.strip_suffix(CACHE_EXTENSION).unwrap_or(name.as_str());
                format!("{}_{}", name, suffix)
            }
        }
    }
}

/// Spaces become underscores; leading and trailing dots are dropped.
fn sanitize(name: &str) -> String {
    name.replace(' ', "_").trim_matches('.').to_string()
}

fn absolute_path(path: &Path) -> PathBuf {
    fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

//! Configuration for a comparison run.
//!
//! [`Settings`] is the loose, user-facing bundle (CLI flags or a TOML file).
//! [`CompareConfig`] is the validated, immutable value the pipeline runs on;
//! all coercion and range checks happen once in [`CompareConfig::from_settings`].

use crate::core::hasher;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_HASH_TYPE: &str = "dhash";
pub const DEFAULT_CORE_SIZE: i64 = 16;
pub const DEFAULT_THRESHOLD_PERCENT: i64 = 10;
pub const MAX_PERCENTAGE: f64 = 100.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("core_size must be a positive integer, got {value}")]
    InvalidCoreSize { value: String },

    #[error("threshold must be a number between 0 and 100, got {value}")]
    InvalidThreshold { value: String },

    #[error("n_jobs must be a real number, got {value}")]
    InvalidJobs { value: String },

    #[error("Unknown hash type '{name}' (available: {available})")]
    UnknownHashType { name: String, available: String },

    #[error("Failed to read settings file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// A loosely typed numeric setting.
///
/// Accepts an integer, a float (truncated toward zero), a numeric string
/// (parsed, then truncated) or a pair of integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Int(i64),
    Float(f64),
    Text(String),
    Pair(i64, i64),
}

impl ConfigValue {
    fn truncated(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(v) => Some(*v),
            ConfigValue::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            ConfigValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Int(v) => Some(*v as f64),
            ConfigValue::Float(f) => Some(*f),
            ConfigValue::Text(s) => s.trim().parse::<f64>().ok(),
            ConfigValue::Pair(..) => None,
        }
    }

    /// Resolves a core size. For a pair, the first element wins unless it
    /// is negative.
    pub fn to_core_size(&self) -> Result<u32, ConfigError> {
        let raw = match self {
            ConfigValue::Pair(first, second) => Some(if *first >= 0 { *first } else { *second }),
            other => other.truncated(),
        };

        raw.filter(|v| *v >= 1)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| ConfigError::InvalidCoreSize {
                value: self.to_string(),
            })
    }

    /// Resolves a threshold percentage in `[0, 100]`.
    pub fn to_threshold_percent(&self) -> Result<f64, ConfigError> {
        self.as_f64()
            .filter(|p| p.is_finite() && (0.0..=MAX_PERCENTAGE).contains(p))
            .ok_or_else(|| ConfigError::InvalidThreshold {
                value: self.to_string(),
            })
    }

    /// Resolves a requested worker count before clamping.
    pub fn to_jobs(&self) -> Result<i64, ConfigError> {
        self.truncated().ok_or_else(|| ConfigError::InvalidJobs {
            value: self.to_string(),
        })
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Int(v) => write!(f, "{}", v),
            ConfigValue::Float(v) => write!(f, "{}", v),
            ConfigValue::Text(s) => write!(f, "{:?}", s),
            ConfigValue::Pair(a, b) => write!(f, "({}, {})", a, b),
        }
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Int(v)
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Float(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::Text(v.to_string())
    }
}

impl From<(i64, i64)> for ConfigValue {
    fn from((a, b): (i64, i64)) -> Self {
        ConfigValue::Pair(a, b)
    }
}

/// Raw settings as supplied by the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub hash_type: String,
    pub core_size: ConfigValue,
    pub threshold: ConfigValue,
    pub n_jobs: ConfigValue,
    pub cache_root: PathBuf,
    pub cache_name: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hash_type: DEFAULT_HASH_TYPE.to_string(),
            core_size: ConfigValue::Int(DEFAULT_CORE_SIZE),
            threshold: ConfigValue::Int(DEFAULT_THRESHOLD_PERCENT),
            n_jobs: ConfigValue::Int(num_cpus::get() as i64),
            cache_root: default_cache_root(),
            cache_name: None,
        }
    }
}

impl Settings {
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Platform cache directory, or `.imgdedup_cache` in the working directory.
pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("imgdedup"))
        .unwrap_or_else(|| PathBuf::from(".imgdedup_cache"))
}

/// Validated configuration for one comparison run.
#[derive(Debug, Clone, PartialEq)]
pub struct CompareConfig {
    hash_type: String,
    core_size: u32,
    threshold_percent: f64,
    threshold_bits: u32,
    n_jobs: usize,
    cache_root: PathBuf,
    cache_name: Option<String>,
}

impl CompareConfig {
    /// Validates `settings` against the host's CPU count.
    pub fn new(settings: &Settings) -> Result<Self, ConfigError> {
        Self::from_settings(settings, num_cpus::get())
    }

    pub fn from_settings(settings: &Settings, cpu_count: usize) -> Result<Self, ConfigError> {
        let hash_type = hasher::strategy_for(&settings.hash_type)
            .map(|strategy| strategy.name().to_string())
            .ok_or_else(|| ConfigError::UnknownHashType {
                name: settings.hash_type.clone(),
                available: hasher::available_hash_types().join(", "),
            })?;

        let core_size = settings.core_size.to_core_size()?;
        let threshold_percent = settings.threshold.to_threshold_percent()?;
        let n_jobs = clamp_jobs(settings.n_jobs.to_jobs()?, cpu_count);

        Ok(Self {
            hash_type,
            core_size,
            threshold_percent,
            threshold_bits: threshold_bits(core_size, threshold_percent),
            n_jobs,
            cache_root: settings.cache_root.clone(),
            cache_name: settings.cache_name.clone(),
        })
    }

    pub fn hash_type(&self) -> &str {
        &self.hash_type
    }

    pub fn core_size(&self) -> u32 {
        self.core_size
    }

    pub fn threshold_percent(&self) -> f64 {
        self.threshold_percent
    }

    /// Maximum number of differing bits for two fingerprints to count as
    /// duplicates.
    pub fn threshold_bits(&self) -> u32 {
        self.threshold_bits
    }

    pub fn n_jobs(&self) -> usize {
        self.n_jobs
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn cache_name(&self) -> Option<&str> {
        self.cache_name.as_deref()
    }
}

/// `floor(core_size² * percent / 100)`
pub fn threshold_bits(core_size: u32, percent: f64) -> u32 {
    let total = core_size as f64 * core_size as f64;
    (total * percent / MAX_PERCENTAGE).floor() as u32
}

/// Clamps a requested worker count so at least one core stays free.
pub fn clamp_jobs(requested: i64, cpu_count: usize) -> usize {
    let jobs = if requested <= 1 {
        if requested < 1 {
            log::warn!("n_jobs must be at least 1, got {}; using 1", requested);
        }
        1
    } else if cpu_count <= 1 {
        log::warn!("Single CPU available; using 1 worker instead of {}", requested);
        1
    } else if requested as u64 >= cpu_count as u64 {
        log::warn!(
            "n_jobs must be less than {} CPUs, got {}; using {}",
            cpu_count,
            requested,
            cpu_count - 1
        );
        cpu_count - 1
    } else {
        requested as usize
    };

    log::debug!("n_jobs set to {}", jobs);
    jobs
}

use crate::config::{CompareConfig, ConfigError};
use crate::core::duplicate::{ClusterError, DuplicateClusterer};
use crate::core::hashmap::{BuildError, HashMapBuilder};
use crate::core::hasher::{self, HashingStrategy};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompareError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Hashing failed: {0}")]
    Build(#[from] BuildError),

    #[error("Clustering failed: {0}")]
    Cluster(#[from] ClusterError),
}

/// Entry point for duplicate detection: hash, then cluster.
pub struct ImageComparer {
    config: CompareConfig,
    strategy: Arc<dyn HashingStrategy>,
}

impl ImageComparer {
    /// Resolves the configured hashing strategy by name.
    pub fn new(config: CompareConfig) -> Result<Self, CompareError> {
        let strategy = hasher::strategy_for(config.hash_type()).ok_or_else(|| {
            ConfigError::UnknownHashType {
                name: config.hash_type().to_string(),
                available: hasher::available_hash_types().join(", "),
            }
        })?;
        Ok(Self::with_strategy(config, strategy))
    }

    pub fn with_strategy(config: CompareConfig, strategy: Arc<dyn HashingStrategy>) -> Self {
        Self { config, strategy }
    }

    pub fn config(&self) -> &CompareConfig {
        &self.config
    }

    /// Returns the files that duplicate an earlier file in `file_paths`.
    pub fn compare(&self, file_paths: &[PathBuf]) -> Result<Vec<PathBuf>, CompareError> {
        let hash_map = HashMapBuilder::new(self.strategy.clone(), &self.config).get_hashmap(file_paths)?;
        let duplicates =
            DuplicateClusterer::new(self.config.threshold_bits()).find_duplicates(&hash_map)?;
        Ok(duplicates)
    }
}

use crate::config::CompareConfig;
use crate::core::cache::FingerprintCache;
use crate::core::fingerprint::{Fingerprint, FingerprintMap};
use crate::core::hasher::HashingStrategy;
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Builds path -> fingerprint maps, in parallel, backed by the on-disk cache.
///
/// The cache is all-or-nothing: if a cache file exists for the directory
/// and configuration, its contents are returned as-is and no file is
/// rehashed. Files added to an already cached directory are not picked up
/// until the cache file is removed or a different cache name is used.
pub struct HashMapBuilder {
    strategy: Arc<dyn HashingStrategy>,
    cache: FingerprintCache,
    core_size: u32,
    n_jobs: usize,
    cache_root: PathBuf,
    cache_name: Option<String>,
}

impl HashMapBuilder {
    pub fn new(strategy: Arc<dyn HashingStrategy>, config: &CompareConfig) -> Self {
        Self {
            strategy,
            cache: FingerprintCache::new(),
            core_size: config.core_size(),
            n_jobs: config.n_jobs(),
            cache_root: config.cache_root().to_path_buf(),
            cache_name: config.cache_name().map(str::to_string),
        }
    }

    /// Cache file used for `image_paths`, keyed on the first path's directory.
    pub fn cache_file_for(&self, image_paths: &[PathBuf]) -> Option<PathBuf> {
        let first = image_paths.first()?;
        let source_dir = match first.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let filename = FingerprintCache::generate_cache_filename(
            source_dir,
            self.strategy.name(),
            self.core_size,
            self.cache_name.as_deref(),
        );
        Some(self.cache_root.join(filename))
    }

    /// Returns fingerprints for every decodable image in `image_paths`.
    pub fn get_hashmap(&self, image_paths: &[PathBuf]) -> Result<FingerprintMap, BuildError> {
        let Some(cache_file) = self.cache_file_for(image_paths) else {
            log::info!("No images to hash");
            return Ok(FingerprintMap::new());
        };

        let cached = self.cache.load(&cache_file);
        if !cached.is_empty() {
            log::info!(
                "Cache hit: loaded {} hashes from {}",
                cached.len(),
                cache_file.display()
            );
            return Ok(cached);
        }
        log::info!("Cache miss for {}", cache_file.display());

        let hash_map = self.compute(image_paths)?;

        if let Err(e) = self.cache.save(&hash_map, &cache_file) {
            log::error!("Critical error saving cache {}: {}", cache_file.display(), e);
        }
        Ok(hash_map)
    }

    fn compute(&self, image_paths: &[PathBuf]) -> Result<FingerprintMap, BuildError> {
        let image_count = image_paths.len();
        log::info!(
            "Building hashmap in parallel using {} workers for {} images...",
            self.n_jobs,
            image_count
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.n_jobs)
            .build()?;

        let hashes: Vec<Option<Fingerprint>> =
            pool.install(|| image_paths.par_iter().map(|path| self.hash_one(path)).collect());

        let hash_map: FingerprintMap = image_paths
            .iter()
            .zip(hashes)
            .filter_map(|(path, hash)| hash.map(|h| (path.clone(), h)))
            .collect();

        log::info!(
            "Successfully hashed {} out of {} images",
            hash_map.len(),
            image_count
        );
        Ok(hash_map)
    }

    /// A panic inside the strategy only loses this one file.
    fn hash_one(&self, path: &Path) -> Option<Fingerprint> {
        let strategy = &self.strategy;
        let core_size = self.core_size;
        match panic::catch_unwind(AssertUnwindSafe(|| strategy.compute_hash(path, core_size))) {
            Ok(hash) => hash,
            Err(_) => {
                log::error!("Hashing panicked for {}, skipping it", path.display());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigValue, Settings};
    use crate::core::hasher::DHash;
    use crate::core::hasher::tests::write_gradient;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Wraps dHash and counts invocations.
    struct CountingStrategy {
        calls: AtomicUsize,
    }

    impl HashingStrategy for CountingStrategy {
        fn name(&self) -> &'static str {
            "dhash"
        }

        fn compute_hash(&self, image_path: &Path, core_size: u32) -> Option<Fingerprint> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            DHash::new().compute_hash(image_path, core_size)
        }
    }

    struct PanickyStrategy;

    impl HashingStrategy for PanickyStrategy {
        fn name(&self) -> &'static str {
            "dhash"
        }

        fn compute_hash(&self, image_path: &Path, core_size: u32) -> Option<Fingerprint> {
            if image_path.ends_with("boom.png") {
                panic!("decoder blew up");
            }
            DHash::new().compute_hash(image_path, core_size)
        }
    }

    fn test_config(cache_root: &Path) -> CompareConfig {
        let settings = Settings {
            core_size: ConfigValue::Int(8),
            threshold: ConfigValue::Int(10),
            n_jobs: ConfigValue::Int(2),
            cache_root: cache_root.to_path_buf(),
            ..Settings::default()
        };
        CompareConfig::from_settings(&settings, 4).unwrap()
    }

    #[test]
    fn test_builds_map_and_drops_invalid_files() {
        let images = TempDir::new().unwrap();
        let cache_root = TempDir::new().unwrap();
        let a = write_gradient(images.path(), "a.png", true);
        let b = write_gradient(images.path(), "b.png", false);
        let junk = images.path().join("notes.txt");
        fs::write(&junk, "not an image").unwrap();

        let builder = HashMapBuilder::new(Arc::new(DHash::new()), &test_config(cache_root.path()));
        let map = builder.get_hashmap(&[a.clone(), junk.clone(), b.clone()]).unwrap();

        assert_eq!(map.len(), 2);
        assert!(map.contains_key(&a));
        assert!(map.contains_key(&b));
        assert!(!map.contains_key(&junk));
        assert!(map.iter().all(|(_, fp)| fp.len() == 64));
    }

    #[test]
    fn test_second_run_is_served_from_cache() {
        let images = TempDir::new().unwrap();
        let cache_root = TempDir::new().unwrap();
        let paths = vec![
            write_gradient(images.path(), "a.png", true),
            write_gradient(images.path(), "b.png", false),
        ];
        let strategy = Arc::new(CountingStrategy {
            calls: AtomicUsize::new(0),
        });
        let builder = HashMapBuilder::new(strategy.clone(), &test_config(cache_root.path()));

        let first = builder.get_hashmap(&paths).unwrap();
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 2);
        assert!(builder.cache_file_for(&paths).unwrap().exists());

        let second = builder.get_hashmap(&paths).unwrap();
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_cache_hit_ignores_new_files() {
        let images = TempDir::new().unwrap();
        let cache_root = TempDir::new().unwrap();
        let a = write_gradient(images.path(), "a.png", true);
        let builder = HashMapBuilder::new(Arc::new(DHash::new()), &test_config(cache_root.path()));
        builder.get_hashmap(std::slice::from_ref(&a)).unwrap();

        let late = write_gradient(images.path(), "late.png", false);
        let map = builder.get_hashmap(&[a.clone(), late.clone()]).unwrap();

        assert!(map.contains_key(&a));
        assert!(!map.contains_key(&late));
    }

    #[test]
    fn test_all_invalid_writes_no_cache() {
        let images = TempDir::new().unwrap();
        let cache_root = TempDir::new().unwrap();
        let junk = images.path().join("notes.txt");
        fs::write(&junk, "not an image").unwrap();

        let builder = HashMapBuilder::new(Arc::new(DHash::new()), &test_config(cache_root.path()));
        let paths = vec![junk];
        assert!(builder.get_hashmap(&paths).unwrap().is_empty());
        assert!(!builder.cache_file_for(&paths).unwrap().exists());
    }

    #[test]
    fn test_empty_input() {
        let cache_root = TempDir::new().unwrap();
        let builder = HashMapBuilder::new(Arc::new(DHash::new()), &test_config(cache_root.path()));

        assert!(builder.get_hashmap(&[]).unwrap().is_empty());
        assert!(builder.cache_file_for(&[]).is_none());
    }

    #[test]
    fn test_panicking_item_is_isolated() {
        let images = TempDir::new().unwrap();
        let cache_root = TempDir::new().unwrap();
        let good = write_gradient(images.path(), "good.png", true);
        let boom = write_gradient(images.path(), "boom.png", false);

        let builder = HashMapBuilder::new(Arc::new(PanickyStrategy), &test_config(cache_root.path()));
        let map = builder.get_hashmap(&[good.clone(), boom.clone()]).unwrap();

        assert!(map.contains_key(&good));
        assert!(!map.contains_key(&boom));
    }

    #[test]
    fn test_cache_write_failure_still_returns_map() {
        let images = TempDir::new().unwrap();
        let blocker = TempDir::new().unwrap();
        // A regular file where the cache directory should be.
        let cache_root = blocker.path().join("not_a_dir");
        fs::write(&cache_root, "occupied").unwrap();
        let a = write_gradient(images.path(), "a.png", true);

        let builder = HashMapBuilder::new(Arc::new(DHash::new()), &test_config(&cache_root));
        let map = builder.get_hashmap(std::slice::from_ref(&a)).unwrap();

        assert_eq!(map.len(), 1);
    }
}

use image::{GrayImage, Luma};
use imgdedup::core::FingerprintCache;
use imgdedup::{CompareConfig, CompareError, ConfigValue, ImageComparer, Settings};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// 64x64 image whose left half has intensity `left` and right half `right`,
/// with a one-pixel bright column at `marker`.
fn write_image(dir: &Path, name: &str, left: u8, right: u8, marker: Option<u32>) -> PathBuf {
    let path = dir.join(name);
    let img = GrayImage::from_fn(64, 64, |x, _| {
        if Some(x) == marker {
            Luma([255])
        } else if x < 32 {
            Luma([left])
        } else {
            Luma([right])
        }
    });
    img.save(&path).unwrap();
    path
}

fn comparer(cache_root: &Path, threshold: i64) -> ImageComparer {
    let settings = Settings {
        core_size: ConfigValue::Int(8),
        threshold: ConfigValue::Int(threshold),
        n_jobs: ConfigValue::Int(2),
        cache_root: cache_root.to_path_buf(),
        ..Settings::default()
    };
    ImageComparer::new(CompareConfig::from_settings(&settings, 4).unwrap()).unwrap()
}

#[test]
fn test_compare_finds_copy_and_skips_invalid_files() {
    let images = TempDir::new().unwrap();
    let cache_root = TempDir::new().unwrap();

    let original = write_image(images.path(), "a_original.png", 200, 20, None);
    let copy = images.path().join("b_copy.png");
    fs::copy(&original, &copy).unwrap();
    let different = write_image(images.path(), "c_different.png", 20, 200, Some(10));
    let junk = images.path().join("d_notes.png");
    fs::write(&junk, "definitely not a png").unwrap();

    let files = vec![original.clone(), copy.clone(), different.clone(), junk.clone()];
    let duplicates = comparer(cache_root.path(), 10).compare(&files).unwrap();

    assert_eq!(duplicates, vec![copy]);
    assert!(!duplicates.contains(&junk));
    assert!(!duplicates.contains(&original));
}

#[test]
fn test_compare_writes_and_reuses_cache() {
    let images = TempDir::new().unwrap();
    let cache_root = TempDir::new().unwrap();
    let a = write_image(images.path(), "a.png", 200, 20, None);
    let b = write_image(images.path(), "b.png", 20, 200, None);
    let files = vec![a, b];

    let comparer = comparer(cache_root.path(), 10);
    let first = comparer.compare(&files).unwrap();

    let cache_name = FingerprintCache::generate_cache_filename(images.path(), "dhash", 8, None);
    let cache_file = cache_root.path().join(cache_name);
    assert!(cache_file.exists());
    assert_eq!(FingerprintCache::new().load(&cache_file).len(), 2);

    let second = comparer.compare(&files).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_compare_rejects_mixed_cache_state() {
    let images = TempDir::new().unwrap();
    let cache_root = TempDir::new().unwrap();
    let a = write_image(images.path(), "a.png", 200, 20, None);

    // A cache file for this key holding fingerprints of two sizes.
    let mixed: imgdedup::core::FingerprintMap = vec![
        (a.clone(), imgdedup::core::Fingerprint::new(vec![false; 64])),
        (PathBuf::from("/elsewhere/b.png"), imgdedup::core::Fingerprint::new(vec![false; 256])),
    ]
    .into_iter()
    .collect();
    let cache_name = FingerprintCache::generate_cache_filename(images.path(), "dhash", 8, None);
    FingerprintCache::new()
        .save(&mixed, &cache_root.path().join(cache_name))
        .unwrap();

    let err = comparer(cache_root.path(), 10).compare(&[a]).unwrap_err();
    assert!(matches!(err, CompareError::Cluster(_)));
}

#[test]
fn test_compare_with_no_files() {
    let cache_root = TempDir::new().unwrap();
    assert!(comparer(cache_root.path(), 10).compare(&[]).unwrap().is_empty());
}

#[test]
fn test_compare_reads_images_by_content_not_extension() {
    let images = TempDir::new().unwrap();
    let cache_root = TempDir::new().unwrap();

    let original = write_image(images.path(), "a_original.png", 200, 20, None);
    let renamed = images.path().join("b_renamed.jpg");
    let bare = images.path().join("c_bare");
    fs::copy(&original, &renamed).unwrap();
    fs::copy(&original, &bare).unwrap();

    let files = vec![original, renamed.clone(), bare.clone()];
    let duplicates = comparer(cache_root.path(), 10).compare(&files).unwrap();

    assert_eq!(duplicates, vec![renamed, bare]);
}

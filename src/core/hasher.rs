//! Hashing strategies that turn an image file into a [`Fingerprint`].
//!
//! Strategies are stateless and may be invoked from any worker thread. New
//! algorithms register themselves in [`REGISTRY`] and become selectable by
//! name without touching the builder or the clusterer.

use crate::core::fingerprint::Fingerprint;
use image::{GrayImage, ImageReader};
use std::path::Path;
use std::sync::Arc;

/// Contract for a fingerprinting algorithm.
///
/// `compute_hash` returns `None` when the file cannot be decoded as an
/// image. That is an expected outcome, not an error.
pub trait HashingStrategy: Send + Sync {
    /// Algorithm name, used for registry lookup and cache keys.
    fn name(&self) -> &'static str;

    /// Computes a fingerprint of exactly `core_size * core_size` bits.
    fn compute_hash(&self, image_path: &Path, core_size: u32) -> Option<Fingerprint>;
}

/// Difference hash: compares horizontally adjacent intensity samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct DHash;

impl DHash {
    pub const NAME: &'static str = "dhash";

    pub fn new() -> Self {
        Self
    }

    /// Hashes already-decoded intensity data.
    pub fn hash_luma(image: &GrayImage, core_size: u32) -> Fingerprint {
        if core_size == 0 {
            return Fingerprint::new(Vec::new());
        }

        let width = core_size as usize + 1;
        let height = core_size as usize;
        let samples = resize_area(image, width, height);

        let bits = samples
            .chunks(width)
            .flat_map(|row| row.windows(2).map(|pair| pair[0] > pair[1]))
            .collect();
        Fingerprint::new(bits)
    }
}

impl HashingStrategy for DHash {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn compute_hash(&self, image_path: &Path, core_size: u32) -> Option<Fingerprint> {
        // Format comes from the file contents; the extension is only a fallback.
        let decoded = ImageReader::open(image_path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(image::ImageError::IoError)
            .and_then(|reader| reader.decode());
        let image = match decoded {
            Ok(img) => img.to_luma8(),
            Err(e) => {
                log::debug!("Skipping {}: {}", image_path.display(), e);
                return None;
            }
        };

        if image.width() == 0 || image.height() == 0 {
            return None;
        }

        Some(Self::hash_luma(&image, core_size))
    }
}

type StrategyCtor = fn() -> Arc<dyn HashingStrategy>;

fn dhash_strategy() -> Arc<dyn HashingStrategy> {
    Arc::new(DHash::new())
}

/// Algorithm name -> constructor.
pub static REGISTRY: &[(&str, StrategyCtor)] = &[(DHash::NAME, dhash_strategy)];

/// Looks up a strategy by its (case-insensitive) name.
pub fn strategy_for(hash_type: &str) -> Option<Arc<dyn HashingStrategy>> {
    REGISTRY
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(hash_type))
        .map(|(_, ctor)| ctor())
}

pub fn available_hash_types() -> Vec<&'static str> {
    REGISTRY.iter().map(|(name, _)| *name).collect()
}

/// Area-averaging resize to `dst_w x dst_h`, returned row-major.
///
/// Every destination sample is the coverage-weighted mean of the source
/// pixels its footprint overlaps, rounded to the nearest integer with ties
/// going to even.
fn resize_area(src: &GrayImage, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let (src_w, src_h) = (src.width() as usize, src.height() as usize);
    let x_spans = area_spans(src_w, dst_w);
    let y_spans = area_spans(src_h, dst_h);
    let norm = (src_w as f64 / dst_w as f64) * (src_h as f64 / dst_h as f64);
    let raw = src.as_raw();

    let mut out = Vec::with_capacity(dst_w * dst_h);
    for ys in &y_spans {
        for xs in &x_spans {
            let mut acc = 0.0f64;
            for &(sy, wy) in ys {
                let row = &raw[sy * src_w..(sy + 1) * src_w];
                for &(sx, wx) in xs {
                    acc += row[sx] as f64 * wx * wy;
                }
            }
            out.push((acc / norm).round_ties_even().clamp(0.0, 255.0) as u8);
        }
    }
    out
}

/// For each destination index, the source indices it covers and the
/// length of each overlap.
fn area_spans(src_len: usize, dst_len: usize) -> Vec<Vec<(usize, f64)>> {
    let scale = src_len as f64 / dst_len as f64;
    (0..dst_len)
        .map(|d| {
            let start = d as f64 * scale;
            let end = (d + 1) as f64 * scale;
            let first = start.floor() as usize;
            let last = (end.ceil() as usize).min(src_len);
            (first..last)
                .filter_map(|s| {
                    let overlap = end.min((s + 1) as f64) - start.max(s as f64);
                    (overlap > 1e-12).then_some((s, overlap))
                })
                .collect()
        })
        .collect()
}

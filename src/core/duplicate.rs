// Near-duplicate clustering over fingerprint maps.
//
// A single anchor sweep: each not-yet-marked entry, in map order, marks every
// later entry within the Hamming threshold. Marked entries never become
// anchors. The grouping is not transitive: two entries close to the same
// anchor are both marked even when they are far from each other.

use crate::core::fingerprint::{Fingerprint, FingerprintMap};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error(
        "Fingerprint size mismatch for {path:?}: expected {expected} bits, found {found}. \
         Clear the cache or rerun with a single configuration"
    )]
    SizeMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("Cannot compare fingerprints of {left} and {right} bits")]
    LengthMismatch { left: usize, right: usize },
}

/// Packed fingerprints aligned with the map's enumeration order.
struct BitMatrix {
    rows: Vec<Vec<u64>>,
}

impl BitMatrix {
    fn build(map: &FingerprintMap) -> Result<Self, ClusterError> {
        let mut expected = None;
        let mut rows = Vec::with_capacity(map.len());

        for (path, fp) in map.iter() {
            let len = *expected.get_or_insert(fp.len());
            if fp.len() != len {
                log::error!("Failed to create matrix. Some hashes have different lengths!");
                return Err(ClusterError::SizeMismatch {
                    path: path.to_path_buf(),
                    expected: len,
                    found: fp.len(),
                });
            }
            rows.push(fp.to_words());
        }

        Ok(Self { rows })
    }

    fn distances_from(&self, anchor: usize) -> impl Iterator<Item = u32> + '_ {
        let reference = &self.rows[anchor];
        self.rows.iter().map(move |row| xor_popcount(reference, row))
    }
}

fn xor_popcount(a: &[u64], b: &[u64]) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Number of differing bits between two equal-length fingerprints.
pub fn hamming_distance(a: &Fingerprint, b: &Fingerprint) -> Result<u32, ClusterError> {
    if a.len() != b.len() {
        return Err(ClusterError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(xor_popcount(&a.to_words(), &b.to_words()))
}

/// Finds duplicates within a fixed Hamming distance.
#[derive(Debug, Clone, Copy)]
pub struct DuplicateClusterer {
    threshold_bits: u32,
}

impl DuplicateClusterer {
    pub fn new(threshold_bits: u32) -> Self {
        Self { threshold_bits }
    }

    pub fn threshold_bits(&self) -> u32 {
        self.threshold_bits
    }

    /// Returns the paths marked as duplicates of an earlier anchor, in map
    /// order. A distance equal to the threshold counts as a duplicate.
    pub fn find_duplicates(&self, map: &FingerprintMap) -> Result<Vec<PathBuf>, ClusterError> {
        if map.is_empty() {
            return Ok(Vec::new());
        }

        log::info!("Vectorizing comparison for {} images...", map.len());
        let matrix = BitMatrix::build(map)?;
        let mut marked = vec![false; matrix.rows.len()];

        for anchor in 0..matrix.rows.len() {
            if marked[anchor] {
                continue;
            }
            for (index, distance) in matrix.distances_from(anchor).enumerate().skip(anchor + 1) {
                if distance <= self.threshold_bits {
                    marked[index] = true;
                }
            }
        }

        let duplicates: Vec<PathBuf> = map
            .paths()
            .zip(&marked)
            .filter(|(_, is_dup)| **is_dup)
            .map(|(path, _)| path.to_path_buf())
            .collect();

        log::info!(
            "Vectorized search finished. Found {} duplicates.",
            duplicates.len()
        );
        Ok(duplicates)
    }
}

/// Convenience wrapper around [`DuplicateClusterer::find_duplicates`].
pub fn find_duplicates(
    map: &FingerprintMap,
    threshold_bits: u32,
) -> Result<Vec<PathBuf>, ClusterError> {
    DuplicateClusterer::new(threshold_bits).find_duplicates(map)
}

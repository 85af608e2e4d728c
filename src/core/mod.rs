pub mod cache;
pub mod duplicate;
pub mod fingerprint;
pub mod hashmap;
pub mod hasher;

pub use cache::FingerprintCache;
pub use duplicate::{DuplicateClusterer, find_duplicates, hamming_distance};
pub use fingerprint::{Fingerprint, FingerprintMap};
pub use hashmap::HashMapBuilder;
pub use hasher::{DHash, HashingStrategy};

//! Perceptual duplicate detection for image collections.
//!
//! Files are fingerprinted with a difference hash, the fingerprint map is
//! cached per directory and configuration, and near-duplicates are found
//! by Hamming distance.
//!
//! ```rust,no_run
//! use imgdedup::{CompareConfig, ImageComparer, Settings};
//! use std::path::PathBuf;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = CompareConfig::new(&Settings::default())?;
//!     let comparer = ImageComparer::new(config)?;
//!     let files = vec![PathBuf::from("photos/a.jpg"), PathBuf::from("photos/b.jpg")];
//!     for dup in comparer.compare(&files)? {
//!         println!("{}", dup.display());
//!     }
//!     Ok(())
//! }
//! ```

pub mod comparer;
pub mod config;
pub mod core;

pub use comparer::{CompareError, ImageComparer};
pub use config::{CompareConfig, ConfigError, ConfigValue, Settings};

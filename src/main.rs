use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use imgdedup::{CompareConfig, ConfigValue, ImageComparer, Settings};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(name = "imgdedup", version, about = "Find perceptual duplicates in image folders")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Find and list duplicate images
    Scan {
        /// Directory to scan
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,

        /// Settings file (TOML); flags below override it
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Hashing algorithm
        #[arg(short, long, value_name = "NAME")]
        method: Option<String>,

        /// Percentage of bits that may differ between duplicates
        #[arg(short, long, value_name = "PERCENT")]
        threshold: Option<String>,

        /// Resize dimension; fingerprints have core_size² bits
        #[arg(long, value_name = "N")]
        core_size: Option<String>,

        /// Worker threads
        #[arg(short, long, value_name = "N")]
        jobs: Option<String>,

        /// Directory holding cache files
        #[arg(long, value_name = "DIR")]
        cache_root: Option<PathBuf>,

        /// Fixed cache file name instead of one derived from the directory
        #[arg(long, value_name = "NAME")]
        cache_name: Option<String>,

        /// Print duplicates as a JSON array
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            path,
            config,
            method,
            threshold,
            core_size,
            jobs,
            cache_root,
            cache_name,
            json,
        } => {
            let mut settings = match config {
                Some(file) => Settings::from_toml_file(&file)?,
                None => Settings::default(),
            };
            if let Some(method) = method {
                settings.hash_type = method;
            }
            if let Some(threshold) = threshold {
                settings.threshold = ConfigValue::Text(threshold);
            }
            if let Some(core_size) = core_size {
                settings.core_size = ConfigValue::Text(core_size);
            }
            if let Some(jobs) = jobs {
                settings.n_jobs = ConfigValue::Text(jobs);
            }
            if let Some(cache_root) = cache_root {
                settings.cache_root = cache_root;
            }
            if cache_name.is_some() {
                settings.cache_name = cache_name;
            }

            let config = CompareConfig::new(&settings).context("Rejected configuration")?;
            let comparer = ImageComparer::new(config)?;

            if !json {
                println!("▶ Scanning for duplicates in: {}", path.display());
            }
            let images = scan_directory(&path)?;
            let duplicates = benchmark("comparing images", || comparer.compare(&images))
                .with_context(|| format!("Failed to compare images in {}", path.display()))?;

            if json {
                let paths: Vec<String> = duplicates
                    .iter()
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect();
                println!("{}", serde_json::to_string_pretty(&paths)?);
            } else if duplicates.is_empty() {
                println!("No duplicates found.");
            } else {
                for dup in &duplicates {
                    println!("   ▶ {}", dup.display());
                }
            }
            log::info!(
                "Found {} duplicates in {} files",
                duplicates.len(),
                images.len()
            );
        }
    }

    Ok(())
}

/// Recursively walk `dir`, returning a Vec of image file paths.
fn scan_directory(dir: &Path) -> Result<Vec<PathBuf>> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.set_message("Scanning for images…");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let allowed_exts = ["jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp"];
    let mut images = Vec::new();
    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if path.is_file() {
            if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
                if allowed_exts.contains(&ext.to_lowercase().as_str()) {
                    images.push(path.to_path_buf());
                }
            }
        }
        spinner.tick();
    }
    spinner.finish_and_clear();
    Ok(images)
}

/// Run `f()`, log how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    log::info!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}

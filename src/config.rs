//! Configuration management for the image loader.
//!
//! This module provides:
//! - [`LoaderConfig`], the library configuration (also usable as clap args)
//! - [`MemoryBudget`], an absolute or relative memory-tier budget
//! - The `image-loader` command line ([`Cli`])
//!
//! # Environment Variables
//!
//! Every option can be set with an `IMAGE_LOADER_` environment variable:
//!
//! - `IMAGE_LOADER_CACHE_DIR` - Root of the file tiers (default: none, memory only)
//! - `IMAGE_LOADER_MEMORY` - Memory budget, e.g. `64MB` or `25%` (default: 25%)
//! - `IMAGE_LOADER_WORKERS` - Concurrent pipeline executions (default: 4)
//! - `IMAGE_LOADER_QUEUE` - Admitted tasks waiting for a worker (default: 128)
//! - `IMAGE_LOADER_HTTP_TIMEOUT` - HTTP fetch timeout in seconds (default: 30)
//! - `IMAGE_LOADER_LOG_REQUESTS` - Per-request debug logging (default: false)
//! - `IMAGE_LOADER_VERBOSE` - Debug-level logging for the binary

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand};
use sysinfo::System;
use tracing::warn;

use crate::cache::DEFAULT_MEMORY_CAPACITY;
use crate::decode::SizeMode;
use crate::loader::{CacheFlags, ImageSettings, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};
use crate::source::{ImageSource, DEFAULT_HTTP_TIMEOUT_SECS};

// =============================================================================
// Default Values
// =============================================================================

/// Default memory budget as a fraction of available memory.
pub const DEFAULT_MEMORY_FRACTION: f64 = 0.25;

/// Smallest fraction of available memory the memory tier may use.
pub const MIN_MEMORY_FRACTION: f64 = 0.05;

/// Largest fraction of available memory the memory tier may use.
pub const MAX_MEMORY_FRACTION: f64 = 0.80;

/// Upper bound on worker count.
pub const MAX_WORKERS: usize = 256;

// =============================================================================
// Size Parsing
// =============================================================================

/// Parse a human-readable size ("64MB", "512K", "1048576") into bytes.
///
/// Suffixes are 1024-based and case-insensitive.
pub fn parse_size(s: &str) -> Result<usize, String> {
    let s = s.trim();
    let invalid = || format!("Invalid size '{}' - expected format like '64MB' or '512K'", s);
    if s.is_empty() {
        return Err(invalid());
    }

    let upper = s.to_ascii_uppercase();
    let (num_part, multiplier) = [
        ("GB", 1024_usize * 1024 * 1024),
        ("G", 1024 * 1024 * 1024),
        ("MB", 1024 * 1024),
        ("M", 1024 * 1024),
        ("KB", 1024),
        ("K", 1024),
        ("B", 1),
    ]
    .iter()
    .find(|(suffix, _)| upper.ends_with(suffix))
    .map(|(suffix, mult)| (s[..s.len() - suffix.len()].trim(), *mult))
    .unwrap_or((s, 1));

    let num: usize = num_part.parse().map_err(|_| invalid())?;
    num.checked_mul(multiplier).ok_or_else(invalid)
}

// =============================================================================
// Memory Budget
// =============================================================================

/// Memory-tier budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MemoryBudget {
    /// Fixed number of bytes
    Bytes(usize),
    /// Fraction of the memory available when the loader starts
    Fraction(f64),
}

impl MemoryBudget {
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            MemoryBudget::Bytes(0) => Err("memory budget must be greater than 0".to_string()),
            MemoryBudget::Fraction(f) if !f.is_finite() || f <= 0.0 => {
                Err(format!("memory fraction must be positive, got {}", f))
            }
            _ => Ok(()),
        }
    }

    /// Budget in bytes.
    ///
    /// Fractions are clamped to the supported range and applied to the
    /// currently available system memory.
    pub fn resolve(&self) -> usize {
        match *self {
            MemoryBudget::Bytes(bytes) => bytes,
            MemoryBudget::Fraction(fraction) => {
                let mut sys = System::new();
                sys.refresh_memory();
                Self::fraction_of(fraction, sys.available_memory())
            }
        }
    }

    fn fraction_of(fraction: f64, available: u64) -> usize {
        let clamped = fraction.clamp(MIN_MEMORY_FRACTION, MAX_MEMORY_FRACTION);
        if (clamped - fraction).abs() > f64::EPSILON {
            warn!(
                requested = fraction,
                applied = clamped,
                "Memory fraction out of range, clamped"
            );
        }

        if available == 0 {
            warn!("Available memory unknown, using default memory budget");
            return DEFAULT_MEMORY_CAPACITY;
        }

        ((available as f64 * clamped) as usize).max(1)
    }
}

impl Default for MemoryBudget {
    fn default() -> Self {
        MemoryBudget::Fraction(DEFAULT_MEMORY_FRACTION)
    }
}

impl FromStr for MemoryBudget {
    type Err = String;

    /// Accepts `"25%"`, `"0.25"` or anything [`parse_size`] accepts.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if let Some(percent) = s.strip_suffix('%') {
            let value: f64 = percent
                .trim()
                .parse()
                .map_err(|_| format!("Invalid percentage '{}'", s))?;
            return Ok(MemoryBudget::Fraction(value / 100.0));
        }

        if s.contains('.') {
            let value: f64 = s
                .parse()
                .map_err(|_| format!("Invalid memory fraction '{}'", s))?;
            if value > 1.0 {
                return Err(format!("Memory fraction '{}' must be at most 1.0", s));
            }
            return Ok(MemoryBudget::Fraction(value));
        }

        parse_size(s).map(MemoryBudget::Bytes)
    }
}

impl fmt::Display for MemoryBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryBudget::Bytes(bytes) => write!(f, "{}", bytes),
            MemoryBudget::Fraction(fraction) => write!(f, "{}%", fraction * 100.0),
        }
    }
}

// =============================================================================
// Loader Configuration
// =============================================================================

/// Loader configuration.
#[derive(Args, Debug, Clone)]
pub struct LoaderConfig {
    /// Root directory of the file tiers. Without it only the memory tier is used.
    #[arg(long, env = "IMAGE_LOADER_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Memory tier budget: bytes ("64MB") or a share of available memory ("25%").
    #[arg(long = "memory", default_value = "25%", env = "IMAGE_LOADER_MEMORY")]
    pub memory_budget: MemoryBudget,

    /// Number of concurrent pipeline executions.
    #[arg(long, default_value_t = DEFAULT_WORKERS, env = "IMAGE_LOADER_WORKERS")]
    pub workers: usize,

    /// Number of admitted tasks that may wait for a worker.
    #[arg(long = "queue", default_value_t = DEFAULT_QUEUE_CAPACITY, env = "IMAGE_LOADER_QUEUE")]
    pub queue_capacity: usize,

    /// HTTP fetch timeout in seconds.
    #[arg(long = "http-timeout", default_value_t = DEFAULT_HTTP_TIMEOUT_SECS, env = "IMAGE_LOADER_HTTP_TIMEOUT")]
    pub http_timeout_secs: u64,

    /// Log each request's progress at debug level.
    #[arg(long = "log-requests", default_value_t = false, env = "IMAGE_LOADER_LOG_REQUESTS")]
    pub logging: bool,
}

impl LoaderConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.memory_budget.validate()?;

        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(format!("workers must be between 1 and {}", MAX_WORKERS));
        }

        if self.http_timeout_secs == 0 {
            return Err("http_timeout_secs must be greater than 0".to_string());
        }

        if let Some(dir) = &self.cache_dir {
            if dir.as_os_str().is_empty() {
                return Err("cache_dir must not be empty".to_string());
            }
        }

        Ok(())
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            memory_budget: MemoryBudget::default(),
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            logging: false,
        }
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// Image Loader - load, scale and cache images.
#[derive(Parser, Debug)]
#[command(name = "image-loader")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false, env = "IMAGE_LOADER_VERBOSE")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load one image through the cache tiers and write it as PNG.
    Load(LoadArgs),
    /// Show file-tier usage as JSON.
    Stats(CacheArgs),
    /// Trim the file tiers to a byte budget, oldest files first.
    Prune(PruneArgs),
    /// Remove every file-tier entry.
    Clear(CacheArgs),
}

/// Arguments for `load`.
#[derive(Args, Debug, Clone)]
pub struct LoadArgs {
    /// File path or http(s) URL of the image.
    pub source: String,

    /// Where to write the loaded image (PNG).
    #[arg(short, long)]
    pub output: PathBuf,

    /// Requested width in pixels (0 = unconstrained).
    #[arg(long, default_value_t = 0)]
    pub width: u32,

    /// Requested height in pixels (0 = unconstrained).
    #[arg(long, default_value_t = 0)]
    pub height: u32,

    /// How the image is fitted to the requested box.
    #[arg(long, value_enum, default_value_t = SizeMode::Fill)]
    pub mode: SizeMode,

    /// Extra subsampling steps applied on top of the computed one.
    #[arg(long, default_value_t = 0)]
    pub downsample: u32,

    /// Allow enlarging images smaller than the requested box.
    #[arg(long, default_value_t = false)]
    pub scale_up: bool,

    /// Skip the memory tier.
    #[arg(long, default_value_t = false)]
    pub no_memory: bool,

    /// Skip the processed-file tier.
    #[arg(long, default_value_t = false)]
    pub no_processed: bool,

    /// Skip the original-file tier.
    #[arg(long, default_value_t = false)]
    pub no_original: bool,

    #[command(flatten)]
    pub loader: LoaderConfig,
}

impl LoadArgs {
    /// The source named on the command line.
    pub fn image_source(&self) -> ImageSource {
        let raw = self.source.trim();
        let lower = raw.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            ImageSource::url(raw)
        } else {
            ImageSource::file(raw)
        }
    }

    pub fn settings(&self) -> ImageSettings {
        ImageSettings::new()
            .size(self.width, self.height)
            .size_mode(self.mode)
            .downsample_by(self.downsample)
            .scale_up(self.scale_up)
            .flags(CacheFlags {
                use_memory: !self.no_memory,
                use_file_processed: !self.no_processed,
                use_file_original: !self.no_original,
            })
    }
}

/// Arguments shared by the cache maintenance commands.
#[derive(Args, Debug, Clone)]
pub struct CacheArgs {
    /// Root directory of the file tiers.
    #[arg(long, env = "IMAGE_LOADER_CACHE_DIR")]
    pub cache_dir: PathBuf,
}

/// Arguments for `prune`.
#[derive(Args, Debug, Clone)]
pub struct PruneArgs {
    #[command(flatten)]
    pub cache: CacheArgs,

    /// Byte budget per file tier, e.g. "500MB".
    #[arg(long, value_parser = parse_size, env = "IMAGE_LOADER_MAX_SIZE")]
    pub max_size: usize,
}

// =============================================================================
// Tests
// =============================================================================

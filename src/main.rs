//! Image Loader - load, scale and cache images from the command line.
//!
//! `load` runs one image through the full engine; `stats`, `prune` and
//! `clear` maintain the file tiers of a cache directory.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use image_loader::{
    cache::{TieredCache, DEFAULT_MEMORY_CAPACITY},
    config::{CacheArgs, Cli, Command, LoadArgs, PruneArgs},
    Bitmap, ImageLoader, LoadOutcome, Slot, TaskState,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Load(args) => run_load(args).await,
        Command::Stats(args) => run_stats(args).await,
        Command::Prune(args) => run_prune(args).await,
        Command::Clear(args) => run_clear(args).await,
    }
}

// =============================================================================
// Load Command
// =============================================================================

/// Slot that keeps the last bitmap it was shown.
#[derive(Default)]
struct CaptureSlot {
    bitmap: Mutex<Option<Bitmap>>,
}

impl CaptureSlot {
    fn bitmap(&self) -> Option<Bitmap> {
        self.bitmap.lock().ok().and_then(|b| b.clone())
    }
}

impl Slot for CaptureSlot {
    fn show_image(&self, bitmap: Bitmap) {
        if let Ok(mut current) = self.bitmap.lock() {
            *current = Some(bitmap);
        }
    }
}

async fn run_load(args: LoadArgs) -> ExitCode {
    if let Err(e) = args.loader.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let loader = match ImageLoader::from_config(&args.loader).await {
        Ok(loader) => loader,
        Err(e) => {
            error!("Failed to initialize loader: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let source = args.image_source();
    let settings = args.settings();
    let capture = Arc::new(CaptureSlot::default());
    let slot: Arc<dyn Slot> = capture.clone();

    info!("Loading {}", source);

    let state = match loader.load(&slot, source.clone(), Some(&settings)).await {
        LoadOutcome::MemoryHit => TaskState::Delivered,
        LoadOutcome::Started(handle) | LoadOutcome::AlreadyLoading(handle) => {
            let state = handle.finished().await;
            if let Some(e) = handle.error() {
                error!("Failed to load {}: {}", source, e);
                return ExitCode::FAILURE;
            }
            state
        }
        LoadOutcome::Invalid(e) => {
            error!("Invalid source {}: {}", source, e);
            return ExitCode::FAILURE;
        }
        LoadOutcome::Rejected => {
            error!("Loader rejected the request");
            return ExitCode::FAILURE;
        }
        LoadOutcome::Superseded => {
            error!("Request was superseded");
            return ExitCode::FAILURE;
        }
    };

    let Some(bitmap) = capture.bitmap() else {
        error!("No image was delivered for {}", source);
        return ExitCode::FAILURE;
    };

    if let Err(e) = write_png(&bitmap, &args.output).await {
        error!("Failed to write {}: {}", args.output.display(), e);
        return ExitCode::FAILURE;
    }

    let summary = serde_json::json!({
        "source": source.to_string(),
        "output": args.output,
        "width": bitmap.width(),
        "height": bitmap.height(),
        "state": state,
        "cache": loader.cache().stats().await,
    });
    print_json(&summary)
}

async fn write_png(bitmap: &Bitmap, output: &Path) -> Result<(), String> {
    let bitmap = bitmap.clone();
    let output: PathBuf = output.to_path_buf();
    tokio::task::spawn_blocking(move || {
        bitmap
            .image()
            .save_with_format(&output, image::ImageFormat::Png)
            .map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| e.to_string())?
}

// =============================================================================
// Cache Maintenance Commands
// =============================================================================

async fn open_cache(dir: &Path) -> Result<TieredCache, ExitCode> {
    TieredCache::open(dir, DEFAULT_MEMORY_CAPACITY)
        .await
        .map_err(|e| {
            error!("Failed to open cache at {}: {}", dir.display(), e);
            ExitCode::FAILURE
        })
}

async fn run_stats(args: CacheArgs) -> ExitCode {
    let cache = match open_cache(&args.cache_dir).await {
        Ok(cache) => cache,
        Err(code) => return code,
    };
    print_json(&cache.stats().await)
}

async fn run_prune(args: PruneArgs) -> ExitCode {
    let cache = match open_cache(&args.cache.cache_dir).await {
        Ok(cache) => cache,
        Err(code) => return code,
    };

    match cache.prune_files(args.max_size as u64).await {
        Ok(result) => {
            info!(
                "Pruned {} entries ({} bytes) in {}ms",
                result.entries_removed, result.bytes_freed, result.duration_ms
            );
            print_json(&result)
        }
        Err(e) => {
            error!("Prune failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_clear(args: CacheArgs) -> ExitCode {
    let cache = match open_cache(&args.cache_dir).await {
        Ok(cache) => cache,
        Err(code) => return code,
    };

    match cache.clear().await {
        Ok(result) => {
            info!("Removed {} entries", result.entries_removed);
            print_json(&result)
        }
        Err(e) => {
            error!("Clear failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn print_json<T: serde::Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize output: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "image_loader=debug"
    } else {
        "image_loader=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

//! Exposes the command line application.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use texcache::TextureCache;
use texcache::caching::CachePolicy;
use texcache::config::Config;
use texcache::legacy::{self, LegacyRecord};
use texcache::pixbuf::{Bounds, file_uri};
use texcache::texture::{SoftwareRenderer, Texture};
use texcache::{logging, metrics};

#[derive(Debug, Subcommand)]
enum Command {
    /// Decode an image file, optionally scaled to fit the given bounds.
    Load {
        path: PathBuf,

        #[arg(long)]
        width: Option<u32>,

        #[arg(long)]
        height: Option<u32>,
    },

    /// Create the thumbnail of a file.
    Thumbnail {
        path: PathBuf,

        /// The edge length of the square thumbnail.
        #[arg(long, default_value_t = 128)]
        size: u32,

        #[arg(long = "mime-type", default_value = "image/png")]
        mime_type: String,
    },

    /// List the records of a legacy cache file.
    Legacy { path: PathBuf },
}

/// A utility to inspect how images are loaded into textures.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Path to your configuration file.
    #[arg(long, short, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct TextureInfo {
    uri: String,
    width: u32,
    height: u32,
    format: String,
}

impl TextureInfo {
    fn new(uri: String, texture: &Texture) -> Self {
        Self {
            uri,
            width: texture.width(),
            height: texture.height(),
            format: format!("{:?}", texture.format()),
        }
    }
}

#[derive(Debug, Serialize)]
struct LegacyReport {
    registered: usize,
    records: Vec<LegacyRecord>,
}

fn decode_runtime(config: &Config) -> Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(threads) = config.decode_threads {
        builder.worker_threads(threads);
    }
    builder
        .thread_name("texcache-decode")
        .enable_all()
        .build()
        .context("failed to create the decode runtime")
}

fn load(cache: &TextureCache, path: &Path, bounds: Bounds) -> Result<TextureInfo> {
    let uri = file_uri(path)?;
    let texture = cache
        .load_uri_sync_to_texture(CachePolicy::None, &uri, bounds)
        .with_context(|| format!("failed to load {}", path.display()))?;
    Ok(TextureInfo::new(uri, &texture))
}

fn thumbnail(cache: &TextureCache, path: &Path, size: u32, mime_type: &str) -> Result<TextureInfo> {
    let uri = file_uri(path)?;
    let renderable = cache.load_thumbnail(size, &uri, mime_type);
    cache.wait_for_pending();
    let texture = renderable
        .texture()
        .with_context(|| format!("failed to create a thumbnail of {}", path.display()))?;
    Ok(TextureInfo::new(uri, &texture))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

/// Runs the main application.
pub fn execute() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::get(cli.config.as_deref()).context("failed loading config")?;

    // SAFETY: No other threads are running yet.
    unsafe { logging::init_logging(&config) };
    if let Some(ref statsd) = config.metrics.statsd {
        metrics::configure_statsd(
            &config.metrics.prefix,
            statsd.as_str(),
            config.metrics.custom_tags.clone(),
        )
        .context("failed to configure statsd")?;
    }

    let runtime = decode_runtime(&config)?;
    let cache = TextureCache::new(
        &config,
        Arc::new(SoftwareRenderer::new()),
        runtime.handle().clone(),
    );
    for path in &config.legacy_cache_files {
        let registered = cache.load_legacy_cache_file(path);
        tracing::info!(path = %path.display(), registered, "loaded legacy cache file");
    }

    match cli.command {
        Command::Load {
            path,
            width,
            height,
        } => print_json(&load(&cache, &path, Bounds::new(width, height))?),
        Command::Thumbnail {
            path,
            size,
            mime_type,
        } => print_json(&thumbnail(&cache, &path, size, &mime_type)?),
        Command::Legacy { path } => {
            let records = legacy::read_cache_file(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let registered = cache.load_legacy_cache_file(&path);
            print_json(&LegacyReport {
                registered,
                records,
            })
        }
    }
}

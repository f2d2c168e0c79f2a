use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, de};
use tracing::level_filters::LevelFilter;

/// How log lines are written to stderr.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// `pretty` when stderr is a terminal, `simplified` otherwise.
    Auto,
    Pretty,
    /// Compact lines without colors.
    Simplified,
    /// One JSON object per line.
    Json,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// Applies unless `RUST_LOG` is set.
    #[serde(deserialize_with = "level_filter")]
    pub level: LevelFilter,
    pub format: LogFormat,
    /// Sets `RUST_BACKTRACE=1` on startup.
    pub enable_backtraces: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
            enable_backtraces: true,
        }
    }
}

/// Where cache metrics are reported to.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// `host:port` of a statsd server. Defaults to `$STATSD_SERVER`.
    pub statsd: Option<String>,
    /// Prepended to every metric name.
    pub prefix: String,
    /// Tags attached to every metric.
    pub custom_tags: BTreeMap<String, String>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            statsd: env::var("STATSD_SERVER").ok(),
            prefix: "texcache".into(),
            custom_tags: BTreeMap::new(),
        }
    }
}

/// Controls where and how thumbnails are generated.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Thumbnails {
    /// The directory thumbnails and failure markers are stored in.
    ///
    /// Thumbnail loads fail if this is not set.
    pub cache_dir: Option<PathBuf>,
    /// The edge length of generated thumbnails, in pixels.
    pub size: u32,
    /// Source files larger than this many bytes are not thumbnailed.
    pub max_source_size: Option<u64>,
}

impl Default for Thumbnails {
    fn default() -> Self {
        Thumbnails {
            cache_dir: default_thumbnail_dir(),
            size: 256,
            max_source_size: None,
        }
    }
}

/// The per-user thumbnail directory, `$XDG_CACHE_HOME/thumbnails` or
/// `$HOME/.cache/thumbnails`.
fn default_thumbnail_dir() -> Option<PathBuf> {
    let cache_home = env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))?;
    Some(cache_home.join("thumbnails"))
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration for internal logging.
    pub logging: Logging,

    /// Configuration for reporting metrics to a statsd instance.
    pub metrics: Metrics,

    /// The number of threads used for decoding images.
    ///
    /// Defaults to the number of available cores.
    pub decode_threads: Option<usize>,

    /// Configuration for thumbnail generation.
    pub thumbnails: Thumbnails,

    /// Legacy cache files that are loaded on startup.
    pub legacy_cache_files: Vec<PathBuf>,
}

impl Config {
    /// Reads the config from the YAML file at `path`, or uses the defaults without a path.
    pub fn get(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            ),
            None => Ok(Config::default()),
        }
    }

    fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut yaml = String::new();
        reader
            .read_to_string(&mut yaml)
            .context("failed reading config file")?;
        // empty documents are rejected, even though every section has a default
        if yaml.trim().is_empty() {
            anyhow::bail!("config file empty");
        }
        serde_yaml::from_str(&yaml).context("failed to parse config YAML")
    }
}

const LEVELS: &[&str] = &["off", "error", "warn", "info", "debug", "trace"];

fn level_filter<'de, D: Deserializer<'de>>(deserializer: D) -> Result<LevelFilter, D::Error> {
    let level = String::deserialize(deserializer)?;
    level
        .parse()
        .map_err(|_| de::Error::unknown_variant(&level, LEVELS))
}

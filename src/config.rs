//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$EMLSHELF_CONFIG` (environment variable)
//! 2. `~/.config/emlshelf/config.toml` (Linux/macOS)
//!    `%APPDATA%\emlshelf\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Where the emails live and where the catalog is stored.
    pub paths: PathsConfig,
    /// Indexing pipeline tuning.
    pub indexing: IndexingConfig,
    /// Conversation traversal bounds.
    pub threading: ThreadingConfig,
    /// Terminal output settings.
    pub display: DisplayConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root directory scanned for message files.
    pub emails_dir: PathBuf,
    /// SQLite catalog file.
    pub database: PathBuf,
}

/// Indexing pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Parse workers (`None` = 2 × available parallelism).
    pub workers: Option<usize>,
    /// Records per flush transaction.
    pub batch_size: usize,
    /// Maximum time a partial batch waits before it is flushed, in milliseconds.
    pub flush_interval_ms: u64,
    /// Capacity of the queue between the workers and the writer.
    pub queue_capacity: usize,
    /// Maximum bytes of body text kept for the search index.
    pub preview_max_bytes: usize,
    /// Paths per existence query (kept below SQLite's bound-parameter limit).
    pub existence_chunk_size: usize,
    /// File extension of message files, matched case-insensitively.
    pub extension: String,
}

/// Conversation traversal bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadingConfig {
    /// Maximum `In-Reply-To` hops when looking for a thread root.
    pub max_root_hops: usize,
    /// Maximum depth of a built conversation tree.
    pub max_tree_depth: usize,
}

/// Terminal output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// `strftime` format string for dates.
    pub date_format: String,
    /// Rows per page in listings.
    pub page_size: usize,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            emails_dir: PathBuf::from("./emails"),
            database: PathBuf::from("./db/emails.db"),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            workers: None,
            batch_size: 50,
            flush_interval_ms: 500,
            queue_capacity: 100,
            preview_max_bytes: 10 * 1024, // 10 KB
            existence_chunk_size: 500,
            extension: "eml".to_string(),
        }
    }
}

impl Default for ThreadingConfig {
    fn default() -> Self {
        Self {
            max_root_hops: 100,
            max_tree_depth: 50,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            date_format: "%Y-%m-%d %H:%M".to_string(),
            page_size: 50,
        }
    }
}

impl IndexingConfig {
    /// Effective worker count: the configured value, or 2 × available parallelism. Never 0.
    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get() * 2)
                    .unwrap_or(2)
            })
            .max(1)
    }

    /// Flush interval as a [`Duration`].
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> anyhow::Result<()> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("EMLSHELF_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("emlshelf").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("emlshelf")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("emlshelf.log")
}

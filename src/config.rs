//! TOML configuration for the service and the command-line tool.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::{StoreOptions, DEFAULT_INITIAL_CAPACITY};

/// File name of the link store when no path is configured.
pub const DEFAULT_DB_FILE: &str = "db.links";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Link store settings.
    pub store: StoreSection,
    /// Crawler settings.
    pub crawl: CrawlSection,
    /// Logging settings.
    pub log: LogSection,
}

/// `[store]` section.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreSection {
    /// Backing file of the link store.
    pub path: PathBuf,
    /// Link slots reserved by a fresh store.
    pub initial_capacity: u64,
    /// Optional cap on link slots.
    pub max_capacity: Option<u64>,
    /// Sync the file before releasing it.
    pub sync_on_dispose: bool,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_FILE),
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            max_capacity: None,
            sync_on_dispose: true,
        }
    }
}

/// `[crawl]` section.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CrawlSection {
    /// Pages crawled more recently than this are skipped.
    pub recrawl_window_secs: u64,
    /// Pause between two page fetches of the bundled file fetcher.
    pub politeness_delay_ms: u64,
}

impl Default for CrawlSection {
    fn default() -> Self {
        Self {
            recrawl_window_secs: 24 * 60 * 60,
            politeness_delay_ms: 0,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogSection {
    /// Filter directive, e.g. `info` or `doubletdb=debug`.
    pub level: String,
    /// Optional file receiving a copy of every event.
    pub file: Option<PathBuf>,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Loads `explicit`, or the default config file when it exists, or the
    /// built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => read_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => read_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Parses configuration text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|source| ConfigError::Serialize { source })
    }

    /// Writes the configuration to `path`, creating parent directories.
    pub fn persist(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let serialized = self.to_toml()?;
        fs::write(path, serialized).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Store options derived from the `[store]` section.
    pub fn store_options(&self) -> StoreOptions {
        let mut options = StoreOptions::file(&self.store.path)
            .initial_capacity(self.store.initial_capacity)
            .sync_on_dispose(self.store.sync_on_dispose);
        if let Some(max) = self.store.max_capacity {
            options = options.max_capacity(max);
        }
        options
    }

    /// Freshness window of the crawler.
    pub fn recrawl_window(&self) -> time::Duration {
        time::Duration::seconds(i64::try_from(self.crawl.recrawl_window_secs).unwrap_or(i64::MAX))
    }

    /// Delay between page fetches.
    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.crawl.politeness_delay_ms)
    }
}

fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Errors raised while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the file failed.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`Config`].
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
    /// Serializing the configuration failed.
    #[error("failed to serialize config: {source}")]
    Serialize {
        /// Underlying error.
        source: toml::ser::Error,
    },
    /// Writing the file failed.
    #[error("failed to write config {path}: {source}")]
    Write {
        /// File that was written.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Creating the parent directory failed.
    #[error("failed to create config directory {path}: {source}")]
    CreateDir {
        /// Directory that was created.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// `<config dir>/doubletdb/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("doubletdb").join("config.toml"))
}

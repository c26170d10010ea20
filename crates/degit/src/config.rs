//! Runtime configuration
//!
//! Settings come from, in increasing priority:
//! 1. built-in defaults
//! 2. a TOML file (`$DEGIT_CONFIG`, else `~/.degit/config.toml` if present)
//! 3. `DEGIT_CACHE_DIR` / `DEGIT_MAX_REDIRECTS` environment variables
//!
//! ```toml
//! cache_dir = "/var/cache/degit"
//! timeout_secs = 60
//! max_redirects = 5
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "DEGIT_CONFIG";

/// Environment variable overriding the cache directory
pub const CACHE_DIR_ENV: &str = "DEGIT_CACHE_DIR";

/// Environment variable overriding the redirect limit
pub const MAX_REDIRECTS_ENV: &str = "DEGIT_MAX_REDIRECTS";

/// Default HTTP request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on followed redirects per download
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("invalid config {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Environment override could not be parsed
    #[error("invalid value `{value}` for {key}")]
    InvalidValue { key: String, value: String },
}

/// On-disk shape of the config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    cache_dir: Option<PathBuf>,
    timeout_secs: Option<u64>,
    max_redirects: Option<usize>,
    user_agent: Option<String>,
}

/// Resolved configuration passed to the cache and fetcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root of the archive cache
    pub cache_dir: PathBuf,
    /// Per-request HTTP timeout
    pub timeout: Duration,
    /// Maximum redirects followed for one archive download
    pub max_redirects: usize,
    /// User-Agent header sent with archive requests
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            timeout: DEFAULT_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            user_agent: format!("degit/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Config {
    /// Load configuration from the default file location and the process
    /// environment
    pub fn load() -> Result<Self, ConfigError> {
        let env = |key: &str| std::env::var(key).ok();
        let path = env(CONFIG_ENV).map(PathBuf::from).or_else(|| {
            let default = home_or_tmp().join(".degit").join("config.toml");
            default.is_file().then_some(default)
        });
        Self::load_from(path.as_deref(), env)
    }

    /// Load configuration from an optional file and an environment lookup
    pub fn load_from(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = path {
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let file: ConfigFile = toml::from_str(&contents).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })?;
            config.apply(file);
        }

        if let Some(dir) = env(CACHE_DIR_ENV).filter(|v| !v.is_empty()) {
            config.cache_dir = PathBuf::from(dir);
        }
        if let Some(value) = env(MAX_REDIRECTS_ENV) {
            config.max_redirects = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: MAX_REDIRECTS_ENV.to_string(),
                value,
            })?;
        }

        Ok(config)
    }

    /// Override the cache directory
    pub fn with_cache_dir(mut self, cache_dir: PathBuf) -> Self {
        self.cache_dir = cache_dir;
        self
    }

    fn apply(&mut self, file: ConfigFile) {
        if let Some(dir) = file.cache_dir {
            self.cache_dir = dir;
        }
        if let Some(secs) = file.timeout_secs {
            self.timeout = Duration::from_secs(secs);
        }
        if let Some(max) = file.max_redirects {
            self.max_redirects = max;
        }
        if let Some(agent) = file.user_agent {
            self.user_agent = agent;
        }
    }
}

/// The user's home directory, or the system temp directory when there is none
pub fn home_or_tmp() -> PathBuf {
    dirs::home_dir()
        .filter(|h| !h.as_os_str().is_empty())
        .unwrap_or_else(std::env::temp_dir)
}

/// Default cache root (`~/.degit/cache`)
pub fn default_cache_dir() -> PathBuf {
    home_or_tmp().join(".degit").join("cache")
}

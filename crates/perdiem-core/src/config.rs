//! Configuration management for the per-diem rate extractor.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use crate::types::RateBounds;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Placeholder substituted with the location code in
/// [`UpstreamConfig::session_url`].
pub const CODE_PLACEHOLDER: &str = "{code}";

/// Main application configuration.
///
/// This is loaded from `~/.config/perdiem/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Upstream rate site endpoints and HTTP settings
    pub upstream: UpstreamConfig,
    /// Retry policy for upstream lookups
    pub retry: RetryConfig,
    /// Sanity bounds for extracted rates
    pub bounds: RateBounds,
    /// Rate cache settings
    pub cache: CacheConfig,
    /// Batch driver settings
    pub batch: BatchConfig,
}

impl AppConfig {
    /// Load configuration from the default location, falling back to
    /// defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit path.
    ///
    /// Unlike [`AppConfig::load`], a missing file is an error here.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }

        tracing::debug!("Loading config from {}", path.display());
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides and validate it.
    ///
    /// Supports the following environment variables:
    /// - `PERDIEM_SESSION_URL`: Override the session redirect URL template
    /// - `PERDIEM_FORM_URL`: Override the rate form URL
    /// - `PERDIEM_TIMEOUT_SECS`: Override the per-request timeout
    /// - `PERDIEM_CACHE_BACKEND`: Override the cache backend (memory/file/sqlite)
    /// - `PERDIEM_CACHE_PATH`: Override the cache file or database path
    /// - `PERDIEM_REQUEST_GAP_MS`: Override the batch inter-request gap
    pub fn load_with_env(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => Self::load()?,
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup function.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("PERDIEM_SESSION_URL") {
            tracing::debug!("Override upstream.session_url from env: {}", url);
            self.upstream.session_url = url;
        }

        if let Some(url) = lookup("PERDIEM_FORM_URL") {
            tracing::debug!("Override upstream.form_url from env: {}", url);
            self.upstream.form_url = url;
        }

        if let Some(val) = lookup("PERDIEM_TIMEOUT_SECS") {
            match val.parse() {
                Ok(secs) => {
                    self.upstream.timeout_secs = secs;
                    tracing::debug!("Override upstream.timeout_secs from env: {}", secs);
                }
                Err(_) => tracing::warn!("Ignoring invalid PERDIEM_TIMEOUT_SECS: {}", val),
            }
        }

        if let Some(val) = lookup("PERDIEM_CACHE_BACKEND") {
            match val.parse() {
                Ok(backend) => {
                    self.cache.backend = backend;
                    tracing::debug!("Override cache.backend from env: {}", backend);
                }
                Err(e) => tracing::warn!("Ignoring PERDIEM_CACHE_BACKEND: {}", e),
            }
        }

        if let Some(path) = lookup("PERDIEM_CACHE_PATH") {
            tracing::debug!("Override cache.path from env: {}", path);
            self.cache.path = Some(PathBuf::from(path));
        }

        if let Some(val) = lookup("PERDIEM_REQUEST_GAP_MS") {
            match val.parse() {
                Ok(ms) => {
                    self.batch.request_gap_ms = ms;
                    tracing::debug!("Override batch.request_gap_ms from env: {}", ms);
                }
                Err(_) => tracing::warn!("Ignoring invalid PERDIEM_REQUEST_GAP_MS: {}", val),
            }
        }
    }

    /// Check values that would make lookups impossible.
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.upstream.session_url.contains(CODE_PLACEHOLDER) {
            return Err(ConfigError::InvalidValue {
                field: "upstream.session_url".to_string(),
                reason: format!("must contain the {CODE_PLACEHOLDER} placeholder"),
            });
        }
        if self.upstream.form_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "upstream.form_url".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.upstream.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "upstream.timeout_secs".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.cache.staleness_hours == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.staleness_hours".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/perdiem/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs = project_dirs()?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the cache directory path.
    ///
    /// Uses XDG base directories: `~/.cache/perdiem`
    pub fn cache_dir() -> ConfigResult<PathBuf> {
        let dirs = project_dirs()?;
        Ok(dirs.cache_dir().to_path_buf())
    }

    /// Resolve where the configured cache backend keeps its data.
    ///
    /// Returns `None` for the in-memory backend.
    pub fn resolved_cache_path(&self) -> ConfigResult<Option<PathBuf>> {
        let file_name = match self.cache.backend {
            CacheBackend::Memory => return Ok(None),
            CacheBackend::File => "rates.json",
            CacheBackend::Sqlite => "rates.db",
        };

        match &self.cache.path {
            Some(path) => Ok(Some(path.clone())),
            None => Ok(Some(Self::cache_dir()?.join(file_name))),
        }
    }
}

fn project_dirs() -> ConfigResult<ProjectDirs> {
    ProjectDirs::from("gov", "medevac", "perdiem").ok_or(ConfigError::NoConfigDir)
}

/// Upstream rate site endpoints and HTTP settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Redirect URL that issues the session cookie; `{code}` is replaced by
    /// the location code
    pub session_url: String,
    /// Form page URL, fetched with GET and submitted with POST
    pub form_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// User agent string
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            session_url: "https://aoprals.state.gov/Web920/location_action.asp?MenuHide=1&PostCode={code}"
                .to_string(),
            form_url: "https://aoprals.state.gov/Web920/per_diem_action.asp".to_string(),
            timeout_secs: 15,
            user_agent: "Mozilla/5.0 (compatible; perdiem/0.1; +https://github.com/medevac-travel/perdiem)"
                .to_string(),
        }
    }
}

impl UpstreamConfig {
    /// Request timeout as a `Duration`.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retry policy settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total pipeline attempts per lookup, including the first
    pub max_attempts: u32,
    /// Linear backoff base in milliseconds (delay before retry n is base * n)
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
        }
    }
}

/// Storage medium for the rate cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// Process memory, lost on exit
    #[default]
    Memory,
    /// JSON document on disk
    File,
    /// `SQLite` database
    Sqlite,
}

impl fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Sqlite => "sqlite",
        };
        write!(f, "{name}")
    }
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" | "json" => Ok(Self::File),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!("unknown cache backend '{other}'")),
        }
    }
}

/// Rate cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Storage medium
    pub backend: CacheBackend,
    /// File or database path; defaults under the XDG cache directory
    pub path: Option<PathBuf>,
    /// Hours after which a cached record is no longer preferred
    pub staleness_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            path: None,
            staleness_hours: 24,
        }
    }
}

impl CacheConfig {
    /// Staleness window as a `chrono::Duration`.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn staleness_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.staleness_hours as i64)
    }
}

/// Batch driver settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Minimum delay between successive upstream-bound lookups, in milliseconds
    pub request_gap_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            request_gap_ms: 1000,
        }
    }
}

impl BatchConfig {
    /// Request gap as a `Duration`.
    #[must_use]
    pub fn request_gap(&self) -> Duration {
        Duration::from_millis(self.request_gap_ms)
    }
}

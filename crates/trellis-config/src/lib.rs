//! Host configuration for the Trellis extension manager.
//!
//! Embedding applications load one [`Config`] per process and hand it to the
//! extension manager and the management commands. Configuration is read from
//! an optional TOML file with environment-variable overrides, so containers
//! can adjust individual knobs without shipping a file.
//!
//! The configuration deliberately stays small: where media lives on disk,
//! where lock files go, which extensions start enabled by default, and how
//! the host should log.

mod defaults;
mod logging;
mod paths;

use std::env;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::defaults::{
    DEFAULT_CACHE_KEY_PREFIX, DEFAULT_LOG_FILTER, default_cache_key_prefix, default_lock_dir,
    default_log_filter, default_log_filter_string, default_log_format,
};
pub use crate::logging::{LogFormat, LogFormatParseError};
pub use crate::paths::{MediaPaths, MediaPathsError};

/// Environment variable overriding the media root.
const ENV_MEDIA_ROOT: &str = "TRELLIS_MEDIA_ROOT";
/// Environment variable overriding the manage-media flag.
const ENV_MANAGE_MEDIA: &str = "TRELLIS_MANAGE_MEDIA";
/// Environment variable overriding the log filter.
const ENV_LOG_FILTER: &str = "TRELLIS_LOG_FILTER";

/// Resolved host configuration.
///
/// Constructed via [`Config::load`] in binaries or [`Config::default`] plus
/// the setters in tests and embedded hosts.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Whether the host manages static media on disk at all. Development
    /// setups serving straight from source trees leave this off.
    manage_media: bool,
    /// Directory receiving one installed media tree per extension.
    media_root: Option<Utf8PathBuf>,
    /// Directory for media-install lock files.
    lock_dir: Utf8PathBuf,
    /// Extension ids enabled automatically when first discovered.
    default_enabled: Vec<String>,
    /// Prefix for the generation-counter cache keys, namespacing multiple
    /// deployments sharing one cache backend.
    cache_key_prefix: String,
    /// Log filter expression for the host's tracing subscriber.
    log_filter: String,
    /// Log output format for the host's tracing subscriber.
    log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manage_media: false,
            media_root: None,
            lock_dir: default_lock_dir(),
            default_enabled: Vec::new(),
            cache_key_prefix: default_cache_key_prefix(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Loads configuration from the default file location, applying
    /// environment overrides.
    ///
    /// The file lives at `<config dir>/trellis/config.toml`; a missing file
    /// yields the defaults rather than an error.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the file exists but cannot be read or
    /// parsed, or when an environment override holds an invalid value.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match default_config_file() {
            Some(path) if path.as_std_path().exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides(|name| env::var(name).ok())?;
        Ok(config)
    }

    /// Loads configuration from an explicit TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read or
    /// [`ConfigError::Parse`] when its contents are not valid TOML.
    pub fn from_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the document is malformed.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse { source })
    }

    /// Applies environment-variable overrides through the provided lookup.
    ///
    /// Injected lookup keeps tests hermetic; production callers pass a
    /// closure over [`std::env::var`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] when an override value does
    /// not parse.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(ENV_MEDIA_ROOT) {
            self.media_root = Some(Utf8PathBuf::from(root));
        }
        if let Some(flag) = lookup(ENV_MANAGE_MEDIA) {
            self.manage_media = parse_bool(ENV_MANAGE_MEDIA, &flag)?;
        }
        if let Some(filter) = lookup(ENV_LOG_FILTER) {
            self.log_filter = filter;
        }
        Ok(())
    }

    /// Whether the host manages static media on disk.
    #[must_use]
    pub const fn manage_media(&self) -> bool {
        self.manage_media
    }

    /// Enables or disables on-disk media management.
    pub const fn set_manage_media(&mut self, manage: bool) {
        self.manage_media = manage;
    }

    /// Directory receiving installed media trees, when configured.
    #[must_use]
    pub fn media_root(&self) -> Option<&Utf8Path> {
        self.media_root.as_deref()
    }

    /// Sets the media root directory.
    pub fn set_media_root(&mut self, root: Option<Utf8PathBuf>) {
        self.media_root = root;
    }

    /// Directory for media-install lock files.
    #[must_use]
    pub fn lock_dir(&self) -> &Utf8Path {
        self.lock_dir.as_path()
    }

    /// Sets the lock-file directory.
    pub fn set_lock_dir(&mut self, dir: Utf8PathBuf) {
        self.lock_dir = dir;
    }

    /// Extension ids enabled automatically on first discovery.
    #[must_use]
    pub fn default_enabled(&self) -> &[String] {
        &self.default_enabled
    }

    /// Replaces the default-enabled allow-list.
    pub fn set_default_enabled(&mut self, ids: Vec<String>) {
        self.default_enabled = ids;
    }

    /// Prefix for generation-counter cache keys.
    #[must_use]
    pub fn cache_key_prefix(&self) -> &str {
        &self.cache_key_prefix
    }

    /// Log filter expression for the tracing subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format for the tracing subscriber.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

/// Default configuration file path, when a config directory exists.
fn default_config_file() -> Option<Utf8PathBuf> {
    let dir = dirs::config_dir()?;
    let mut path = Utf8PathBuf::from_path_buf(dir).ok()?;
    path.push("trellis");
    path.push("config.toml");
    Some(path)
}

/// Parses a boolean override value, accepting the conventional spellings.
fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidOverride {
            name: name.to_owned(),
            value: value.to_owned(),
        }),
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration file '{path}': {source}")]
    Read {
        /// File that was opened.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration file was not valid TOML.
    #[error("failed to parse configuration: {source}")]
    Parse {
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
    /// An environment override held an unusable value.
    #[error("environment override {name} has invalid value '{value}'")]
    InvalidOverride {
        /// Variable name.
        name: String,
        /// Offending value.
        value: String,
    },
}

#[cfg(test)]
mod tests;

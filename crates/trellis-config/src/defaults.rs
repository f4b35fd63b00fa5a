//! Default values shared by the library and the management-command surface.

use std::env;

use camino::Utf8PathBuf;

use crate::logging::LogFormat;

/// Default log filter expression used by embedding binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Cache key prefix under which generation counters are stored.
pub const DEFAULT_CACHE_KEY_PREFIX: &str = "trellis-extensions";

/// Default log filter expression used by embedding binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for embedding binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Owned cache key prefix used where allocation is required (e.g. serde).
#[must_use]
pub fn default_cache_key_prefix() -> String {
    DEFAULT_CACHE_KEY_PREFIX.to_owned()
}

/// Computes the default directory for media-install lock files.
///
/// Falls back to the system temporary directory when it is not valid UTF-8,
/// matching the behaviour administrators see on stock deployments.
#[must_use]
pub fn default_lock_dir() -> Utf8PathBuf {
    let mut dir = Utf8PathBuf::from_path_buf(env::temp_dir())
        .unwrap_or_else(|_| Utf8PathBuf::from("/tmp"));
    dir.push("trellis");
    dir
}

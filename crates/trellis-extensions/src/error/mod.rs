//! Domain errors raised by extension-management operations.
//!
//! All errors use `thiserror`-derived enums with structured context so
//! callers can inspect the failure programmatically. Lifecycle failures
//! carry a captured backtrace string: the administrator-facing message stays
//! actionable while the raw trace is retained for logs. I/O errors are
//! wrapped in `Arc` to satisfy the `result_large_err` Clippy lint.

use std::backtrace::Backtrace;
use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors arising from extension-management operations.
#[derive(Debug, Error)]
pub enum ExtensionError {
    /// The referenced extension id is not known to the manager.
    #[error("extension '{id}' is not registered with this manager")]
    InvalidExtension {
        /// Id that was looked up.
        id: String,
    },

    /// A step of the enable flow failed; the partial state was rolled back.
    #[error("failed to enable extension '{id}': {message}")]
    Enabling {
        /// Extension being enabled.
        id: String,
        /// Human-readable failure description.
        message: String,
        /// Captured backtrace for diagnostics.
        backtrace: String,
    },

    /// A step of the disable flow failed.
    #[error("failed to disable extension '{id}': {message}")]
    Disabling {
        /// Extension being disabled.
        id: String,
        /// Human-readable failure description.
        message: String,
    },

    /// Static media could not be installed for an extension.
    #[error(
        "failed to install media for extension '{id}': {message} \
         ('{path}' must be readable and writable by the application server)"
    )]
    InstallMedia {
        /// Extension whose media was being installed.
        id: String,
        /// Path that could not be prepared.
        path: Utf8PathBuf,
        /// Description of the failure.
        message: String,
        /// Optional underlying I/O error.
        #[source]
        source: Option<Arc<std::io::Error>>,
    },

    /// The durable registration store reported a failure.
    #[error("registration store error for extension '{id}': {message}")]
    Storage {
        /// Extension whose record was being accessed.
        id: String,
        /// Description of the store failure.
        message: String,
    },

    /// An extension manifest failed validation.
    #[error("manifest error: {message}")]
    Manifest {
        /// Description of the validation failure.
        message: String,
    },

    /// A tracked list item was removed more times than it was added.
    #[error("setting list item '{item}' is not tracked and cannot be removed")]
    UntrackedListItem {
        /// Item that was not tracked.
        item: String,
    },
}

impl ExtensionError {
    /// Builds an [`ExtensionError::Enabling`] from a cause, capturing the
    /// current backtrace.
    #[must_use]
    pub fn enabling(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Enabling {
            id: id.into(),
            message: message.into(),
            backtrace: Backtrace::force_capture().to_string(),
        }
    }

    /// Returns the retained backtrace string, when the error carries one.
    #[must_use]
    pub fn retained_backtrace(&self) -> Option<&str> {
        match self {
            Self::Enabling { backtrace, .. } => Some(backtrace.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests;

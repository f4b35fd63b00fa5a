//! Extension providers and the explicit provider registry.
//!
//! Discovery is a capability-registration protocol: the host registers one
//! [`ExtensionProvider`] per installable extension, and the manager scans
//! the [`ProviderRegistry`] instead of introspecting packages. A provider
//! exposes a cheap best-effort id even when its manifest fails to load, so
//! one broken extension can be reported without aborting discovery of the
//! rest.

use std::collections::HashMap;
use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::error::ExtensionError;
use crate::manifest::ExtensionManifest;

/// Error raised while constructing or registering an extension's admin site.
#[derive(Debug, Error)]
#[error("admin site registration failed: {message}")]
pub struct AdminSiteError {
    /// Description of the failure.
    message: String,
}

impl AdminSiteError {
    /// Creates an admin-site error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A live, running extension instance.
///
/// Instances exist only while their extension is enabled in this process.
/// The default hook implementations do nothing, so minimal extensions
/// implement nothing beyond the trait itself.
pub trait Extension: Send {
    /// Constructs and registers the extension's admin site.
    ///
    /// Called only when the manifest declares `has_admin_site`; an extension
    /// without one never sees this call (the absent-module case is skipped
    /// silently).
    ///
    /// # Errors
    ///
    /// Returns an [`AdminSiteError`] when a declared admin site exists but
    /// fails to come up; the manager propagates this as an enabling failure.
    fn register_admin_site(&mut self) -> Result<(), AdminSiteError> {
        Ok(())
    }

    /// Tears down the instance's hooks; called on disable and on process
    /// teardown.
    fn shutdown(&mut self) {}
}

/// A registered constructor for one installable extension.
///
/// Providers are trusted host code; the manager treats only their manifest
/// loading and construction as fallible.
pub trait ExtensionProvider: Send + Sync {
    /// Best-effort extension id, available even when the manifest cannot be
    /// loaded. Load errors are keyed by this id.
    fn id(&self) -> &str;

    /// Loads the extension's manifest.
    ///
    /// # Errors
    ///
    /// Returns an [`ExtensionError`] when the manifest cannot be produced;
    /// the manager records this as a load error and continues scanning.
    fn manifest(&self) -> Result<ExtensionManifest, ExtensionError>;

    /// Constructs a live instance.
    ///
    /// # Errors
    ///
    /// Returns an [`ExtensionError`] when construction fails; the manager
    /// surfaces this as an enabling failure.
    fn construct(&self) -> Result<Box<dyn Extension>, ExtensionError>;

    /// Path to the packaged static media tree, when the extension ships
    /// media to install.
    fn media_source(&self) -> Option<Utf8PathBuf> {
        None
    }
}

/// Registry of available extension providers, in registration order.
///
/// # Example
///
/// ```
/// use trellis_extensions::provider::{Extension, ExtensionProvider, ProviderRegistry};
/// use trellis_extensions::{ExtensionManifest, ExtensionMetadata, ExtensionError};
///
/// struct Reports;
/// impl Extension for Reports {}
///
/// struct ReportsProvider;
/// impl ExtensionProvider for ReportsProvider {
///     fn id(&self) -> &str {
///         "reports"
///     }
///     fn manifest(&self) -> Result<ExtensionManifest, ExtensionError> {
///         Ok(ExtensionManifest::new(ExtensionMetadata::new(
///             "reports", "Reports", "1.0.0", "ACME",
///         )))
///     }
///     fn construct(&self) -> Result<Box<dyn Extension>, ExtensionError> {
///         Ok(Box::new(Reports))
///     }
/// }
///
/// let mut registry = ProviderRegistry::new();
/// registry.register(std::sync::Arc::new(ReportsProvider)).expect("registration succeeds");
/// assert!(registry.get("reports").is_some());
/// ```
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    order: Vec<String>,
    providers: HashMap<String, Arc<dyn ExtensionProvider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::Manifest`] when a provider with the same
    /// id is already registered.
    pub fn register(&mut self, provider: Arc<dyn ExtensionProvider>) -> Result<(), ExtensionError> {
        let id = provider.id().to_owned();
        if self.providers.contains_key(&id) {
            return Err(ExtensionError::Manifest {
                message: format!("extension provider '{id}' is already registered"),
            });
        }
        self.order.push(id.clone());
        self.providers.insert(id, provider);
        Ok(())
    }

    /// Removes a provider, returning it when it was registered.
    pub fn unregister(&mut self, id: &str) -> Option<Arc<dyn ExtensionProvider>> {
        let removed = self.providers.remove(id);
        if removed.is_some() {
            self.order.retain(|existing| existing != id);
        }
        removed
    }

    /// Looks up a provider by extension id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<dyn ExtensionProvider>> {
        self.providers.get(id)
    }

    /// Iterates providers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ExtensionProvider>> {
        self.order.iter().filter_map(|id| self.providers.get(id))
    }

    /// Returns the number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns `true` when no providers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

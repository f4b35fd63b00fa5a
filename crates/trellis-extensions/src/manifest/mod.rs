//! Extension manifest types describing identity and contributed behaviour.
//!
//! An [`ExtensionManifest`] declares everything the manager needs to know
//! about an extension before constructing it: its id, version, author, the
//! extensions it requires, the host sub-applications and middleware it
//! contributes, and its static asset bundles. Manifests are validated on
//! registration to reject obviously invalid configurations early.

use std::cmp::Ordering;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::ExtensionError;

/// Identity fields shared across extension types.
///
/// Groups the id, display name, version, and author into a single parameter
/// object, reducing the argument count of [`ExtensionManifest::new`].
///
/// # Example
///
/// ```
/// use trellis_extensions::ExtensionMetadata;
///
/// let meta = ExtensionMetadata::new("reports", "Reports", "1.2.0", "ACME");
/// assert_eq!(meta.id(), "reports");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionMetadata {
    id: String,
    name: String,
    version: String,
    author: String,
}

impl ExtensionMetadata {
    /// Creates a new metadata bundle.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            author: author.into(),
        }
    }

    /// Returns the unique extension id.
    #[must_use]
    pub const fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the human-readable name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the declared version.
    #[must_use]
    pub const fn version(&self) -> &str {
        self.version.as_str()
    }

    /// Returns the author.
    #[must_use]
    pub const fn author(&self) -> &str {
        self.author.as_str()
    }
}

/// A named group of static asset source files compiled into one output file.
///
/// Output filenames are namespaced under the owning extension's id so two
/// extensions shipping a bundle named `default` never collide on disk.
///
/// # Example
///
/// ```
/// use trellis_extensions::StaticBundle;
///
/// let bundle = StaticBundle::new("default", vec!["css/style.less".into()]);
/// assert_eq!(bundle.namespaced_output("reports", "css"), "ext/reports/default.min.css");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticBundle {
    name: String,
    source_files: Vec<String>,
}

impl StaticBundle {
    /// Creates a bundle from a name and its source file list.
    #[must_use]
    pub fn new(name: impl Into<String>, source_files: Vec<String>) -> Self {
        Self {
            name: name.into(),
            source_files,
        }
    }

    /// Returns the bundle name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the source files compiled into this bundle.
    #[must_use]
    pub fn source_files(&self) -> &[String] {
        &self.source_files
    }

    /// Returns the output filename namespaced under the extension id.
    #[must_use]
    pub fn namespaced_output(&self, extension_id: &str, suffix: &str) -> String {
        format!("ext/{extension_id}/{}.min.{suffix}", self.name)
    }
}

/// Declarative description of an extension's identity and contributions.
///
/// Constructed via [`ExtensionManifest::new`] plus the builder methods, and
/// validated when registered with a provider registry.
///
/// # Example
///
/// ```
/// use trellis_extensions::{ExtensionManifest, ExtensionMetadata};
///
/// let meta = ExtensionMetadata::new("reports", "Reports", "1.2.0", "ACME");
/// let manifest = ExtensionManifest::new(meta)
///     .with_requirements(vec!["auth".into()])
///     .with_middleware(vec!["reports.middleware.Audit".into()]);
///
/// assert_eq!(manifest.id(), "reports");
/// assert_eq!(manifest.requirements(), ["auth"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionManifest {
    id: String,
    name: String,
    version: String,
    author: String,
    #[serde(default)]
    requirements: Vec<String>,
    #[serde(default)]
    apps: Vec<String>,
    #[serde(default)]
    context_processors: Vec<String>,
    #[serde(default)]
    middleware: Vec<String>,
    #[serde(default)]
    css_bundles: Vec<StaticBundle>,
    #[serde(default)]
    js_bundles: Vec<StaticBundle>,
    #[serde(default)]
    is_configurable: bool,
    #[serde(default)]
    has_admin_site: bool,
}

impl ExtensionManifest {
    /// Creates a manifest with no contributions declared.
    #[must_use]
    pub fn new(metadata: ExtensionMetadata) -> Self {
        Self {
            id: metadata.id,
            name: metadata.name,
            version: metadata.version,
            author: metadata.author,
            requirements: Vec::new(),
            apps: Vec::new(),
            context_processors: Vec::new(),
            middleware: Vec::new(),
            css_bundles: Vec::new(),
            js_bundles: Vec::new(),
            is_configurable: false,
            has_admin_site: false,
        }
    }

    /// Declares the extension ids this extension requires.
    #[must_use]
    pub fn with_requirements(mut self, requirements: Vec<String>) -> Self {
        self.requirements = requirements;
        self
    }

    /// Declares the host sub-applications this extension contributes.
    #[must_use]
    pub fn with_apps(mut self, apps: Vec<String>) -> Self {
        self.apps = apps;
        self
    }

    /// Declares the template context processors this extension contributes.
    #[must_use]
    pub fn with_context_processors(mut self, processors: Vec<String>) -> Self {
        self.context_processors = processors;
        self
    }

    /// Declares the ordered middleware names this extension contributes.
    #[must_use]
    pub fn with_middleware(mut self, middleware: Vec<String>) -> Self {
        self.middleware = middleware;
        self
    }

    /// Declares the CSS bundles this extension ships.
    #[must_use]
    pub fn with_css_bundles(mut self, bundles: Vec<StaticBundle>) -> Self {
        self.css_bundles = bundles;
        self
    }

    /// Declares the JavaScript bundles this extension ships.
    #[must_use]
    pub fn with_js_bundles(mut self, bundles: Vec<StaticBundle>) -> Self {
        self.js_bundles = bundles;
        self
    }

    /// Marks the extension as exposing a configuration page.
    #[must_use]
    pub const fn configurable(mut self) -> Self {
        self.is_configurable = true;
        self
    }

    /// Marks the extension as shipping its own admin site.
    #[must_use]
    pub const fn with_admin_site(mut self) -> Self {
        self.has_admin_site = true;
        self
    }

    /// Validates the manifest, returning an error when it is malformed.
    ///
    /// The id doubles as a directory and lock-file name, so it is restricted
    /// to alphanumerics plus `.`, `_`, and `-`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::Manifest`] when the id is empty or holds
    /// path-hostile characters, the version is empty, a requirement is
    /// empty, or a bundle has an empty name.
    pub fn validate(&self) -> Result<(), ExtensionError> {
        if self.id.trim().is_empty() {
            return Err(ExtensionError::Manifest {
                message: String::from("extension id must not be empty"),
            });
        }
        if !self
            .id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return Err(ExtensionError::Manifest {
                message: format!(
                    "extension id '{}' may only contain alphanumerics, '.', '_', and '-'",
                    self.id
                ),
            });
        }
        if self.version.trim().is_empty() {
            return Err(ExtensionError::Manifest {
                message: format!("extension '{}' must declare a version", self.id),
            });
        }
        if self.requirements.iter().any(|r| r.trim().is_empty()) {
            return Err(ExtensionError::Manifest {
                message: format!("extension '{}' declares an empty requirement id", self.id),
            });
        }
        if self
            .css_bundles
            .iter()
            .chain(&self.js_bundles)
            .any(|b| b.name().trim().is_empty())
        {
            return Err(ExtensionError::Manifest {
                message: format!("extension '{}' declares a bundle without a name", self.id),
            });
        }
        Ok(())
    }

    /// Returns the unique extension id.
    #[must_use]
    pub const fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the human-readable name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the declared version.
    #[must_use]
    pub const fn version(&self) -> &str {
        self.version.as_str()
    }

    /// Returns the author.
    #[must_use]
    pub const fn author(&self) -> &str {
        self.author.as_str()
    }

    /// Returns the required extension ids.
    #[must_use]
    pub fn requirements(&self) -> &[String] {
        &self.requirements
    }

    /// Returns the contributed host sub-applications.
    #[must_use]
    pub fn apps(&self) -> &[String] {
        &self.apps
    }

    /// Returns the contributed template context processors.
    #[must_use]
    pub fn context_processors(&self) -> &[String] {
        &self.context_processors
    }

    /// Returns the contributed middleware names, in declaration order.
    #[must_use]
    pub fn middleware(&self) -> &[String] {
        &self.middleware
    }

    /// Returns the CSS bundles.
    #[must_use]
    pub fn css_bundles(&self) -> &[StaticBundle] {
        &self.css_bundles
    }

    /// Returns the JavaScript bundles.
    #[must_use]
    pub fn js_bundles(&self) -> &[StaticBundle] {
        &self.js_bundles
    }

    /// Whether the extension exposes a configuration page.
    #[must_use]
    pub const fn is_configurable(&self) -> bool {
        self.is_configurable
    }

    /// Whether the extension ships its own admin site.
    #[must_use]
    pub const fn has_admin_site(&self) -> bool {
        self.has_admin_site
    }
}

/// Relation of a stored (last installed) version to the current manifest
/// version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionRelation {
    /// The stored version is older or absent; installation work is due.
    Upgrade,
    /// The stored version matches the manifest.
    Current,
    /// The stored version is newer than the manifest (a downgrade).
    Downgrade,
}

/// Compares a stored version stamp against the manifest's current version.
///
/// Both sides are compared as semantic versions when they parse; otherwise
/// any textual difference is treated as an upgrade, the fail-safe direction
/// (schema evolution runs rather than being skipped).
///
/// # Example
///
/// ```
/// use trellis_extensions::manifest::{VersionRelation, version_relation};
///
/// assert_eq!(version_relation(Some("1.0.0"), "1.2.0"), VersionRelation::Upgrade);
/// assert_eq!(version_relation(Some("1.2.0"), "1.2.0"), VersionRelation::Current);
/// assert_eq!(version_relation(Some("2.0.0"), "1.2.0"), VersionRelation::Downgrade);
/// assert_eq!(version_relation(None, "1.2.0"), VersionRelation::Upgrade);
/// ```
#[must_use]
pub fn version_relation(stored: Option<&str>, current: &str) -> VersionRelation {
    let Some(previous) = stored else {
        return VersionRelation::Upgrade;
    };
    if previous == current {
        return VersionRelation::Current;
    }
    match (Version::parse(previous), Version::parse(current)) {
        (Ok(old), Ok(new)) => match old.cmp(&new) {
            Ordering::Less => VersionRelation::Upgrade,
            Ordering::Equal => VersionRelation::Current,
            Ordering::Greater => VersionRelation::Downgrade,
        },
        _ => VersionRelation::Upgrade,
    }
}

#[cfg(test)]
mod tests;

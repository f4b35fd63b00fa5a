//! Runtime extension management for Trellis hosts.
//!
//! The `trellis-extensions` crate implements the plugin layer that lets a
//! long-running host application discover, enable, disable, and configure
//! third-party extensions at runtime without redeploying. Extensions declare
//! their identity and contributions through an [`ExtensionManifest`]; the
//! [`manager::ExtensionManager`] drives their lifecycle and keeps every
//! worker process of a multi-process deployment in agreement through a
//! cache-backed generation counter.
//!
//! # Architecture
//!
//! The manager never talks to a concrete database, cache, or migration
//! framework. Hosts supply a [`store::RegistrationStore`] for durable
//! enabled/installed records, a [`store::SharedCache`] for the generation
//! counter, and optionally a [`store::SchemaEvolver`] for extension-owned
//! model migrations. One [`provider::ExtensionProvider`] is registered per
//! installable extension; providers construct live
//! [`provider::Extension`] instances on enable.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis_config::Config;
//! use trellis_extensions::manager::ExtensionManagerBuilder;
//! use trellis_extensions::provider::{Extension, ExtensionProvider};
//! use trellis_extensions::{ExtensionError, ExtensionManifest, ExtensionMetadata};
//!
//! struct Reports;
//! impl Extension for Reports {}
//!
//! struct ReportsProvider;
//! impl ExtensionProvider for ReportsProvider {
//!     fn id(&self) -> &str {
//!         "reports"
//!     }
//!     fn manifest(&self) -> Result<ExtensionManifest, ExtensionError> {
//!         Ok(ExtensionManifest::new(ExtensionMetadata::new(
//!             "reports", "Reports", "1.0.0", "ACME",
//!         )))
//!     }
//!     fn construct(&self) -> Result<Box<dyn Extension>, ExtensionError> {
//!         Ok(Box::new(Reports))
//!     }
//! }
//!
//! let manager = ExtensionManagerBuilder::new(Config::default())
//!     .build()
//!     .expect("manager builds");
//! manager
//!     .register_provider(Arc::new(ReportsProvider))
//!     .expect("provider registers");
//! manager.load(false).expect("load succeeds");
//! manager.enable_extension("reports").expect("enable succeeds");
//! assert!(manager.is_extension_enabled("reports"));
//! ```

pub mod error;
pub mod manager;
pub mod manifest;
pub mod media;
pub mod middleware;
pub mod provider;
pub mod router;
pub mod settings;
pub mod signals;
pub mod store;
pub mod sync;

pub use self::error::ExtensionError;
pub use self::manager::{ExtensionManager, ExtensionManagerBuilder};
pub use self::manifest::{ExtensionManifest, ExtensionMetadata, StaticBundle};
pub use self::media::{MediaInstallOutcome, MediaInstaller};
pub use self::provider::{Extension, ExtensionProvider, ProviderRegistry};
pub use self::settings::ExtensionSettings;
pub use self::signals::{ExtensionEvent, SignalHub};
pub use self::store::{ExtensionRegistration, RegistrationStore, SchemaEvolver, SharedCache};

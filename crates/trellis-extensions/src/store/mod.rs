//! Collaborator interfaces for durable state, the shared cache, and schema
//! evolution.
//!
//! The manager never talks to a concrete database or cache backend. Hosts
//! implement [`RegistrationStore`] over their storage layer and
//! [`SharedCache`] over their cache backend; the in-memory implementations
//! here back tests and single-process deployments. Schema migration for
//! extension-provided models is delegated to an optional [`SchemaEvolver`].

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ExtensionError;

/// Durable record of an extension's enabled/installed state.
///
/// One record exists per distinct extension id, surviving process restarts.
/// Records are created on first discovery, updated on every enable/disable,
/// and never deleted automatically, so re-registering a previously known
/// extension preserves its prior enabled state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionRegistration {
    class_name: String,
    enabled: bool,
    installed: bool,
    #[serde(default)]
    settings: serde_json::Map<String, serde_json::Value>,
}

impl ExtensionRegistration {
    /// Creates a disabled, uninstalled record for the given id.
    #[must_use]
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            enabled: false,
            installed: false,
            settings: serde_json::Map::new(),
        }
    }

    /// Returns the extension id this record belongs to.
    #[must_use]
    pub const fn class_name(&self) -> &str {
        self.class_name.as_str()
    }

    /// Whether the extension should be running.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Sets the enabled flag.
    pub const fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether first-time installation has completed.
    #[must_use]
    pub const fn installed(&self) -> bool {
        self.installed
    }

    /// Sets the installed flag.
    pub const fn set_installed(&mut self, installed: bool) {
        self.installed = installed;
    }

    /// Returns the persisted settings blob.
    #[must_use]
    pub const fn settings(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.settings
    }

    /// Returns the persisted settings blob for mutation.
    pub const fn settings_mut(&mut self) -> &mut serde_json::Map<String, serde_json::Value> {
        &mut self.settings
    }
}

/// Trait abstracting the durable registration storage for testability.
///
/// Implementations must provide `get_or_create` semantics keyed by the
/// extension id; the manager performs all writes through explicit
/// [`RegistrationStore::save`] calls.
pub trait RegistrationStore: Send + Sync {
    /// Looks up the record for an extension id.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::Storage`] when the backend fails.
    fn get(&self, class_name: &str) -> Result<Option<ExtensionRegistration>, ExtensionError>;

    /// Returns the record for an extension id, creating a fresh disabled
    /// record when none exists.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::Storage`] when the backend fails.
    fn get_or_create(&self, class_name: &str) -> Result<ExtensionRegistration, ExtensionError>;

    /// Persists a record.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::Storage`] when the backend fails.
    fn save(&self, registration: &ExtensionRegistration) -> Result<(), ExtensionError>;
}

/// In-memory registration store backing tests and single-process hosts.
#[derive(Debug, Default)]
pub struct MemoryRegistrationStore {
    records: Mutex<HashMap<String, ExtensionRegistration>>,
}

impl MemoryRegistrationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegistrationStore for MemoryRegistrationStore {
    fn get(&self, class_name: &str) -> Result<Option<ExtensionRegistration>, ExtensionError> {
        let records = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(class_name).cloned())
    }

    fn get_or_create(&self, class_name: &str) -> Result<ExtensionRegistration, ExtensionError> {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .entry(class_name.to_owned())
            .or_insert_with(|| ExtensionRegistration::new(class_name))
            .clone())
    }

    fn save(&self, registration: &ExtensionRegistration) -> Result<(), ExtensionError> {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        records.insert(registration.class_name().to_owned(), registration.clone());
        Ok(())
    }
}

/// Trait abstracting the shared cache used for generation counters.
///
/// The staleness scheme needs only counter values. `increment` must be
/// atomic (increment-or-initialise in one step); with a backend that cannot
/// guarantee this, concurrent increments from different processes may
/// under-count, delaying but not preventing convergence.
pub trait SharedCache: Send + Sync {
    /// Reads a counter, `None` when absent or evicted.
    fn get(&self, key: &str) -> Option<u64>;

    /// Stores a counter value.
    fn set(&self, key: &str, value: u64);

    /// Deletes a counter.
    fn delete(&self, key: &str);

    /// Atomically increments a counter, initialising an absent entry to 1.
    /// Returns the new value.
    fn increment(&self, key: &str) -> u64;
}

/// In-memory cache backing tests and single-process hosts.
///
/// Increments are atomic under the internal mutex.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, u64>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SharedCache for MemoryCache {
    fn get(&self, key: &str) -> Option<u64> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.get(key).copied()
    }

    fn set(&self, key: &str, value: u64) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_owned(), value);
    }

    fn delete(&self, key: &str) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
    }

    fn increment(&self, key: &str) -> u64 {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let value = entries.entry(key.to_owned()).or_insert(0);
        *value = value.wrapping_add(1);
        *value
    }
}

/// Error reported by a schema evolver.
#[derive(Debug, Error)]
#[error("schema evolution failed: {message}")]
pub struct EvolveError {
    /// Description of the migration failure.
    message: String,
}

impl EvolveError {
    /// Creates an evolver error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Trait abstracting the external schema-migration collaborator.
///
/// Given the sub-applications an extension contributes, the evolver applies
/// any pending database schema changes for their models. The collaborator
/// may be entirely absent, in which case the manager logs a warning and
/// skips migration.
#[cfg_attr(test, mockall::automock)]
pub trait SchemaEvolver: Send + Sync {
    /// Applies pending schema changes for the extension's apps.
    ///
    /// # Errors
    ///
    /// Returns an [`EvolveError`] when migration fails; the enable flow
    /// surfaces this as an enabling failure.
    fn evolve(&self, extension_id: &str, apps: &[String]) -> Result<(), EvolveError>;
}

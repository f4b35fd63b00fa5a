//! Per-extension settings and the ref-counted shared list wrapper.
//!
//! [`SettingListWrapper`] lets any number of extensions require the same
//! entry in a global list-valued setting (installed apps, context
//! processors) without duplicates and without one extension's disable
//! removing an entry another still needs. [`ExtensionSettings`] is the
//! typed view over the settings blob persisted on an extension's
//! registration record.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::ExtensionError;
use crate::store::{ExtensionRegistration, RegistrationStore};

/// Settings key recording the last installed extension version.
pub const VERSION_SETTINGS_KEY: &str = "_extension_installed_version";

/// Ref-counted proxy over a mutable global list-valued setting.
///
/// Mutation is single-threaded per process; cross-process consistency is
/// handled by the generation counter at a higher layer.
///
/// # Example
///
/// ```
/// use trellis_extensions::settings::SettingListWrapper;
///
/// let mut apps = SettingListWrapper::new("installed apps", vec!["host.core".into()]);
/// apps.add("reports.app");
/// apps.add("reports.app");
/// apps.remove("reports.app").expect("still tracked");
/// assert!(apps.items().contains(&"reports.app".to_owned()));
/// apps.remove("reports.app").expect("tracked");
/// assert!(!apps.items().contains(&"reports.app".to_owned()));
/// ```
#[derive(Debug, Clone)]
pub struct SettingListWrapper {
    display_name: String,
    items: Vec<String>,
    ref_counts: HashMap<String, usize>,
}

impl SettingListWrapper {
    /// Wraps an existing list, seeding each pre-existing item at ref-count 1.
    #[must_use]
    pub fn new(display_name: impl Into<String>, items: Vec<String>) -> Self {
        let ref_counts = items.iter().map(|item| (item.clone(), 1)).collect();
        Self {
            display_name: display_name.into(),
            items,
            ref_counts,
        }
    }

    /// Human-readable name of the wrapped setting, used in diagnostics.
    #[must_use]
    pub const fn display_name(&self) -> &str {
        self.display_name.as_str()
    }

    /// Current contents of the underlying list.
    #[must_use]
    pub fn items(&self) -> &[String] {
        &self.items
    }

    /// Current ref-count for an item, `None` when untracked.
    #[must_use]
    pub fn ref_count(&self, item: &str) -> Option<usize> {
        self.ref_counts.get(item).copied()
    }

    /// Registers interest in an item, appending it on first reference.
    pub fn add(&mut self, item: impl Into<String>) {
        let entry = item.into();
        match self.ref_counts.get_mut(&entry) {
            Some(count) => *count += 1,
            None => {
                self.items.push(entry.clone());
                self.ref_counts.insert(entry, 1);
            }
        }
    }

    /// Registers interest in each item of a batch.
    pub fn add_list(&mut self, items: &[String]) {
        for item in items {
            self.add(item.clone());
        }
    }

    /// Releases interest in an item, removing it from the underlying list
    /// when the last reference is released.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::UntrackedListItem`] when the item is not
    /// tracked; releasing more than was acquired is a programming error and
    /// fails loudly.
    pub fn remove(&mut self, item: &str) -> Result<(), ExtensionError> {
        let Some(count) = self.ref_counts.get_mut(item) else {
            return Err(ExtensionError::UntrackedListItem {
                item: item.to_owned(),
            });
        };
        *count -= 1;
        if *count == 0 {
            self.ref_counts.remove(item);
            self.items.retain(|existing| existing != item);
        }
        Ok(())
    }

    /// Releases interest in each item of a batch, returning the items that
    /// were physically removed from the underlying list.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::UntrackedListItem`] on the first untracked
    /// item; earlier removals in the batch are kept.
    pub fn remove_list(&mut self, items: &[String]) -> Result<Vec<String>, ExtensionError> {
        let mut removed = Vec::new();
        for item in items {
            self.remove(item)?;
            if self.ref_count(item).is_none() {
                removed.push(item.clone());
            }
        }
        Ok(removed)
    }
}

/// Typed key/value settings for one extension, backed by its registration
/// record's settings blob.
///
/// Mutations stay in memory until [`ExtensionSettings::save`] persists them
/// through the store; the manager layers generation bumping and the
/// settings-saved notification on top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionSettings {
    extension_id: String,
    values: serde_json::Map<String, Value>,
}

impl ExtensionSettings {
    /// Builds the settings view from a registration record.
    #[must_use]
    pub fn from_registration(registration: &ExtensionRegistration) -> Self {
        Self {
            extension_id: registration.class_name().to_owned(),
            values: registration.settings().clone(),
        }
    }

    /// Returns the owning extension id.
    #[must_use]
    pub const fn extension_id(&self) -> &str {
        self.extension_id.as_str()
    }

    /// Reads a setting value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Writes a setting value in memory.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Removes a setting value in memory, returning the previous value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Returns the recorded last-installed version, when present.
    #[must_use]
    pub fn installed_version(&self) -> Option<&str> {
        self.values.get(VERSION_SETTINGS_KEY).and_then(Value::as_str)
    }

    /// Records the last-installed version in memory.
    pub fn set_installed_version(&mut self, version: &str) {
        self.values
            .insert(VERSION_SETTINGS_KEY.to_owned(), Value::from(version));
    }

    /// Persists the in-memory values onto the registration record.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::Storage`] when the store fails.
    pub fn save(&self, store: &dyn RegistrationStore) -> Result<(), ExtensionError> {
        let mut registration = store.get_or_create(&self.extension_id)?;
        *registration.settings_mut() = self.values.clone();
        store.save(&registration)
    }
}

//! Cross-process staleness detection through a cache-backed generation
//! counter.
//!
//! Every process keeps a [`GenerationSynchronizer`] whose locally cached
//! generation is compared against a shared cache entry on each check. A
//! process that changes shared extension state bumps the shared value,
//! making every other process's next [`GenerationSynchronizer::is_expired`]
//! call return true. This is an eventually-consistent invalidation signal,
//! not a distributed transaction: a process may serve a few requests with
//! stale state before its next check.

use std::sync::Arc;

use tracing::debug;

use crate::store::SharedCache;

/// Tracing target for synchronizer operations.
const SYNC_TARGET: &str = "trellis_extensions::sync";

/// Detects whether this process's extension state is stale relative to
/// other processes sharing the same cache key.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use trellis_extensions::store::{MemoryCache, SharedCache};
/// use trellis_extensions::sync::GenerationSynchronizer;
///
/// let cache: Arc<dyn SharedCache> = Arc::new(MemoryCache::new());
/// let mut sync = GenerationSynchronizer::new(Arc::clone(&cache), "site-1");
/// assert!(sync.is_expired());
/// sync.mark_updated();
/// assert!(!sync.is_expired());
/// ```
#[derive(Clone)]
pub struct GenerationSynchronizer {
    cache: Arc<dyn SharedCache>,
    key: String,
    local: Option<u64>,
}

impl std::fmt::Debug for GenerationSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationSynchronizer")
            .field("key", &self.key)
            .field("local", &self.local)
            .finish_non_exhaustive()
    }
}

impl GenerationSynchronizer {
    /// Creates a synchronizer over the given cache and key.
    ///
    /// The local generation starts unset, so the first
    /// [`GenerationSynchronizer::is_expired`] call reports expiry and the
    /// owning process performs an initial load.
    #[must_use]
    pub fn new(cache: Arc<dyn SharedCache>, key: impl Into<String>) -> Self {
        Self {
            cache,
            key: key.into(),
            local: None,
        }
    }

    /// Returns the cache key this synchronizer watches.
    #[must_use]
    pub const fn key(&self) -> &str {
        self.key.as_str()
    }

    /// Whether local state is stale relative to the shared generation.
    ///
    /// True when the local value was never set, when the shared entry
    /// differs, or when the shared entry was evicted (fail safe toward
    /// reloading rather than erroring).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        let Some(local) = self.local else {
            return true;
        };
        match self.cache.get(&self.key) {
            Some(shared) => shared != local,
            None => true,
        }
    }

    /// Atomically bumps the shared generation and adopts the new value,
    /// signalling every other process that a reload is needed.
    pub fn mark_updated(&mut self) {
        let value = self.cache.increment(&self.key);
        self.local = Some(value);
        debug!(
            target: SYNC_TARGET,
            key = %self.key,
            generation = value,
            "shared generation bumped"
        );
    }

    /// Adopts the current shared generation without bumping it, used after
    /// a proactive reload so the reload itself does not cascade.
    ///
    /// An absent shared entry is initialised (to 1) rather than left unset;
    /// otherwise a freshly started deployment with an empty cache would
    /// reload on every request.
    pub fn refresh(&mut self) {
        let value = self
            .cache
            .get(&self.key)
            .unwrap_or_else(|| self.cache.increment(&self.key));
        self.local = Some(value);
    }

    /// Deletes the shared entry and forgets the local value, forcing every
    /// process (this one included) to treat its state as stale.
    pub fn clear(&mut self) {
        self.cache.delete(&self.key);
        self.local = None;
    }
}

#[cfg(test)]
mod tests;

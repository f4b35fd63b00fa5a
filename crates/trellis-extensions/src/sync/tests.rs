//! Unit tests for the generation synchronizer.

use std::sync::Arc;

use rstest::{fixture, rstest};

use super::*;
use crate::store::MemoryCache;

#[fixture]
fn cache() -> Arc<dyn SharedCache> {
    Arc::new(MemoryCache::new())
}

#[rstest]
fn fresh_synchronizer_is_expired(cache: Arc<dyn SharedCache>) {
    let sync = GenerationSynchronizer::new(cache, "site-1");
    assert!(sync.is_expired());
}

#[rstest]
fn mark_updated_clears_expiry_locally(cache: Arc<dyn SharedCache>) {
    let mut sync = GenerationSynchronizer::new(cache, "site-1");
    sync.mark_updated();
    assert!(!sync.is_expired());
}

#[rstest]
fn other_process_sees_expiry_until_refresh(cache: Arc<dyn SharedCache>) {
    let mut writer = GenerationSynchronizer::new(Arc::clone(&cache), "site-1");
    let mut reader = GenerationSynchronizer::new(cache, "site-1");

    reader.refresh();
    assert!(!reader.is_expired());

    writer.mark_updated();
    assert!(!writer.is_expired(), "the writer itself is current");
    assert!(reader.is_expired(), "the reader must reload");

    reader.refresh();
    assert!(!reader.is_expired());
}

#[rstest]
fn eviction_counts_as_expired(cache: Arc<dyn SharedCache>) {
    let mut sync = GenerationSynchronizer::new(Arc::clone(&cache), "site-1");
    sync.mark_updated();
    cache.delete("site-1");
    assert!(sync.is_expired());
}

#[rstest]
fn refresh_initialises_an_absent_entry(cache: Arc<dyn SharedCache>) {
    let mut sync = GenerationSynchronizer::new(Arc::clone(&cache), "site-1");
    sync.refresh();
    assert!(!sync.is_expired(), "refresh must not leave a reload loop");
    assert_eq!(cache.get("site-1"), Some(1));
}

#[rstest]
fn clear_forces_all_processes_stale(cache: Arc<dyn SharedCache>) {
    let mut writer = GenerationSynchronizer::new(Arc::clone(&cache), "site-1");
    let mut reader = GenerationSynchronizer::new(Arc::clone(&cache), "site-1");
    writer.mark_updated();
    reader.refresh();

    writer.clear();
    assert!(writer.is_expired());
    assert!(reader.is_expired());
    assert!(cache.get("site-1").is_none());
}

#[rstest]
fn keys_are_independent(cache: Arc<dyn SharedCache>) {
    let mut one = GenerationSynchronizer::new(Arc::clone(&cache), "site-1");
    let mut two = GenerationSynchronizer::new(cache, "site-2");
    one.mark_updated();
    two.refresh();
    one.mark_updated();
    assert!(!two.is_expired(), "a bump on one key must not expire another");
}

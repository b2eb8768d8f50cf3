//! Tests for `ContentCache`.
//!
//! Organized by behavior: single-flight coordination and staleness handling.

use super::{ContentCache, ContentCacheConfig, CacheKey, CacheStatus};
use crate::{metrics::NoopSink, model::ResourceKind, scheduler::StalenessFlag};
use bytes::Bytes;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::time::Duration;

// ============================================================================
// Shared Test Helpers
// ============================================================================

pub(crate) type TestCache = ContentCache<String>;

/// Creates a cache with the given period and its staleness flag.
pub(crate) fn create_test_cache(
    update_period: Duration,
    evict_on_error: bool,
) -> (Arc<TestCache>, Arc<StalenessFlag>) {
    let flag = Arc::new(StalenessFlag::new());
    let cache = ContentCache::new(
        ContentCacheConfig { update_period, evict_on_error },
        Arc::clone(&flag),
        Arc::new(NoopSink),
    );
    (Arc::new(cache), flag)
}

pub(crate) fn style_key(group: &str) -> CacheKey {
    CacheKey::new(group, Some(ResourceKind::Style), true)
}

/// Compute function that counts invocations and returns `body`.
pub(crate) async fn counted(
    counter: Arc<AtomicUsize>,
    body: &'static str,
) -> Result<Bytes, String> {
    counter.fetch_add(1, Ordering::SeqCst);
    Ok(Bytes::from_static(body.as_bytes()))
}

// ============================================================================
// Test Submodules
// ============================================================================

//! Get-or-compute content cache with per-key single-flight.

use super::{
    flight::{FlightGuard, InflightCompute, InflightMap},
    types::StatsCounters,
    CacheEntry, CacheKey, CacheRead, CacheStats, CacheStatus,
};
use crate::{
    metrics::{CacheEvent, EventSink},
    scheduler::{InflightSweeper, StalenessFlag},
};
use bytes::Bytes;
use dashmap::{mapref::entry::Entry, DashMap};
use std::{
    fmt,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::time::Duration;
use tracing::{debug, trace};

/// Content cache configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentCacheConfig {
    /// Maximum entry age. Zero means every lookup recomputes.
    pub update_period: Duration,
    /// Remove the previous entry when a recomputation fails instead of keeping it.
    pub evict_on_error: bool,
}

impl Default for ContentCacheConfig {
    fn default() -> Self {
        Self { update_period: Duration::from_secs(300), evict_on_error: false }
    }
}

/// Keyed store of processed group content.
///
/// # Lookup Flow
///
/// ```text
/// get_or_compute(key)
///   │
///   ├─ observe staleness flag ──► raised: epoch += 1
///   │
///   ├─ entry fresh in current epoch? ──► Hit
///   │
///   ├─ join or create in-flight cell for key
///   │
///   └─ drive cell
///        ├─ this caller initializes ──► re-check entry ──► compute ──► store ──► Miss
///        └─ another caller initializes ──► await same result ──────────────────► Coalesced
/// ```
///
/// # Invariants
///
/// - For one key, at most one compute function runs at a time.
/// - Every caller joined to a computation receives the same bytes or the same error.
/// - A failed computation never writes an entry. The previous entry is retained unless
///   `evict_on_error` is set.
/// - Entries are replaced wholesale, never mutated.
///
/// The error type is `Clone` because one failure is delivered to every joined caller.
pub struct ContentCache<E> {
    entries: DashMap<CacheKey, Arc<CacheEntry>>,
    inflight: InflightMap<E>,
    config: ContentCacheConfig,
    stale: Arc<StalenessFlag>,
    epoch: AtomicU64,
    events: Arc<dyn EventSink>,
    stats: StatsCounters,
}

impl<E> ContentCache<E>
where
    E: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(
        config: ContentCacheConfig,
        stale: Arc<StalenessFlag>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            inflight: DashMap::new(),
            config,
            stale,
            epoch: AtomicU64::new(0),
            events,
            stats: StatsCounters::default(),
        }
    }

    /// Returns fresh content for `key`, running `compute` at most once across all concurrent
    /// callers when no fresh entry exists.
    ///
    /// # Errors
    ///
    /// Returns the error produced by the computation this caller ran or joined.
    pub async fn get_or_compute<F, Fut>(&self, key: &CacheKey, compute: F) -> Result<CacheRead, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, E>>,
    {
        let epoch = self.observe_epoch();

        if let Some(content) = self.fresh_content(key, epoch) {
            #[cfg(feature = "verbose-logging")]
            trace!(%key, epoch, "fresh entry");
            return Ok(self.finish(key, content, CacheStatus::Hit));
        }

        let guard = FlightGuard::new(&self.inflight, key, self.join_flight(key));
        let mut status = CacheStatus::Coalesced;

        let result = guard
            .flight()
            .cell
            .get_or_init(|| async {
                // A flight for this key may have stored a fresh entry just before ours began.
                if let Some(content) = self.fresh_content(key, self.epoch.load(Ordering::Acquire)) {
                    status = CacheStatus::Hit;
                    return Ok(content);
                }
                status = CacheStatus::Miss;
                self.run_compute(key, compute).await
            })
            .await
            .clone();

        drop(guard);

        match result {
            Ok(content) => Ok(self.finish(key, content, status)),
            Err(err) => {
                if status == CacheStatus::Coalesced {
                    trace!(%key, "joined computation failed");
                }
                Err(err)
            }
        }
    }

    /// Returns the entry's content if it is fresh, without computing anything.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let epoch = self.observe_epoch();
        self.fresh_content(key, epoch)
    }

    /// Marks every entry stale. Entries stay in place until their key is recomputed.
    pub fn invalidate_all(&self) -> u64 {
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(epoch, "content cache invalidated");
        epoch
    }

    /// Removes one entry. Returns whether an entry was present.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.clear();
        debug!("content cache cleared");
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn config(&self) -> &ContentCacheConfig {
        &self.config
    }

    /// Returns a clone of the stored entry regardless of freshness.
    #[must_use]
    pub fn entry(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.entries.len(), self.inflight.len(), self.epoch())
    }

    /// Removes in-flight cells older than `older_than` that no caller holds.
    pub fn sweep_abandoned(&self, older_than: Duration) -> usize {
        let mut removed = 0;
        self.inflight.retain(|key, flight| {
            // The shard is write-locked here, so no caller can clone the cell concurrently.
            let abandoned =
                Arc::strong_count(flight) == 1 && flight.started_at.elapsed() >= older_than;
            if abandoned {
                removed += 1;
                debug!(%key, age_secs = flight.started_at.elapsed().as_secs(), "removing abandoned in-flight computation");
            }
            !abandoned
        });
        removed
    }

    /// Converts a raised staleness flag into an epoch bump and returns the current epoch.
    fn observe_epoch(&self) -> u64 {
        if self.stale.take() {
            let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
            debug!(epoch, "content staleness observed");
            epoch
        } else {
            self.epoch.load(Ordering::Acquire)
        }
    }

    fn fresh_content(&self, key: &CacheKey, epoch: u64) -> Option<Bytes> {
        let entry = self.entries.get(key)?;
        entry.is_fresh(epoch, self.config.update_period).then(|| entry.content.clone())
    }

    /// Joins the pending cell for `key` or installs a new one. Completed cells are replaced.
    fn join_flight(&self, key: &CacheKey) -> Arc<InflightCompute<E>> {
        match self.inflight.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_complete() {
                    let flight = Arc::new(InflightCompute::new());
                    occupied.insert(Arc::clone(&flight));
                    flight
                } else {
                    Arc::clone(occupied.get())
                }
            }
            Entry::Vacant(vacant) => Arc::clone(&vacant.insert(Arc::new(InflightCompute::new()))),
        }
    }

    async fn run_compute<F, Fut>(&self, key: &CacheKey, compute: F) -> Result<Bytes, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, E>>,
    {
        // Entries are stamped with the epoch the computation started in, so a flag raised
        // mid-computation leaves the new entry stale.
        let epoch = self.epoch.load(Ordering::Acquire);
        self.stats.computations.fetch_add(1, Ordering::Relaxed);

        let result = compute().await;
        match &result {
            Ok(content) => {
                self.entries.insert(key.clone(), Arc::new(CacheEntry::new(content.clone(), epoch)));
                trace!(%key, bytes = content.len(), epoch, "content cached");
            }
            Err(_) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                if self.config.evict_on_error && self.entries.remove(key).is_some() {
                    debug!(%key, "evicted previous entry after failed recomputation");
                }
            }
        }
        result
    }

    fn finish(&self, key: &CacheKey, content: Bytes, status: CacheStatus) -> CacheRead {
        self.stats.record(status);
        let event = match status {
            CacheStatus::Hit => CacheEvent::Hit { key },
            CacheStatus::Miss => CacheEvent::Miss { key },
            CacheStatus::Coalesced => CacheEvent::Coalesced { key },
        };
        self.events.record(&event);
        CacheRead { content, status }
    }
}

impl<E> InflightSweeper for ContentCache<E>
where
    E: Clone + Send + Sync + 'static,
{
    fn sweep_abandoned(&self, older_than: Duration) -> usize {
        ContentCache::sweep_abandoned(self, older_than)
    }
}

impl<E> fmt::Debug for ContentCache<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentCache")
            .field("entries", &self.entries.len())
            .field("inflight", &self.inflight.len())
            .field("config", &self.config)
            .field("epoch", &self.epoch.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

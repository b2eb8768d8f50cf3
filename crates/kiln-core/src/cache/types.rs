//! Cache key, entry and statistics types.

use crate::model::ResourceKind;
use bytes::Bytes;
use serde::Serialize;
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::time::{Duration, Instant};

/// Identifies one cached output variant of a group.
///
/// `kind = None` selects every resource of the group; `Some(kind)` restricts the output to
/// resources of that kind so that `g1.css` and `g1.js` never share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub group: Arc<str>,
    pub kind: Option<ResourceKind>,
    pub minimize: bool,
}

impl CacheKey {
    #[must_use]
    pub fn new(group: impl Into<Arc<str>>, kind: Option<ResourceKind>, minimize: bool) -> Self {
        Self { group: group.into(), kind, minimize }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.group)?;
        if let Some(kind) = self.kind {
            write!(f, ".{}", kind.extension())?;
        }
        if !self.minimize {
            f.write_str("?minimize=false")?;
        }
        Ok(())
    }
}

/// Immutable cached content. Replaced wholesale on recomputation, never patched.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub content: Bytes,
    pub created_at: Instant,
    /// Invalidation epoch the computation started in.
    pub epoch: u64,
}

impl CacheEntry {
    #[must_use]
    pub fn new(content: Bytes, epoch: u64) -> Self {
        Self { content, created_at: Instant::now(), epoch }
    }

    /// An entry is fresh when it belongs to the current epoch and is younger than `period`.
    /// A zero period is never fresh.
    #[inline]
    #[must_use]
    pub fn is_fresh(&self, current_epoch: u64, period: Duration) -> bool {
        !period.is_zero() && self.epoch == current_epoch && self.created_at.elapsed() < period
    }
}

/// How a lookup was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// A fresh entry was returned.
    Hit,
    /// This caller ran the computation.
    Miss,
    /// This caller waited on a computation started by another caller.
    Coalesced,
}

impl CacheStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Coalesced => "coalesced",
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content returned by a cache lookup, with the way it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRead {
    pub content: Bytes,
    pub status: CacheStatus,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    /// Number of times a compute function actually ran.
    pub computations: u64,
    pub errors: u64,
    pub entries: usize,
    pub inflight: usize,
    pub epoch: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub(crate) hits: AtomicU64,
    pub(crate) misses: AtomicU64,
    pub(crate) coalesced: AtomicU64,
    pub(crate) computations: AtomicU64,
    pub(crate) errors: AtomicU64,
}

impl StatsCounters {
    #[inline]
    pub(crate) fn record(&self, status: CacheStatus) {
        let counter = match status {
            CacheStatus::Hit => &self.hits,
            CacheStatus::Miss => &self.misses,
            CacheStatus::Coalesced => &self.coalesced,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, entries: usize, inflight: usize, epoch: u64) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            entries,
            inflight,
            epoch,
        }
    }
}

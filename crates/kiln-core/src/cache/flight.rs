//! Per-key in-flight computation cells.
//!
//! # Critical Patterns
//!
//! ## One Cell Per Key
//!
//! Concurrent callers for the same key share one [`InflightCompute`]. The first caller to drive
//! the cell's `OnceCell` runs the computation; everyone else awaits the same cell and receives
//! a clone of the same result, success or error. Keys never share a cell, so a slow key cannot
//! block any other key.
//!
//! ## Lock Scope
//!
//! The `DashMap` shard lock is held only while the cell `Arc` is cloned out of the map. It is
//! never held across an await.
//!
//! ## Cleanup
//!
//! [`FlightGuard`] removes the map entry on drop, but only once the cell holds a result and
//! only if the map still points at the same cell. If every participant is cancelled before the
//! computation finishes, the cell stays uninitialized: the next caller for that key drives it
//! again, and the scheduler sweep removes it if nobody does.

use super::CacheKey;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::{sync::OnceCell, time::Instant};

pub(crate) type InflightMap<E> = DashMap<CacheKey, Arc<InflightCompute<E>>>;

/// Shared result slot for one computation of one key.
#[derive(Debug)]
pub(crate) struct InflightCompute<E> {
    pub(crate) cell: OnceCell<Result<Bytes, E>>,
    pub(crate) started_at: Instant,
}

impl<E> InflightCompute<E> {
    pub(crate) fn new() -> Self {
        Self { cell: OnceCell::new(), started_at: Instant::now() }
    }

    /// A completed cell holds a result that later callers must not reuse.
    #[inline]
    pub(crate) fn is_complete(&self) -> bool {
        self.cell.initialized()
    }
}

/// RAII guard held by every participant of a computation.
pub(crate) struct FlightGuard<'a, E> {
    inflight: &'a InflightMap<E>,
    key: &'a CacheKey,
    flight: Arc<InflightCompute<E>>,
}

impl<'a, E> FlightGuard<'a, E> {
    pub(crate) fn new(
        inflight: &'a InflightMap<E>,
        key: &'a CacheKey,
        flight: Arc<InflightCompute<E>>,
    ) -> Self {
        Self { inflight, key, flight }
    }

    pub(crate) fn flight(&self) -> &InflightCompute<E> {
        &self.flight
    }
}

impl<E> Drop for FlightGuard<'_, E> {
    fn drop(&mut self) {
        if self.flight.is_complete() {
            self.inflight.remove_if(self.key, |_, current| Arc::ptr_eq(current, &self.flight));
        }
    }
}

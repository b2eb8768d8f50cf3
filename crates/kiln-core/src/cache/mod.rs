//! # Content Cache
//!
//! Stores processed group content keyed by [`CacheKey`] and guarantees that concurrent
//! requests for the same stale key run the computation exactly once.
//!
//! ## Staleness
//!
//! An entry is reused only while it is fresh:
//!
//! | Condition | Fresh? |
//! |-----------|--------|
//! | `update_period == 0` | never |
//! | age ≥ `update_period` | no |
//! | written before the last observed staleness flag | no |
//! | otherwise | yes |
//!
//! The staleness flag is consumed with read-and-clear semantics and turned into an epoch
//! bump. Entries remember the epoch they were computed in, so one flag invalidates every key
//! rather than only the first key looked up after it.
//!
//! ## Module Structure
//!
//! - `types`: keys, entries, lookup status and statistics
//! - `flight`: per-key in-flight cells and their RAII guard
//! - `content_cache`: the get-or-compute store

mod content_cache;
mod flight;
mod types;

pub use content_cache::{ContentCache, ContentCacheConfig};
pub use types::{CacheEntry, CacheKey, CacheRead, CacheStats, CacheStatus};

#[cfg(test)]
mod tests;

//! Process-wide staleness flags.
//!
//! A flag is raised by a scheduler timer and consumed (read-and-cleared) by the component that
//! owns the cached artifact. Raising is idempotent: raising an already raised flag changes
//! nothing, so a slow consumer sees one invalidation no matter how many periods elapsed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Lock-free set/clear flag shared between the scheduler and one cache owner.
///
/// ```text
///  Idle ──raise()──► Flagged ──take()──► Idle
///    ▲                  │
///    └──── raise() is a no-op while Flagged
/// ```
#[derive(Debug, Default)]
pub struct StalenessFlag {
    raised: AtomicBool,
    /// Number of Idle → Flagged transitions, for diagnostics.
    transitions: AtomicU64,
}

impl StalenessFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the artifact stale. Returns `true` if the flag was previously clear.
    pub fn raise(&self) -> bool {
        let newly_raised = !self.raised.swap(true, Ordering::AcqRel);
        if newly_raised {
            self.transitions.fetch_add(1, Ordering::Relaxed);
        }
        newly_raised
    }

    /// Returns whether the flag is currently raised without clearing it.
    #[inline]
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// Clears the flag, returning whether it was raised.
    ///
    /// Exactly one of any number of concurrent `take()` calls observes `true` per raise.
    #[inline]
    pub fn take(&self) -> bool {
        self.raised.swap(false, Ordering::AcqRel)
    }

    #[must_use]
    pub fn transitions(&self) -> u64 {
        self.transitions.load(Ordering::Relaxed)
    }
}

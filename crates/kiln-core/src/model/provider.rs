//! Cached access to the current [`ResourceModel`].

use super::{ModelError, ModelLoader, ResourceModel};
use crate::{
    metrics::{CacheEvent, EventSink},
    scheduler::StalenessFlag,
};
use arc_swap::ArcSwapOption;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::{
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing::{debug, error, info, warn};

/// A published model together with the instant it was loaded.
#[derive(Debug)]
struct ModelSnapshot {
    model: Arc<ResourceModel>,
    loaded_at: Instant,
}

/// Supplies the current resource model, reloading it through the configured [`ModelLoader`]
/// when the cached snapshot is stale.
///
/// # Freshness
///
/// A snapshot is reused while all of the following hold:
/// - the update period is non-zero
/// - less than one update period has elapsed since it was loaded
/// - the staleness flag is not raised
///
/// A zero period reloads on every call.
///
/// # Thread Safety
///
/// Reads are lock-free through `ArcSwapOption`. Reloads are serialized by an async mutex.
/// Every finished load attempt bumps a generation counter; a caller that queued on the mutex
/// while an attempt was running takes that attempt's outcome instead of loading again. A
/// burst of callers against a stale snapshot therefore triggers a single load, whether it
/// succeeds or fails.
///
/// # Failure Policy
///
/// | Situation | Result |
/// |-----------|--------|
/// | Load fails, no previous model | [`ModelError::ColdStart`] returned to the caller |
/// | Load fails, previous model exists | previous model served, failure reported to the sink |
///
/// A failed refresh leaves the snapshot timestamp unchanged and re-raises a consumed flag,
/// so the next call arriving after the failure retries the loader.
///
/// # Content Invalidation
///
/// When a content flag is attached with [`with_content_flag`](Self::with_content_flag),
/// publishing a model that differs from the previous one raises it, so content computed
/// against the old model is never served again.
pub struct ModelProvider {
    loader: Arc<dyn ModelLoader>,
    snapshot: ArcSwapOption<ModelSnapshot>,
    /// Guards reloads and holds the failure of the last finished attempt.
    refresh_lock: Mutex<Option<ModelError>>,
    attempts: AtomicU64,
    update_period: Duration,
    stale: Arc<StalenessFlag>,
    content_stale: Option<Arc<StalenessFlag>>,
    events: Arc<dyn EventSink>,
    loads: AtomicU64,
}

impl ModelProvider {
    #[must_use]
    pub fn new(
        loader: Arc<dyn ModelLoader>,
        update_period: Duration,
        stale: Arc<StalenessFlag>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            loader,
            snapshot: ArcSwapOption::empty(),
            refresh_lock: Mutex::new(None),
            attempts: AtomicU64::new(0),
            update_period,
            stale,
            content_stale: None,
            events,
            loads: AtomicU64::new(0),
        }
    }

    /// Raises `flag` whenever a reload publishes a model different from the previous one.
    #[must_use]
    pub fn with_content_flag(mut self, flag: Arc<StalenessFlag>) -> Self {
        self.content_stale = Some(flag);
        self
    }

    /// Returns the current model, reloading it first if the cached snapshot is stale.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ColdStart`] when no model has ever been loaded and the loader
    /// fails.
    pub async fn current(&self) -> Result<Arc<ResourceModel>, ModelError> {
        if let Some(model) = self.fresh_model() {
            return Ok(model);
        }

        let seen = self.attempts.load(Ordering::Acquire);
        let mut last_failure = self.refresh_lock.lock().await;

        // Another caller may have reloaded while we waited on the lock.
        if let Some(model) = self.fresh_model() {
            return Ok(model);
        }

        // An attempt finished while we waited: share its outcome rather than hitting the
        // loader again.
        if self.attempts.load(Ordering::Acquire) != seen {
            match (self.snapshot(), last_failure.as_ref()) {
                (Some(model), _) => return Ok(model),
                (None, Some(err)) => return Err(ModelError::ColdStart(Box::new(err.clone()))),
                (None, None) => {}
            }
        }

        self.reload_locked(&mut last_failure).await
    }

    /// Forces a reload regardless of freshness.
    ///
    /// # Errors
    ///
    /// Same as [`current`](Self::current).
    pub async fn refresh(&self) -> Result<Arc<ResourceModel>, ModelError> {
        let mut last_failure = self.refresh_lock.lock().await;
        self.reload_locked(&mut last_failure).await
    }

    /// Returns the last published model without triggering a reload.
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<ResourceModel>> {
        self.snapshot.load().as_ref().map(|snapshot| Arc::clone(&snapshot.model))
    }

    /// Number of loader invocations so far, successful or not.
    #[must_use]
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn update_period(&self) -> Duration {
        self.update_period
    }

    fn fresh_model(&self) -> Option<Arc<ResourceModel>> {
        if self.update_period.is_zero() || self.stale.is_raised() {
            return None;
        }
        let guard = self.snapshot.load();
        let snapshot = guard.as_ref()?;
        (snapshot.loaded_at.elapsed() < self.update_period).then(|| Arc::clone(&snapshot.model))
    }

    /// `last_failure` is the guarded slot of `refresh_lock`.
    async fn reload_locked(
        &self,
        last_failure: &mut Option<ModelError>,
    ) -> Result<Arc<ResourceModel>, ModelError> {
        let flagged = self.stale.take();
        self.loads.fetch_add(1, Ordering::Relaxed);

        let loaded = self.loader.load().await;
        *last_failure = loaded.as_ref().err().cloned();
        self.attempts.fetch_add(1, Ordering::Release);

        match loaded {
            Ok(model) => {
                let model = Arc::new(model);
                let previous = self.snapshot.swap(Some(Arc::new(ModelSnapshot {
                    model: Arc::clone(&model),
                    loaded_at: Instant::now(),
                })));
                let changed = previous.is_some_and(|previous| *previous.model != *model);
                if changed {
                    if let Some(content) = &self.content_stale {
                        content.raise();
                        debug!("resource model changed, content invalidated");
                    }
                }
                self.events.record(&CacheEvent::ModelRefreshed { groups: model.len() });
                if flagged {
                    info!(groups = model.len(), "resource model reloaded after invalidation");
                } else {
                    debug!(groups = model.len(), "resource model loaded");
                }
                Ok(model)
            }
            Err(err) => {
                if flagged {
                    self.stale.raise();
                }
                match self.snapshot() {
                    Some(previous) => {
                        warn!(error = %err, "model refresh failed, serving previous model");
                        self.events
                            .record(&CacheEvent::ModelRefreshFailed { error: &err, serving_stale: true });
                        Ok(previous)
                    }
                    None => {
                        error!(error = %err, "model load failed with no previous model");
                        self.events
                            .record(&CacheEvent::ModelRefreshFailed { error: &err, serving_stale: false });
                        Err(ModelError::ColdStart(Box::new(err)))
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for ModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelProvider")
            .field("update_period", &self.update_period)
            .field("loaded", &self.snapshot.load().is_some())
            .field("loads", &self.load_count())
            .finish_non_exhaustive()
    }
}

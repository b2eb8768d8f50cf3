//! Runtime lifecycle management: component access and graceful shutdown.

use crate::{
    config::AppConfig,
    manager::{GroupCache, GroupContent, GroupRequest, ManagerError, RequestManager},
    model::ModelProvider,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{info, warn};

use super::{builder::KilnRuntimeBuilder, KilnComponents};

/// Main runtime container owning all components and the invalidation scheduler.
///
/// `shutdown` takes `&self` so the runtime can be shared with request handlers; after it
/// returns, requests are still served but nothing invalidates entries in the background.
pub struct KilnRuntime {
    components: KilnComponents,
    config: AppConfig,
    shutdown_initiated: Arc<AtomicBool>,
}

impl KilnRuntime {
    /// Creates a new builder for constructing a `KilnRuntime`.
    #[must_use]
    pub fn builder() -> KilnRuntimeBuilder {
        KilnRuntimeBuilder::new()
    }

    pub(super) fn new(components: KilnComponents, config: AppConfig) -> Self {
        Self { components, config, shutdown_initiated: Arc::new(AtomicBool::new(false)) }
    }

    #[must_use]
    pub fn components(&self) -> &KilnComponents {
        &self.components
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn request_manager(&self) -> &Arc<RequestManager> {
        self.components.request_manager()
    }

    #[must_use]
    pub fn content_cache(&self) -> &Arc<GroupCache> {
        self.components.content_cache()
    }

    #[must_use]
    pub fn model_provider(&self) -> &Arc<ModelProvider> {
        self.components.model_provider()
    }

    /// Serves one request.
    ///
    /// # Errors
    ///
    /// See [`RequestManager::process`].
    pub async fn process(&self, request: &GroupRequest) -> Result<GroupContent, ManagerError> {
        self.components.request_manager().process(request).await
    }

    /// Parses `path` and `query` into a [`GroupRequest`] and serves it.
    ///
    /// # Errors
    ///
    /// [`ManagerError::InvalidRequest`] for an unparseable path, otherwise see
    /// [`RequestManager::process`].
    pub async fn process_path(
        &self,
        path: &str,
        query: Option<&str>,
    ) -> Result<GroupContent, ManagerError> {
        let request = GroupRequest::from_path(path, query)?;
        self.process(&request).await
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Stops the invalidation scheduler. Idempotent: only the first call does anything.
    pub async fn shutdown(&self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Shutdown already initiated, ignoring duplicate call");
            return;
        }

        info!("Initiating Kiln runtime shutdown");
        self.components.scheduler().stop().await;

        let stats = self.components.content_cache().stats();
        info!(
            entries = stats.entries,
            hits = stats.hits,
            misses = stats.misses,
            coalesced = stats.coalesced,
            "Kiln runtime shutdown complete"
        );
    }
}

impl std::fmt::Debug for KilnRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KilnRuntime")
            .field("scheduler", self.components.scheduler())
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

const _: () = {
    const fn assert_send<T: Send>() {}
    const fn assert_sync<T: Sync>() {}
    let _ = assert_send::<KilnRuntime>;
    let _ = assert_sync::<KilnRuntime>;
};

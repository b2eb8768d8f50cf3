//! Core component container for the Kiln runtime.

use crate::{
    manager::{GroupCache, RequestManager},
    metrics::{EventSink, MetricsCollector},
    model::ModelProvider,
    scheduler::InvalidationScheduler,
};
use std::sync::Arc;

/// Container for all initialized Kiln components.
///
/// All components are wrapped in `Arc` and are safe to clone and share across tasks.
#[derive(Clone)]
pub struct KilnComponents {
    metrics_collector: Option<Arc<MetricsCollector>>,
    events: Arc<dyn EventSink>,
    model_provider: Arc<ModelProvider>,
    content_cache: Arc<GroupCache>,
    request_manager: Arc<RequestManager>,
    scheduler: Arc<InvalidationScheduler>,
}

impl KilnComponents {
    #[must_use]
    pub fn new(
        metrics_collector: Option<Arc<MetricsCollector>>,
        events: Arc<dyn EventSink>,
        model_provider: Arc<ModelProvider>,
        content_cache: Arc<GroupCache>,
        request_manager: Arc<RequestManager>,
        scheduler: Arc<InvalidationScheduler>,
    ) -> Self {
        Self { metrics_collector, events, model_provider, content_cache, request_manager, scheduler }
    }

    /// Present when metrics are enabled in the configuration.
    #[must_use]
    pub fn metrics_collector(&self) -> Option<&Arc<MetricsCollector>> {
        self.metrics_collector.as_ref()
    }

    #[must_use]
    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    #[must_use]
    pub fn model_provider(&self) -> &Arc<ModelProvider> {
        &self.model_provider
    }

    #[must_use]
    pub fn content_cache(&self) -> &Arc<GroupCache> {
        &self.content_cache
    }

    #[must_use]
    pub fn request_manager(&self) -> &Arc<RequestManager> {
        &self.request_manager
    }

    #[must_use]
    pub fn scheduler(&self) -> &Arc<InvalidationScheduler> {
        &self.scheduler
    }
}

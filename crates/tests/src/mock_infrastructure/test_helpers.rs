//! Test helpers: a mock-backed harness and eventual-consistency polling.

use super::{MockModelLoader, MockResourceReader, RecordingSink};
use kiln_core::{
    cache::{ContentCache, ContentCacheConfig},
    manager::{GroupCache, RequestManager},
    model::{Group, ModelProvider, ResourceModel, ResourceRef},
    processor::ProcessorChain,
    scheduler::{InvalidationScheduler, StalenessFlag},
};
use std::{future::Future, sync::Arc};
use tokio::time::{sleep, Duration, Instant};

/// Builds a model from `(name, resources)` pairs.
///
/// # Panics
///
/// Panics if the groups do not form a valid model.
#[must_use]
pub fn model(groups: Vec<(&str, Vec<ResourceRef>)>) -> ResourceModel {
    ResourceModel::new(groups.into_iter().map(|(name, resources)| Group::new(name, resources)))
        .expect("valid test model")
}

/// Knobs for [`Harness::new`].
pub struct HarnessOptions {
    pub model_update_period: Duration,
    pub content_update_period: Duration,
    pub evict_on_error: bool,
    pub chain: ProcessorChain,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            model_update_period: Duration::from_secs(3600),
            content_update_period: Duration::from_secs(3600),
            evict_on_error: false,
            chain: ProcessorChain::identity(),
        }
    }
}

/// A `RequestManager` wired to mocks, with handles to every collaborator.
pub struct Harness {
    pub manager: Arc<RequestManager>,
    pub provider: Arc<ModelProvider>,
    pub cache: Arc<GroupCache>,
    pub loader: Arc<MockModelLoader>,
    pub reader: Arc<MockResourceReader>,
    pub sink: Arc<RecordingSink>,
    pub model_flag: Arc<StalenessFlag>,
    pub content_flag: Arc<StalenessFlag>,
}

impl Harness {
    #[must_use]
    pub fn new(model: ResourceModel, reader: MockResourceReader, options: HarnessOptions) -> Self {
        Self::with_loader(MockModelLoader::new(model), reader, options)
    }

    #[must_use]
    pub fn with_loader(
        loader: MockModelLoader,
        reader: MockResourceReader,
        options: HarnessOptions,
    ) -> Self {
        let loader = Arc::new(loader);
        let reader = Arc::new(reader);
        let sink = Arc::new(RecordingSink::new());
        let model_flag = Arc::new(StalenessFlag::new());
        let content_flag = Arc::new(StalenessFlag::new());

        let provider = Arc::new(
            ModelProvider::new(loader.clone(), options.model_update_period, model_flag.clone(), sink.clone())
                .with_content_flag(content_flag.clone()),
        );
        let cache = Arc::new(ContentCache::new(
            ContentCacheConfig {
                update_period: options.content_update_period,
                evict_on_error: options.evict_on_error,
            },
            content_flag.clone(),
            sink.clone(),
        ));
        let manager = Arc::new(RequestManager::new(
            provider.clone(),
            cache.clone(),
            Arc::new(options.chain),
            reader.clone(),
            sink.clone(),
        ));

        Self { manager, provider, cache, loader, reader, sink, model_flag, content_flag }
    }

    /// A scheduler driving this harness's flags. Not started.
    #[must_use]
    pub fn scheduler(&self) -> InvalidationScheduler {
        InvalidationScheduler::new(
            self.model_flag.clone(),
            self.content_flag.clone(),
            self.sink.clone(),
        )
        .with_sweeper(self.cache.clone())
    }
}

/// Configuration for timing-sensitive test assertions.
pub struct TestTiming {
    /// Maximum time to wait for a condition to become true.
    pub poll_timeout: Duration,
    /// Interval between checks when polling.
    pub poll_interval: Duration,
    /// Duration to verify a condition remains false (for negative tests).
    pub stability_duration: Duration,
}

impl Default for TestTiming {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(20),
            stability_duration: Duration::from_millis(200),
        }
    }
}

/// Polls until a condition becomes true, or times out.
///
/// # Errors
///
/// Returns a message naming the condition on timeout.
pub async fn poll_until<F, Fut>(
    condition_name: &str,
    timing: &TestTiming,
    mut check: F,
) -> Result<Duration, String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < timing.poll_timeout {
        if check().await {
            return Ok(start.elapsed());
        }
        sleep(timing.poll_interval).await;
    }
    Err(format!("{condition_name} did not become true within {:?}", timing.poll_timeout))
}

/// Verifies a condition remains false for the stability duration.
///
/// # Errors
///
/// Returns a message naming the condition if it became true.
pub async fn remains_false_for<F, Fut>(
    condition_name: &str,
    timing: &TestTiming,
    mut check: F,
) -> Result<(), String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < timing.stability_duration {
        if check().await {
            return Err(format!(
                "{condition_name} unexpectedly became true after {:?}",
                start.elapsed()
            ));
        }
        sleep(timing.poll_interval).await;
    }
    Ok(())
}

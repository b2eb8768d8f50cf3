//! Builder for wiring the Kiln runtime from configuration and injected collaborators.

use crate::{
    cache::ContentCache,
    config::AppConfig,
    manager::RequestManager,
    metrics::{EventSink, FanoutSink, MetricsCollector, TracingSink},
    model::{FileModelLoader, ModelLoader, ModelProvider},
    processor::ProcessorChain,
    resource::{FsResourceReader, ResourceReader},
    scheduler::{InvalidationScheduler, StalenessFlag},
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use super::{lifecycle::KilnRuntime, KilnComponents};

/// Errors that can occur during runtime initialization.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to initialize metrics collector: {0}")]
    MetricsInitialization(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// The initial model load requested by [`KilnRuntimeBuilder::preload_model`] failed.
    #[error("Initial model load failed: {0}")]
    ModelLoad(String),
}

#[derive(Clone, Copy)]
struct RuntimeOptions {
    enable_scheduler: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self { enable_scheduler: true }
    }
}

/// Builder for constructing a [`KilnRuntime`].
///
/// Every collaborator defaults to the one named in the configuration and can be replaced:
///
/// | Collaborator | Default |
/// |--------------|---------|
/// | loader | [`FileModelLoader`] on `resources.model_path` |
/// | reader | [`FsResourceReader`] rooted at `resources.root_dir` |
/// | chain | [`ProcessorChain::standard`] with `resources.variables` |
/// | event sink | [`MetricsCollector`] + [`TracingSink`] when metrics are enabled |
///
/// # Examples
///
/// ```no_run
/// # use kiln_core::{config::AppConfig, runtime::KilnRuntimeBuilder};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let runtime = KilnRuntimeBuilder::new().with_config(AppConfig::load()?).build()?;
/// # runtime.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct KilnRuntimeBuilder {
    config: Option<AppConfig>,
    loader: Option<Arc<dyn ModelLoader>>,
    reader: Option<Arc<dyn ResourceReader>>,
    events: Option<Arc<dyn EventSink>>,
    chain: Option<ProcessorChain>,
    options: RuntimeOptions,
}

impl KilnRuntimeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: None,
            loader: None,
            reader: None,
            events: None,
            chain: None,
            options: RuntimeOptions::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn with_loader(mut self, loader: Arc<dyn ModelLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    #[must_use]
    pub fn with_reader(mut self, reader: Arc<dyn ResourceReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Replaces the default sink. The Prometheus collector is then not created.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub fn with_chain(mut self, chain: ProcessorChain) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Leaves the invalidation timers stopped. Entries then go stale through the update
    /// periods and manual invalidation only.
    #[must_use]
    pub fn disable_scheduler(mut self) -> Self {
        self.options.enable_scheduler = false;
        self
    }

    #[must_use]
    pub fn enable_scheduler(mut self) -> Self {
        self.options.enable_scheduler = true;
        self
    }

    /// Builds the runtime and starts the invalidation scheduler.
    ///
    /// Must be called within a tokio runtime. The model is loaded lazily on first request; use
    /// [`preload_model`](Self::preload_model) to fail early on a broken model source.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] if configuration is missing or invalid, or if the metrics
    /// recorder cannot be initialized.
    pub fn build(self) -> Result<KilnRuntime, RuntimeError> {
        let config = self.config.ok_or_else(|| {
            RuntimeError::ConfigValidation("No configuration provided".to_string())
        })?;

        config.validate().map_err(RuntimeError::ConfigValidation)?;

        info!(
            model_path = %config.resources.model_path,
            model_update_period_s = config.pipeline.model_update_period_seconds,
            content_update_period_s = config.pipeline.content_update_period_seconds,
            policy = %config.pipeline.on_processor_error,
            scheduler_enabled = self.options.enable_scheduler,
            "Initializing Kiln runtime"
        );

        let model_flag = Arc::new(StalenessFlag::new());
        let content_flag = Arc::new(StalenessFlag::new());

        let (events, metrics_collector) = match self.events {
            Some(events) => (events, None),
            None if config.metrics.enabled => {
                let collector = Arc::new(
                    MetricsCollector::new()
                        .map_err(|e| RuntimeError::MetricsInitialization(e.to_string()))?,
                );
                let sinks: Vec<Arc<dyn EventSink>> =
                    vec![collector.clone() as Arc<dyn EventSink>, Arc::new(TracingSink)];
                let events: Arc<dyn EventSink> = Arc::new(FanoutSink::new(sinks));
                (events, Some(collector))
            }
            None => (Arc::new(TracingSink) as Arc<dyn EventSink>, None),
        };
        debug!(metrics_enabled = metrics_collector.is_some(), "Event sink initialized");

        let loader: Arc<dyn ModelLoader> = match self.loader {
            Some(loader) => loader,
            None => Arc::new(FileModelLoader::new(&config.resources.model_path)),
        };
        let model_provider = Arc::new(
            ModelProvider::new(loader, config.model_update_period(), model_flag.clone(), events.clone())
                .with_content_flag(content_flag.clone()),
        );
        debug!("Model provider initialized");

        let content_cache = Arc::new(ContentCache::new(
            config.content_cache_config(),
            content_flag.clone(),
            events.clone(),
        ));
        debug!("Content cache initialized");

        let chain = self.chain.unwrap_or_else(|| {
            ProcessorChain::standard(
                config.resources.variables.clone(),
                config.pipeline.on_processor_error,
            )
        });
        debug!(steps = ?chain.step_names(), "Processor chain initialized");

        let reader: Arc<dyn ResourceReader> = match self.reader {
            Some(reader) => reader,
            None => Arc::new(FsResourceReader::new(&config.resources.root_dir)),
        };

        let request_manager = Arc::new(RequestManager::new(
            model_provider.clone(),
            content_cache.clone(),
            Arc::new(chain),
            reader,
            events.clone(),
        ));
        debug!("Request manager initialized");

        let scheduler = Arc::new(
            InvalidationScheduler::new(model_flag, content_flag, events.clone())
                .with_sweeper(content_cache.clone()),
        );
        if self.options.enable_scheduler {
            scheduler.start(config.model_update_period(), config.content_update_period());
            debug!("Invalidation scheduler started");
        } else {
            debug!("Invalidation scheduler disabled");
        }

        let components = KilnComponents::new(
            metrics_collector,
            events,
            model_provider,
            content_cache,
            request_manager,
            scheduler,
        );

        info!("Kiln runtime initialization complete");

        Ok(KilnRuntime::new(components, config))
    }

    /// Builds the runtime and loads the model once before returning.
    ///
    /// # Errors
    ///
    /// Same as [`build`](Self::build), plus [`RuntimeError::ModelLoad`] if the first load
    /// fails. The scheduler is stopped again in that case.
    pub async fn preload_model(self) -> Result<KilnRuntime, RuntimeError> {
        let runtime = self.build()?;
        match runtime.model_provider().refresh().await {
            Ok(model) => {
                info!(groups = model.len(), "Resource model preloaded");
                Ok(runtime)
            }
            Err(e) => {
                runtime.shutdown().await;
                Err(RuntimeError::ModelLoad(e.to_string()))
            }
        }
    }
}

impl Default for KilnRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

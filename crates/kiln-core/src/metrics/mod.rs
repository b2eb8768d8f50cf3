//! # Observability
//!
//! The request pipeline reports what it does through an [`EventSink`]. Sinks are
//! fire-and-forget: `record` takes `&self`, returns nothing and must never block, so a slow or
//! broken sink cannot stall or fail a request.
//!
//! ## Sinks
//!
//! | Sink | Behavior |
//! |------|----------|
//! | [`MetricsCollector`] | Prometheus counters via the `metrics` facade |
//! | [`TracingSink`] | One structured log line per event |
//! | [`NoopSink`] | Drops everything |
//! | [`FanoutSink`] | Forwards to several sinks |
//!
//! ## String Interning
//!
//! Group names are used as metric labels. They are interned into `&'static str` on first use
//! to avoid a label allocation per request. The group key space is bounded by the model, so
//! this is a bounded leak.

use crate::{
    cache::CacheKey,
    manager::ManagerError,
    model::ModelError,
    scheduler::Artifact,
};
use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::{
    borrow::Cow,
    sync::{Arc, OnceLock},
};
use tracing::{debug, info, warn};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

static GROUP_NAME_POOL: OnceLock<dashmap::DashMap<String, &'static str>> = OnceLock::new();

#[inline]
fn group_to_static(group: &str) -> Cow<'static, str> {
    let pool = GROUP_NAME_POOL.get_or_init(dashmap::DashMap::new);

    if let Some(interned) = pool.get(group) {
        return Cow::Borrowed(*interned);
    }

    let owned = group.to_string();
    let leaked: &'static str = Box::leak(owned.clone().into_boxed_str());
    pool.insert(owned, leaked);
    Cow::Borrowed(leaked)
}

#[inline]
fn kind_label(key: &CacheKey) -> &'static str {
    key.kind.map_or("all", |kind| kind.as_str())
}

/// Events emitted by the cache layer, the model provider and the scheduler.
#[derive(Debug, Clone, Copy)]
pub enum CacheEvent<'a> {
    /// Served from a fresh cache entry.
    Hit { key: &'a CacheKey },
    /// This caller ran the computation.
    Miss { key: &'a CacheKey },
    /// This caller waited on a computation started by another caller.
    Coalesced { key: &'a CacheKey },
    /// Resolution or processing failed for this key.
    Error { key: &'a CacheKey, error: &'a ManagerError },
    /// A new model snapshot was published.
    ModelRefreshed { groups: usize },
    /// A reload failed. `serving_stale` is true when a previous model is still being served.
    ModelRefreshFailed { error: &'a ModelError, serving_stale: bool },
    /// The scheduler raised the staleness flag for an artifact.
    Invalidated { artifact: Artifact },
}

/// Receiver for pipeline events.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &CacheEvent<'_>);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn record(&self, event: &CacheEvent<'_>) {
        (**self).record(event);
    }
}

/// Maps a state or error to a stable metric label.
pub trait MetricsState {
    fn as_metric_str(&self) -> &'static str;
}

impl MetricsState for ManagerError {
    fn as_metric_str(&self) -> &'static str {
        match self {
            Self::UnknownGroup(_) => "unknown_group",
            Self::InvalidRequest(_) => "invalid_request",
            Self::LoadFailed(err) => err.as_metric_str(),
            Self::ProcessingFailed(_) => "processing_failed",
            Self::Output(_) => "output_failed",
        }
    }
}

impl MetricsState for ModelError {
    fn as_metric_str(&self) -> &'static str {
        match self {
            Self::DuplicateGroup(_) | Self::EmptyGroupName => "model_invalid",
            Self::Unavailable(_) => "model_unavailable",
            Self::Malformed(_) => "model_malformed",
            Self::ColdStart(_) => "model_cold_start",
        }
    }
}

impl MetricsState for Artifact {
    fn as_metric_str(&self) -> &'static str {
        self.as_str()
    }
}

fn try_init_prometheus_recorder(
) -> Result<PrometheusHandle, metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new().install_recorder()
}

fn init_prometheus_recorder() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| match try_init_prometheus_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "Failed to install primary Prometheus recorder, attempting fallback"
                );

                let recorder = PrometheusBuilder::new().build_recorder();
                tracing::warn!(
                    "Using fallback Prometheus recorder (install error: {e}) - metrics may not be globally visible"
                );
                recorder.handle()
            }
        })
        .clone()
}

/// Prometheus-backed event sink.
///
/// Counter increments are atomic, so recording never blocks the request path.
pub struct MetricsCollector {
    prometheus_handle: PrometheusHandle,
}

impl MetricsCollector {
    /// # Errors
    ///
    /// Returns an error if the Prometheus recorder cannot be initialized.
    pub fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let prometheus_handle = init_prometheus_recorder();
        Ok(Self { prometheus_handle })
    }

    /// Renders current metrics in the Prometheus text exposition format.
    #[must_use]
    pub fn get_prometheus_metrics(&self) -> String {
        self.prometheus_handle.render()
    }
}

impl EventSink for MetricsCollector {
    fn record(&self, event: &CacheEvent<'_>) {
        match event {
            CacheEvent::Hit { key } => {
                let group = group_to_static(&key.group);
                counter!("kiln_cache_hits_total", "group" => group, "kind" => kind_label(key))
                    .increment(1);
            }
            CacheEvent::Miss { key } => {
                let group = group_to_static(&key.group);
                counter!("kiln_cache_misses_total", "group" => group, "kind" => kind_label(key))
                    .increment(1);
            }
            CacheEvent::Coalesced { key } => {
                let group = group_to_static(&key.group);
                counter!("kiln_cache_coalesced_total", "group" => group, "kind" => kind_label(key))
                    .increment(1);
            }
            CacheEvent::Error { error, .. } => {
                // Unknown group names come from clients; keep them out of label values.
                counter!("kiln_cache_errors_total", "error_type" => error.as_metric_str())
                    .increment(1);
            }
            CacheEvent::ModelRefreshed { .. } => {
                counter!("kiln_model_refresh_total", "outcome" => "success").increment(1);
            }
            CacheEvent::ModelRefreshFailed { error, serving_stale } => {
                let outcome = if *serving_stale { "stale" } else { "failed" };
                counter!(
                    "kiln_model_refresh_total",
                    "outcome" => outcome,
                    "error_type" => error.as_metric_str()
                )
                .increment(1);
            }
            CacheEvent::Invalidated { artifact } => {
                counter!("kiln_invalidations_total", "artifact" => artifact.as_metric_str())
                    .increment(1);
            }
        }
    }
}

/// Sink that logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &CacheEvent<'_>) {
        match event {
            CacheEvent::Hit { key } => debug!(%key, "cache hit"),
            CacheEvent::Miss { key } => debug!(%key, "cache miss"),
            CacheEvent::Coalesced { key } => debug!(%key, "joined in-flight computation"),
            CacheEvent::Error { key, error } => warn!(%key, error = %error, "group computation failed"),
            CacheEvent::ModelRefreshed { groups } => info!(groups, "resource model refreshed"),
            CacheEvent::ModelRefreshFailed { error, serving_stale } => {
                warn!(error = %error, serving_stale, "resource model refresh failed");
            }
            CacheEvent::Invalidated { artifact } => debug!(artifact = artifact.as_str(), "staleness flag raised"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn record(&self, _event: &CacheEvent<'_>) {}
}

/// Forwards every event to each inner sink in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutSink {
    fn record(&self, event: &CacheEvent<'_>) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }
}

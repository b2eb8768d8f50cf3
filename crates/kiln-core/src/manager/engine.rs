use super::{GroupRequest, ManagerError, RequestContext};
use crate::{
    cache::{CacheKey, CacheStatus, ContentCache},
    metrics::{CacheEvent, EventSink},
    model::{ModelProvider, ResourceKind, ResourceModel},
    processor::{ProcessingContext, ProcessorChain},
    resource::{ResourceReadError, ResourceReader},
};
use bytes::Bytes;
use futures::future::join_all;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, debug_span, Instrument};

/// Cache type used by the manager: failures are shared as [`ManagerError`].
pub type GroupCache = ContentCache<ManagerError>;

/// Processed content for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupContent {
    pub content: Bytes,
    pub status: CacheStatus,
    pub kind: Option<ResourceKind>,
}

impl GroupContent {
    /// MIME type for the response. Whole-group requests mixing kinds are served as plain text.
    #[must_use]
    pub fn content_type(&self) -> &'static str {
        self.kind.map_or("text/plain; charset=utf-8", ResourceKind::content_type)
    }
}

/// Ties the model provider, content cache and processor chain together per request.
///
/// Holds no mutable state of its own beyond a request id counter.
///
/// The model is resolved before the cache is consulted. A reload that publishes a different
/// model raises the content flag, so the lookup that follows never serves content computed
/// against the previous model.
///
/// # Request Flow
///
/// ```text
/// process(request)
///   ├─► ModelProvider::current()                 LoadFailed on cold start
///   └─► ContentCache::get_or_compute(key)
///         └─ [miss] process against that model
///               ├─ model.group(name)             UnknownGroup if absent
///               ├─ read resources (declared order)
///               ├─ pre steps per resource
///               └─ post steps on merged content  ProcessingFailed under fail-fast
/// ```
pub struct RequestManager {
    provider: Arc<ModelProvider>,
    cache: Arc<GroupCache>,
    chain: Arc<ProcessorChain>,
    reader: Arc<dyn ResourceReader>,
    events: Arc<dyn EventSink>,
    next_request_id: AtomicU64,
}

impl RequestManager {
    #[must_use]
    pub fn new(
        provider: Arc<ModelProvider>,
        cache: Arc<GroupCache>,
        chain: Arc<ProcessorChain>,
        reader: Arc<dyn ResourceReader>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self { provider, cache, chain, reader, events, next_request_id: AtomicU64::new(1) }
    }

    /// Returns processed content for `request`, from cache when fresh.
    ///
    /// # Errors
    ///
    /// - [`ManagerError::UnknownGroup`] if the group is not in the current model
    /// - [`ManagerError::LoadFailed`] if no model could ever be loaded
    /// - [`ManagerError::ProcessingFailed`] if a step or resource read failed under fail-fast
    pub async fn process(&self, request: &GroupRequest) -> Result<GroupContent, ManagerError> {
        let ctx = RequestContext::new(self.next_request_id.fetch_add(1, Ordering::Relaxed), request.clone());
        let key = request.cache_key();
        let span = debug_span!("group_request", id = ctx.id, key = %key);

        async {
            let result = match self.provider.current().await {
                Ok(model) => {
                    self.cache
                        .get_or_compute(&key, || async {
                            // A model published after `current` returned is visible here once
                            // the cache has observed its invalidation.
                            let latest = self.provider.snapshot().unwrap_or_else(|| Arc::clone(&model));
                            self.process_with(&latest, &ctx).await
                        })
                        .await
                }
                Err(err) => Err(err.into()),
            };
            match result {
                Ok(read) => {
                    debug!(
                        status = read.status.as_str(),
                        bytes = read.content.len(),
                        elapsed_us = ctx.received_at.elapsed().as_micros(),
                        "request served"
                    );
                    Ok(GroupContent { content: read.content, status: read.status, kind: request.kind })
                }
                Err(err) => {
                    self.record_error(&key, &err);
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Processes `request` and writes the content to `out`.
    ///
    /// # Errors
    ///
    /// Errors from [`process`](Self::process), or [`ManagerError::Output`] if writing fails.
    pub async fn process_to<W>(
        &self,
        request: &GroupRequest,
        out: &mut W,
    ) -> Result<GroupContent, ManagerError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let content = self.process(request).await?;
        out.write_all(&content.content).await.map_err(|e| ManagerError::Output(e.to_string()))?;
        out.flush().await.map_err(|e| ManagerError::Output(e.to_string()))?;
        Ok(content)
    }

    /// Resolves the group in the current model and runs it through the chain, bypassing the
    /// content cache.
    ///
    /// # Errors
    ///
    /// Same as [`process`](Self::process) minus output errors.
    pub async fn resolve_and_process(&self, ctx: &RequestContext) -> Result<Bytes, ManagerError> {
        let model = self.provider.current().await?;
        self.process_with(&model, ctx).await
    }

    async fn process_with(&self, model: &ResourceModel, ctx: &RequestContext) -> Result<Bytes, ManagerError> {
        let request = &ctx.request;
        let group = model
            .group(&request.group)
            .ok_or_else(|| ManagerError::UnknownGroup(request.group.to_string()))?;

        let resources: Vec<_> = group.resources_of(request.kind).collect();
        // Reads run concurrently; join_all yields results in declaration order.
        let contents = join_all(resources.iter().map(|resource| self.reader.read(resource))).await;

        let processing = ProcessingContext::for_group(group.name(), request.kind, request.minimize);
        let mut merged = String::new();

        for (resource, read) in resources.iter().zip(contents) {
            let text = match read.and_then(|raw| decode_utf8(&resource.uri, raw)) {
                Ok(text) => text,
                Err(err) => {
                    self.chain.on_read_error(resource, &err)?;
                    continue;
                }
            };
            merged.push_str(&self.chain.apply_to_resource(text, &processing.with_resource(resource))?);
        }

        let output = self.chain.apply(merged, &processing)?;
        debug!(group = group.name(), resources = resources.len(), bytes = output.len(), "group processed");
        Ok(Bytes::from(output))
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<GroupCache> {
        &self.cache
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<ModelProvider> {
        &self.provider
    }

    #[must_use]
    pub fn chain(&self) -> &Arc<ProcessorChain> {
        &self.chain
    }

    fn record_error(&self, key: &CacheKey, err: &ManagerError) {
        self.events.record(&CacheEvent::Error { key, error: err });
    }
}

fn decode_utf8(uri: &str, raw: Bytes) -> Result<String, ResourceReadError> {
    String::from_utf8(raw.to_vec()).map_err(|_| ResourceReadError::InvalidUtf8(uri.to_string()))
}

impl std::fmt::Debug for RequestManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestManager")
            .field("provider", &self.provider)
            .field("cache", &self.cache)
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

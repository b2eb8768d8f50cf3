//! Routes: processed groups under the configured mount prefix, plus health and metrics.

use crate::middleware::{make_request_span, request_id_layers};
use axum::{
    body::Body,
    extract::{Path, RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use kiln_core::{
    cache::CacheStatus,
    manager::{GroupRequest, ManagerError},
    runtime::KilnRuntime,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::{debug, warn};

/// Builds the application router around a running [`KilnRuntime`].
///
/// | Route | Handler |
/// |-------|---------|
/// | `GET /{prefix}/{file}` | processed group, e.g. `/assets/site.css` |
/// | `GET /health` | model and cache status as JSON |
/// | `GET /metrics` | Prometheus text format, 404 when metrics are disabled |
pub fn create_router(runtime: Arc<KilnRuntime>) -> Router {
    let group_route = format!("/{}/{{file}}", runtime.config().mount_prefix());
    let (set_request_id, propagate_request_id) = request_id_layers();

    Router::new()
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .route(&group_route, get(handle_group))
        .with_state(runtime)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<Body>))
        .layer(propagate_request_id)
        .layer(set_request_id)
}

fn cache_status_header(status: CacheStatus) -> &'static str {
    match status {
        CacheStatus::Hit => "HIT",
        CacheStatus::Miss => "MISS",
        CacheStatus::Coalesced => "COALESCED",
    }
}

fn error_status(err: &ManagerError) -> StatusCode {
    match err {
        ManagerError::UnknownGroup(_) => StatusCode::NOT_FOUND,
        ManagerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Serves one processed group. The `x-cache-status` header reports how it was obtained.
pub async fn handle_group(
    State(runtime): State<Arc<KilnRuntime>>,
    Path(file): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    let result = match GroupRequest::from_path(&file, query.as_deref()) {
        Ok(request) => runtime.process(&request).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(content) => (
            StatusCode::OK,
            [
                ("content-type", content.content_type()),
                ("x-cache-status", cache_status_header(content.status)),
            ],
            content.content,
        )
            .into_response(),
        Err(err) => {
            let status = error_status(&err);
            if status.is_server_error() {
                warn!(file = %file, error = %err, "group request failed");
            } else {
                debug!(file = %file, error = %err, "group request rejected");
            }
            (status, [("content-type", "text/plain; charset=utf-8")], err.to_string())
                .into_response()
        }
    }
}

#[allow(clippy::unused_async)]
pub async fn handle_metrics(State(runtime): State<Arc<KilnRuntime>>) -> Response {
    match runtime.components().metrics_collector() {
        Some(collector) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            collector.get_prometheus_metrics(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}

/// Healthy once a model has been loaded; a server that never managed to load one reports 503.
#[allow(clippy::unused_async)]
pub async fn handle_health(State(runtime): State<Arc<KilnRuntime>>) -> impl IntoResponse {
    let model = runtime.model_provider().snapshot();
    let stats = runtime.content_cache().stats();

    let health_status = serde_json::json!({
        "status": if model.is_some() { "healthy" } else { "unhealthy" },
        "model": {
            "loaded": model.is_some(),
            "groups": model.as_ref().map_or(0, |model| model.len()),
            "loads": runtime.model_provider().load_count(),
        },
        "cache": stats,
        "scheduler_running": runtime.components().scheduler().is_running(),
    });

    (
        if model.is_some() { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE },
        [("content-type", "application/json")],
        serde_json::to_string(&health_status).unwrap_or_default(),
    )
}

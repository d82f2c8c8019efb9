//! Health checks, metrics, and monitoring endpoints.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::context::ProxyContext;
use crate::metrics::MetricsSnapshot;

// ============================================================================
// Health Checks
// ============================================================================

/// GET /health - Basic health check
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

// ============================================================================
// Metrics
// ============================================================================

/// GET /metrics - Prometheus metrics endpoint
pub async fn metrics_handler(Extension(handle): Extension<PrometheusHandle>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
        .into_response()
}

/// GET /api/metrics - Metrics snapshot as JSON
pub async fn api_metrics_handler(
    Extension(ctx): Extension<Arc<ProxyContext>>,
) -> Json<MetricsSnapshot> {
    Json(ctx.metrics.snapshot().await)
}

//! Cache invalidation handlers.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use tracing::{info, instrument, warn};

use ogc_common::ProxyError;
use storage::LayerClearOutcome;

use crate::context::ProxyContext;

/// DELETE /api/cache/:repository - Drop the cache of every project of a repository
#[instrument(skip(ctx))]
pub async fn clear_repository_handler(
    Extension(ctx): Extension<Arc<ProxyContext>>,
    Path(repository): Path<String>,
) -> impl IntoResponse {
    info!("Clearing repository cache");
    ctx.metrics.record_cache_clear("repository");

    match ctx.cache.clear_repository(&repository).await {
        Ok(Some(cleared)) => (
            StatusCode::OK,
            Json(json!({ "scope": "repository", "repository": cleared, "cleared": true })),
        ),
        Ok(None) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "scope": "repository", "repository": repository, "cleared": false })),
        ),
        Err(e) => rejected("repository", &e),
    }
}

/// DELETE /api/cache/:repository/:project - Drop the cache of one project
#[instrument(skip(ctx))]
pub async fn clear_project_handler(
    Extension(ctx): Extension<Arc<ProxyContext>>,
    Path((repository, project)): Path<(String, String)>,
) -> impl IntoResponse {
    info!("Clearing project cache");
    ctx.metrics.record_cache_clear("project");

    let cleared = match ctx.cache.clear_project(&repository, &project).await {
        Ok(cleared) => cleared,
        Err(e) => return rejected("project", &e),
    };
    let status = if cleared {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (
        status,
        Json(json!({
            "scope": "project",
            "repository": repository,
            "project": project,
            "cleared": cleared
        })),
    )
}

/// DELETE /api/cache/:repository/:project/:layer - Drop the cache entries of one layer
#[instrument(skip(ctx))]
pub async fn clear_layer_handler(
    Extension(ctx): Extension<Arc<ProxyContext>>,
    Path((repository, project, layer)): Path<(String, String, String)>,
) -> impl IntoResponse {
    info!("Clearing layer cache");
    ctx.metrics.record_cache_clear("layer");

    let outcome = match ctx.cache.clear_layer(&repository, &project, &layer).await {
        Ok(outcome) => outcome,
        Err(e) => return rejected("layer", &e),
    };
    let (outcome_name, removed) = match outcome {
        LayerClearOutcome::Cleared { removed } => ("cleared", removed),
        LayerClearOutcome::NothingToClear => ("nothing_to_clear", 0),
        LayerClearOutcome::ProjectFlushed => ("project_flushed", 0),
        LayerClearOutcome::Failed => ("failed", 0),
    };
    let status = if outcome.is_success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (
        status,
        Json(json!({
            "scope": "layer",
            "repository": repository,
            "project": project,
            "layer": layer,
            "outcome": outcome_name,
            "removed": removed
        })),
    )
}

/// Response to a clear request whose scope names are not usable.
fn rejected(scope: &str, err: &ProxyError) -> (StatusCode, Json<serde_json::Value>) {
    warn!(scope, error = %err, "Rejected cache clear");
    let status = StatusCode::from_u16(err.http_status_code()).unwrap_or(StatusCode::BAD_REQUEST);
    (
        status,
        Json(json!({ "scope": scope, "cleared": false, "error": err.to_string() })),
    )
}

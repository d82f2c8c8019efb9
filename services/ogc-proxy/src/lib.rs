//! Lizmap OGC proxy.
//!
//! Sits between the web client and the QGIS map server: builds typed OGC
//! requests, serves cacheable tiles from per-layer cache profiles, forwards
//! everything else to the map server and exposes cache invalidation.

pub mod config;
pub mod context;
pub mod echo;
pub mod handlers;
pub mod metrics;
pub mod transport;

use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{delete, get},
    Router,
};

pub use context::ProxyContext;

/// Routes of the proxy, with the context attached.
pub fn app(ctx: Arc<ProxyContext>) -> Router {
    Router::new()
        // OGC endpoint
        .route(
            "/ows",
            get(handlers::ows_get_handler).post(handlers::ows_post_handler),
        )
        .route(
            "/ows/",
            get(handlers::ows_get_handler).post(handlers::ows_post_handler),
        )
        // Cache invalidation
        .route(
            "/api/cache/:repository",
            delete(handlers::clear_repository_handler),
        )
        .route(
            "/api/cache/:repository/:project",
            delete(handlers::clear_project_handler),
        )
        .route(
            "/api/cache/:repository/:project/:layer",
            delete(handlers::clear_layer_handler),
        )
        // Monitoring
        .route("/health", get(handlers::health_handler))
        .route("/api/metrics", get(handlers::api_metrics_handler))
        .layer(Extension(ctx))
}

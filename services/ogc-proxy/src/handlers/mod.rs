//! HTTP request handlers.
//!
//! - `ows`: the OGC endpoint (WMS, WFS, WMTS), cached or proxied
//! - `cache`: cache invalidation per repository, project or layer
//! - `health`: health check and metrics

pub mod cache;
pub mod health;
pub mod ows;

pub use cache::{clear_layer_handler, clear_project_handler, clear_repository_handler};
pub use health::{api_metrics_handler, health_handler, metrics_handler};
pub use ows::{ows_get_handler, ows_post_handler};

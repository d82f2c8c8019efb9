//! Common types and utilities shared across the OGC proxy crates.

pub mod error;
pub mod http;
pub mod params;

pub use error::{ProxyError, ProxyResult};
pub use http::http_status_message;
pub use params::{construct_url, normalize_bbox, normalize_params, ParamMap, PARAMS_BLOCKLIST};

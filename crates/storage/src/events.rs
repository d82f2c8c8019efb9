//! Notifications emitted after cache invalidation.

use serde::Serialize;
use tracing::info;

/// A cache clear that just happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum CacheEvent {
    #[serde(rename = "lizmapProxyClearCache")]
    RepositoryCleared { repository: String },
    #[serde(rename = "lizmapProxyClearProjectCache")]
    ProjectCleared { repository: String, project: String },
    #[serde(rename = "lizmapProxyClearLayerCache")]
    LayerCleared {
        repository: String,
        project: String,
        layer: String,
    },
}

/// Receives cache events, e.g. to purge a CDN or a tile seeder.
pub trait EventNotifier: Send + Sync {
    fn notify(&self, event: &CacheEvent);
}

/// Notifier that only logs events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl EventNotifier for LogNotifier {
    fn notify(&self, event: &CacheEvent) {
        info!(?event, "Cache cleared");
    }
}

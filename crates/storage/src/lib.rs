//! Cache storage for the OGC proxy.
//!
//! Responses are cached per (repository, project, layers, crs) tuple. Each
//! tuple is bound to a named profile backed by one of:
//! - files under the cache root
//! - a SQLite database per layer set
//! - a key prefix in Redis
//!
//! [`CacheManager`] declares profiles lazily and clears them by repository,
//! project or layer.

pub mod backend;
pub mod config;
pub mod events;
pub mod invalidation;
pub mod manager;
pub mod profile;
pub mod root;

pub use backend::{CacheBackend, CacheStore};
pub use config::{CacheConfig, CacheStorageType, FlushMethod, RedisConfig};
pub use events::{CacheEvent, EventNotifier, LogNotifier};
pub use invalidation::{entry_matches_layer, LayerClearOutcome};
pub use manager::CacheManager;
pub use profile::{profile_name, BackendParams, CacheProfile, RedisParams};
pub use root::{is_writable_dir, resolve_cache_root};

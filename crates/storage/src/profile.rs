//! Cache profiles: a named binding of a (repository, project, layers, crs)
//! tuple to a storage backend.

use std::path::PathBuf;

use crate::config::{CacheConfig, FlushMethod};

/// Prefix of every cache profile name.
pub const PROFILE_NAME_PREFIX: &str = "lizmapCache";

/// Prefix of every file written by the file cache.
pub const FILE_NAME_PREFIX: &str = "lizmap_";

/// Directory fan-out depth of the file cache.
pub const FILE_DIRECTORY_LEVEL: usize = 5;

/// Deterministic profile name of a cache tuple.
pub fn profile_name(repository: &str, project: &str, layers: &str, crs: &str) -> String {
    format!(
        "{}_{}_{}_{}_{}",
        PROFILE_NAME_PREFIX, repository, project, layers, crs
    )
}

/// Parameters of a file cache profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileParams {
    pub cache_dir: PathBuf,
    pub file_locking: bool,
    pub directory_level: usize,
    pub file_name_prefix: String,
}

/// Parameters of a SQLite cache profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteParams {
    pub database: PathBuf,
    /// Payloads are stored base64 encoded.
    pub base64_encoding: bool,
}

/// Parameters of a Redis cache profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisParams {
    pub host: String,
    pub port: u16,
    pub db: Option<i64>,
    pub key_prefix: String,
    pub flush_method: FlushMethod,
}

impl RedisParams {
    /// Derive the Redis parameters of a cache scope.
    ///
    /// The key prefix gets coarser as the scope widens: `repo/` for a whole
    /// repository, `repo/project/` for a project, and
    /// `repo/project/layers/crs/` for a layer set. A configured key prefix
    /// is prepended to the derived one.
    pub fn for_scope(
        config: &CacheConfig,
        repository: &str,
        project: Option<&str>,
        layers: Option<&str>,
        crs: Option<&str>,
    ) -> Self {
        let derived = match (project, layers) {
            (Some(project), Some(layers)) if !project.is_empty() && !layers.is_empty() => {
                format!(
                    "{}/{}/{}/{}/",
                    repository,
                    project,
                    layers,
                    crs.unwrap_or_default()
                )
            }
            (Some(project), _) if !project.is_empty() => format!("{}/{}/", repository, project),
            _ => format!("{}/", repository),
        };

        let redis = &config.redis;
        let key_prefix = match redis.key_prefix.as_deref().map(str::trim) {
            Some(configured) if !configured.is_empty() => format!("{}{}", configured, derived),
            _ => derived,
        };

        Self {
            host: redis.host.trim().to_string(),
            port: redis.port,
            db: redis.db.filter(|db| *db != 0),
            key_prefix,
            flush_method: redis.key_prefix_flush_method.unwrap_or_default(),
        }
    }

    /// Connection URL for the redis client.
    pub fn url(&self) -> String {
        match self.db {
            Some(db) => format!("redis://{}:{}/{}", self.host, self.port, db),
            None => format!("redis://{}:{}", self.host, self.port),
        }
    }
}

/// Backend-specific part of a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendParams {
    File(FileParams),
    Sqlite(SqliteParams),
    Redis(RedisParams),
}

/// A declared cache profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheProfile {
    pub name: String,
    pub backend: BackendParams,
    /// Time to live in seconds, 0 for no expiry.
    pub ttl: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;

    fn config_with_redis(redis: RedisConfig) -> CacheConfig {
        CacheConfig {
            redis,
            ..CacheConfig::default()
        }
    }

    #[test]
    fn test_profile_name() {
        assert_eq!(
            profile_name("demo", "parks", "trees", "EPSG:4326"),
            "lizmapCache_demo_parks_trees_EPSG:4326"
        );
    }

    #[test]
    fn test_redis_prefix_granularity() {
        let config = CacheConfig::default();
        let layer = RedisParams::for_scope(&config, "demo", Some("parks"), Some("trees"), Some("EPSG:4326"));
        assert_eq!(layer.key_prefix, "demo/parks/trees/EPSG:4326/");

        let project = RedisParams::for_scope(&config, "demo", Some("parks"), None, None);
        assert_eq!(project.key_prefix, "demo/parks/");

        let repository = RedisParams::for_scope(&config, "demo", None, None, None);
        assert_eq!(repository.key_prefix, "demo/");
    }

    #[test]
    fn test_redis_overrides() {
        let config = config_with_redis(RedisConfig {
            host: " redis.internal ".to_string(),
            port: 6380,
            db: Some(3),
            key_prefix: Some("lizmap:".to_string()),
            key_prefix_flush_method: Some(FlushMethod::Direct),
        });
        let params = RedisParams::for_scope(&config, "demo", Some("parks"), None, None);
        assert_eq!(params.key_prefix, "lizmap:demo/parks/");
        assert_eq!(params.host, "redis.internal");
        assert_eq!(params.flush_method, FlushMethod::Direct);
        assert_eq!(params.url(), "redis://redis.internal:6380/3");
    }

    #[test]
    fn test_redis_url_without_db() {
        let params = RedisParams::for_scope(&CacheConfig::default(), "demo", None, None, None);
        assert_eq!(params.url(), "redis://localhost:6379");
    }
}

//! Cache storage configuration.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

/// Where proxied responses are cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStorageType {
    File,
    #[default]
    Sqlite,
    Redis,
}

impl CacheStorageType {
    /// Parse a configured storage type. Anything other than `file` or
    /// `redis` selects SQLite.
    pub fn from_config(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "file" => Self::File,
            "redis" => Self::Redis,
            _ => Self::Sqlite,
        }
    }

    /// Whether this storage keeps its data under the cache root directory.
    pub fn uses_filesystem(&self) -> bool {
        !matches!(self, Self::Redis)
    }
}

impl<'de> Deserialize<'de> for CacheStorageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::from_config(&value))
    }
}

/// How keys under a Redis prefix are removed on flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushMethod {
    /// Incremental `SCAN` + `DEL`.
    #[default]
    Scan,
    /// Single `KEYS` + `DEL`. Blocks the Redis server on large databases.
    Direct,
}

/// Redis connection settings shared by every Redis cache profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    /// Database index; the server default is used when unset.
    pub db: Option<i64>,
    /// Prepended to every derived key prefix.
    pub key_prefix: Option<String>,
    pub key_prefix_flush_method: Option<FlushMethod>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: None,
            key_prefix: None,
            key_prefix_flush_method: None,
        }
    }
}

/// Cache settings of the proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub storage_type: CacheStorageType,
    /// Time to live of cached entries, in seconds. 0 means no expiry.
    pub expiration: u64,
    /// Root of the file and SQLite caches.
    pub root_directory: PathBuf,
    pub redis: RedisConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            storage_type: CacheStorageType::default(),
            expiration: 0,
            root_directory: std::env::temp_dir(),
            redis: RedisConfig::default(),
        }
    }
}

//! Cache storage backends.
//!
//! Each declared profile is served by one of three stores behind the same
//! [`CacheStore`] interface: files on disk, a SQLite database per layer set,
//! or a key prefix in Redis.

pub mod file;
pub mod redis;
pub mod sqlite;

use async_trait::async_trait;
use bytes::Bytes;

use ogc_common::ProxyResult;

use crate::profile::{BackendParams, CacheProfile};

pub use self::file::FileStore;
pub use self::redis::RedisStore;
pub use self::sqlite::SqliteStore;

/// Key/value operations of a cache profile.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a live entry. Expired entries are reported as missing.
    async fn get(&self, key: &str) -> ProxyResult<Option<Bytes>>;

    /// Store an entry with the profile TTL.
    async fn set(&self, key: &str, data: &[u8]) -> ProxyResult<()>;

    /// Remove one entry. Removing a missing entry is not an error.
    async fn delete(&self, key: &str) -> ProxyResult<()>;

    /// Remove every entry of the profile.
    async fn flush(&self) -> ProxyResult<()>;
}

/// The store of a provisioned profile.
pub enum CacheBackend {
    File(FileStore),
    Sqlite(SqliteStore),
    Redis(RedisStore),
}

impl CacheBackend {
    /// Provision the storage a profile needs: directories, the SQLite file.
    /// Redis needs nothing.
    pub async fn provision(params: &BackendParams) -> ProxyResult<()> {
        match params {
            BackendParams::File(p) => FileStore::provision(p).await,
            BackendParams::Sqlite(p) => SqliteStore::provision(p).await,
            BackendParams::Redis(_) => Ok(()),
        }
    }

    /// Open the store of an already provisioned profile.
    pub async fn open(profile: &CacheProfile) -> ProxyResult<Self> {
        Ok(match &profile.backend {
            BackendParams::File(p) => CacheBackend::File(FileStore::new(p.clone(), profile.ttl)),
            BackendParams::Sqlite(p) => {
                CacheBackend::Sqlite(SqliteStore::open(p, profile.ttl).await?)
            }
            BackendParams::Redis(p) => {
                CacheBackend::Redis(RedisStore::connect(p.clone(), profile.ttl).await?)
            }
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CacheBackend::File(_) => "file",
            CacheBackend::Sqlite(_) => "sqlite",
            CacheBackend::Redis(_) => "redis",
        }
    }

    fn store(&self) -> &dyn CacheStore {
        match self {
            CacheBackend::File(s) => s,
            CacheBackend::Sqlite(s) => s,
            CacheBackend::Redis(s) => s,
        }
    }
}

#[async_trait]
impl CacheStore for CacheBackend {
    async fn get(&self, key: &str) -> ProxyResult<Option<Bytes>> {
        self.store().get(key).await
    }

    async fn set(&self, key: &str, data: &[u8]) -> ProxyResult<()> {
        self.store().set(key, data).await
    }

    async fn delete(&self, key: &str) -> ProxyResult<()> {
        self.store().delete(key).await
    }

    async fn flush(&self) -> ProxyResult<()> {
        self.store().flush().await
    }
}

/// Expiry timestamp (unix seconds) of an entry written now, `None` without TTL.
pub(crate) fn expiry_from_ttl(ttl: u64) -> Option<i64> {
    if ttl == 0 {
        None
    } else {
        Some(chrono::Utc::now().timestamp() + ttl as i64)
    }
}

/// Hex SHA-256 of a cache key, used to build file names.
pub(crate) fn key_hash(key: &str) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(key.as_bytes()))
}

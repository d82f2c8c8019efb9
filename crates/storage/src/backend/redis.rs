//! Redis cache store.

use async_trait::async_trait;
use bytes::Bytes;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use tracing::{debug, instrument};

use ogc_common::{ProxyError, ProxyResult};

use super::CacheStore;
use crate::config::FlushMethod;
use crate::profile::RedisParams;

/// Number of keys requested per SCAN round trip.
const SCAN_BATCH: usize = 500;

/// Redis backed cache store, scoped to a key prefix.
pub struct RedisStore {
    conn: MultiplexedConnection,
    params: RedisParams,
    ttl: u64,
}

impl RedisStore {
    /// Connect to Redis.
    pub async fn connect(params: RedisParams, ttl: u64) -> ProxyResult<Self> {
        let conn = connect(&params).await?;
        Ok(Self { conn, params, ttl })
    }

    pub fn key_prefix(&self) -> &str {
        &self.params.key_prefix
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.params.key_prefix, key)
    }
}

async fn connect(params: &RedisParams) -> ProxyResult<MultiplexedConnection> {
    let client = Client::open(params.url())
        .map_err(|e| ProxyError::CacheError(format!("Redis connection failed: {}", e)))?;

    client
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| ProxyError::CacheError(format!("Redis connection failed: {}", e)))
}

/// Escape glob metacharacters so a key prefix matches literally in
/// `KEYS`/`SCAN` patterns.
pub fn escape_pattern(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Delete every key under the prefix of `params`, returning the number of
/// keys removed.
#[instrument(skip(params), fields(prefix = %params.key_prefix))]
pub async fn flush_prefix(params: &RedisParams) -> ProxyResult<u64> {
    let mut conn = connect(params).await?;
    delete_by_prefix(&mut conn, &params.key_prefix, params.flush_method).await
}

async fn delete_by_prefix(
    conn: &mut MultiplexedConnection,
    prefix: &str,
    method: FlushMethod,
) -> ProxyResult<u64> {
    let pattern = format!("{}*", escape_pattern(prefix));
    let mut removed = 0u64;

    match method {
        FlushMethod::Direct => {
            let keys: Vec<String> = redis::cmd("KEYS")
                .arg(&pattern)
                .query_async(&mut *conn)
                .await
                .map_err(|e| ProxyError::CacheError(format!("Pattern search failed: {}", e)))?;
            removed += delete_keys(conn, keys).await?;
        }
        FlushMethod::Scan => {
            let mut cursor: u64 = 0;
            loop {
                let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH)
                    .query_async(&mut *conn)
                    .await
                    .map_err(|e| ProxyError::CacheError(format!("Key scan failed: {}", e)))?;
                removed += delete_keys(conn, keys).await?;
                if next == 0 {
                    break;
                }
                cursor = next;
            }
        }
    }

    debug!(removed, "Flushed Redis key prefix");
    Ok(removed)
}

async fn delete_keys(conn: &mut MultiplexedConnection, keys: Vec<String>) -> ProxyResult<u64> {
    if keys.is_empty() {
        return Ok(0);
    }
    let count: u64 = conn
        .del(keys)
        .await
        .map_err(|e| ProxyError::CacheError(format!("Delete failed: {}", e)))?;
    Ok(count)
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> ProxyResult<Option<Bytes>> {
        let mut conn = self.conn.clone();
        let result: Option<Vec<u8>> = conn
            .get(self.full_key(key))
            .await
            .map_err(|e| ProxyError::CacheError(format!("Cache get failed: {}", e)))?;
        Ok(result.map(Bytes::from))
    }

    async fn set(&self, key: &str, data: &[u8]) -> ProxyResult<()> {
        let mut conn = self.conn.clone();
        let key = self.full_key(key);
        let result: redis::RedisResult<()> = if self.ttl > 0 {
            conn.set_ex(key, data, self.ttl).await
        } else {
            conn.set(key, data).await
        };
        result.map_err(|e| ProxyError::CacheError(format!("Cache set failed: {}", e)))
    }

    async fn delete(&self, key: &str) -> ProxyResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(self.full_key(key))
            .await
            .map_err(|e| ProxyError::CacheError(format!("Cache delete failed: {}", e)))?;
        Ok(())
    }

    async fn flush(&self) -> ProxyResult<()> {
        let mut conn = self.conn.clone();
        delete_by_prefix(&mut conn, &self.params.key_prefix, self.params.flush_method).await?;
        Ok(())
    }
}

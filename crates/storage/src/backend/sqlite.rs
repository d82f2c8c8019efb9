//! SQLite cache store.
//!
//! One database per layer set, seeded from a bundled template that already
//! holds the `jlx_cache` table. Payloads are stored base64 encoded.

use std::io::{ErrorKind, Write};
use std::path::Path;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info, instrument};

use ogc_common::{ProxyError, ProxyResult};

use super::{expiry_from_ttl, CacheStore};
use crate::profile::SqliteParams;

/// Empty cache database with the `jlx_cache` schema.
pub const CACHE_TEMPLATE_DB: &[u8] = include_bytes!("../../assets/cache_template.db");

/// SQLite backed cache store.
pub struct SqliteStore {
    pool: SqlitePool,
    ttl: u64,
    base64_encoding: bool,
}

impl SqliteStore {
    /// Create the database directory and copy the template database when the
    /// database file does not exist yet.
    pub async fn provision(params: &SqliteParams) -> ProxyResult<()> {
        let database = params.database.clone();
        tokio::task::spawn_blocking(move || seed_database(&database))
            .await
            .map_err(|e| ProxyError::InternalError(format!("SQLite seeding task failed: {}", e)))?
    }

    /// Open a connection pool on a provisioned database.
    pub async fn open(params: &SqliteParams, ttl: u64) -> ProxyResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&params.database)
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                ProxyError::DatabaseError(format!(
                    "Failed to open cache database {}: {}",
                    params.database.display(),
                    e
                ))
            })?;

        debug!(path = %params.database.display(), "Opened SQLite cache database");

        Ok(Self {
            pool,
            ttl,
            base64_encoding: params.base64_encoding,
        })
    }
}

fn seed_database(database: &Path) -> ProxyResult<()> {
    let provisioning = |e: std::io::Error| {
        ProxyError::CacheProvisioning(format!(
            "Failed to create cache database {}: {}",
            database.display(),
            e
        ))
    };

    let dir = database.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(provisioning)?;
    if database.exists() {
        return Ok(());
    }

    // Write aside then link into place so concurrent workers never see a
    // partially copied database.
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(provisioning)?;
    tmp.write_all(CACHE_TEMPLATE_DB).map_err(provisioning)?;
    match tmp.persist_noclobber(database) {
        Ok(_) => {
            info!(path = %database.display(), "Created cache database from template");
            Ok(())
        }
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(provisioning(e.error)),
    }
}

fn db_error(action: &str, e: sqlx::Error) -> ProxyError {
    ProxyError::DatabaseError(format!("Cache {} failed: {}", action, e))
}

#[async_trait]
impl CacheStore for SqliteStore {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> ProxyResult<Option<Bytes>> {
        let now = chrono::Utc::now().timestamp();
        let row: Option<(Vec<u8>,)> = sqlx::query_as(
            "SELECT cache_data FROM jlx_cache WHERE cache_key = ? AND (cache_date IS NULL OR cache_date > ?)",
        )
        .bind(key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get", e))?;

        let Some((data,)) = row else {
            return Ok(None);
        };

        if self.base64_encoding {
            let decoded = STANDARD
                .decode(&data)
                .map_err(|e| ProxyError::CacheError(format!("Corrupted cache entry: {}", e)))?;
            Ok(Some(Bytes::from(decoded)))
        } else {
            Ok(Some(Bytes::from(data)))
        }
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn set(&self, key: &str, data: &[u8]) -> ProxyResult<()> {
        let payload = if self.base64_encoding {
            STANDARD.encode(data).into_bytes()
        } else {
            data.to_vec()
        };

        sqlx::query(
            "INSERT OR REPLACE INTO jlx_cache (cache_key, cache_data, cache_date) VALUES (?, ?, ?)",
        )
        .bind(key)
        .bind(payload)
        .bind(expiry_from_ttl(self.ttl))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("set", e))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> ProxyResult<()> {
        sqlx::query("DELETE FROM jlx_cache WHERE cache_key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("delete", e))?;
        Ok(())
    }

    async fn flush(&self) -> ProxyResult<()> {
        sqlx::query("DELETE FROM jlx_cache")
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("flush", e))?;
        Ok(())
    }
}

//! File system cache store.
//!
//! Entries live under the profile directory in a hashed fan-out tree
//! (`a/ab/abc/abcd/abcde/lizmap_<hash>`) so that no single directory grows
//! too large. Each file starts with an 8-byte big-endian expiry timestamp
//! (0 for none) followed by the payload. Reads take a shared lock and writes
//! an exclusive one when file locking is enabled.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use fs2::FileExt;
use tracing::{debug, instrument};

use ogc_common::{ProxyError, ProxyResult};

use super::{expiry_from_ttl, key_hash, CacheStore};
use crate::profile::FileParams;

const HEADER_LEN: usize = 8;

/// File backed cache store.
#[derive(Debug, Clone)]
pub struct FileStore {
    params: FileParams,
    ttl: u64,
}

impl FileStore {
    pub fn new(params: FileParams, ttl: u64) -> Self {
        Self { params, ttl }
    }

    /// Create the profile directory if needed.
    pub async fn provision(params: &FileParams) -> ProxyResult<()> {
        tokio::fs::create_dir_all(&params.cache_dir)
            .await
            .map_err(|e| {
                ProxyError::CacheProvisioning(format!(
                    "Failed to create cache directory {}: {}",
                    params.cache_dir.display(),
                    e
                ))
            })
    }

    /// Path of the file holding `key`.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        let hash = key_hash(key);
        let mut path = self.params.cache_dir.clone();
        for level in 1..=self.params.directory_level.min(hash.len()) {
            path.push(&hash[..level]);
        }
        path.push(format!("{}{}", self.params.file_name_prefix, hash));
        path
    }

    fn read_entry(path: PathBuf, locking: bool) -> std::io::Result<Option<Vec<u8>>> {
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        if locking {
            file.lock_shared()?;
        }
        let mut content = Vec::new();
        let read = file.read_to_end(&mut content);
        if locking {
            file.unlock()?;
        }
        read?;

        if content.len() < HEADER_LEN {
            return Ok(None);
        }
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&content[..HEADER_LEN]);
        let expires_at = i64::from_be_bytes(header);
        if expires_at != 0 && expires_at <= chrono::Utc::now().timestamp() {
            drop(file);
            let _ = fs::remove_file(&path);
            return Ok(None);
        }

        Ok(Some(content.split_off(HEADER_LEN)))
    }

    fn write_entry(
        path: PathBuf,
        data: Vec<u8>,
        expires_at: i64,
        locking: bool,
    ) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        if locking {
            file.lock_exclusive()?;
        }
        let written = (|| {
            file.set_len(0)?;
            file.write_all(&expires_at.to_be_bytes())?;
            file.write_all(&data)?;
            file.flush()
        })();
        if locking {
            file.unlock()?;
        }
        written
    }
}

async fn blocking<T, F>(task: F) -> ProxyResult<T>
where
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| ProxyError::InternalError(format!("File cache task failed: {}", e)))?
        .map_err(|e| ProxyError::CacheError(format!("File cache I/O failed: {}", e)))
}

#[async_trait]
impl CacheStore for FileStore {
    #[instrument(skip(self), fields(dir = %self.params.cache_dir.display()))]
    async fn get(&self, key: &str) -> ProxyResult<Option<Bytes>> {
        let path = self.entry_path(key);
        let locking = self.params.file_locking;
        let data = blocking(move || Self::read_entry(path, locking)).await?;
        debug!(hit = data.is_some(), "File cache lookup");
        Ok(data.map(Bytes::from))
    }

    #[instrument(skip(self, data), fields(dir = %self.params.cache_dir.display(), size = data.len()))]
    async fn set(&self, key: &str, data: &[u8]) -> ProxyResult<()> {
        let path = self.entry_path(key);
        let data = data.to_vec();
        let expires_at = expiry_from_ttl(self.ttl).unwrap_or(0);
        let locking = self.params.file_locking;
        blocking(move || Self::write_entry(path, data, expires_at, locking)).await
    }

    async fn delete(&self, key: &str) -> ProxyResult<()> {
        let path = self.entry_path(key);
        blocking(move || match fs::remove_file(&path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        })
        .await
    }

    async fn flush(&self) -> ProxyResult<()> {
        let dir = self.params.cache_dir.clone();
        blocking(move || {
            match fs::remove_dir_all(&dir) {
                Err(e) if e.kind() != ErrorKind::NotFound => return Err(e),
                _ => {}
            }
            fs::create_dir_all(&dir)
        })
        .await
    }
}

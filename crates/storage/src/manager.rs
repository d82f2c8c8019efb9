//! Cache profile declaration and lookup.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, instrument};

use ogc_common::{ProxyError, ProxyResult};

use crate::backend::CacheBackend;
use crate::config::{CacheConfig, CacheStorageType};
use crate::events::{EventNotifier, LogNotifier};
use crate::profile::{
    profile_name, BackendParams, CacheProfile, FileParams, RedisParams, SqliteParams,
    FILE_DIRECTORY_LEVEL, FILE_NAME_PREFIX,
};
use crate::root::{check_path_component, resolve_cache_root};

/// Owns the cache configuration and the registry of declared profiles.
///
/// One manager is built per process and shared. The registry is process
/// local: another worker declaring the same profile provisions it again,
/// which is harmless because provisioning only creates what is missing.
pub struct CacheManager {
    config: CacheConfig,
    profiles: Mutex<HashMap<String, CacheProfile>>,
    stores: tokio::sync::Mutex<HashMap<String, Arc<CacheBackend>>>,
    pub(crate) notifier: Arc<dyn EventNotifier>,
}

impl CacheManager {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_notifier(config, Arc::new(LogNotifier))
    }

    pub fn with_notifier(config: CacheConfig, notifier: Arc<dyn EventNotifier>) -> Self {
        Self {
            config,
            profiles: Mutex::new(HashMap::new()),
            stores: tokio::sync::Mutex::new(HashMap::new()),
            notifier,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Cache root in use for file and SQLite storage.
    pub fn cache_root(&self) -> PathBuf {
        resolve_cache_root(&self.config.root_directory)
    }

    /// Profile parameters of a cache tuple for the configured storage type.
    ///
    /// Every member of the tuple must be a plain path component.
    pub fn profile_for(
        &self,
        repository: &str,
        project: &str,
        layers: &str,
        crs: &str,
    ) -> ProxyResult<CacheProfile> {
        check_path_component("repository", repository)?;
        check_path_component("project", project)?;
        check_path_component("layers", layers)?;
        check_path_component("crs", crs)?;

        let name = profile_name(repository, project, layers, crs);

        let backend = match self.config.storage_type {
            CacheStorageType::File => {
                let cache_dir = self
                    .cache_root()
                    .join(repository)
                    .join(project)
                    .join(layers)
                    .join(crs);
                BackendParams::File(FileParams {
                    cache_dir,
                    file_locking: true,
                    directory_level: FILE_DIRECTORY_LEVEL,
                    file_name_prefix: FILE_NAME_PREFIX.to_string(),
                })
            }
            CacheStorageType::Redis => BackendParams::Redis(RedisParams::for_scope(
                &self.config,
                repository,
                Some(project),
                Some(layers),
                Some(crs),
            )),
            CacheStorageType::Sqlite => {
                let database = self
                    .cache_root()
                    .join(repository)
                    .join(project)
                    .join(format!("{}_{}.db", layers, crs));
                BackendParams::Sqlite(SqliteParams {
                    database,
                    base64_encoding: true,
                })
            }
        };

        Ok(CacheProfile {
            name,
            backend,
            ttl: self.config.expiration,
        })
    }

    /// Declare the cache profile of a tuple, provisioning its storage on
    /// first use, and return the profile name.
    ///
    /// Declaring an already registered profile returns immediately without
    /// touching storage.
    #[instrument(skip(self))]
    pub async fn declare_profile(
        &self,
        repository: &str,
        project: &str,
        layers: &str,
        crs: &str,
    ) -> ProxyResult<String> {
        let profile = self.profile_for(repository, project, layers, crs)?;
        let name = profile.name.clone();
        if self.is_declared(&name) {
            return Ok(name);
        }

        CacheBackend::provision(&profile.backend).await?;

        info!(profile = %name, "Declared cache profile");
        self.lock_profiles()?.insert(name.clone(), profile);
        Ok(name)
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.lock_profiles()
            .map(|profiles| profiles.contains_key(name))
            .unwrap_or(false)
    }

    pub fn profile(&self, name: &str) -> Option<CacheProfile> {
        self.lock_profiles().ok()?.get(name).cloned()
    }

    /// Store of a declared profile. Stores are opened once and reused.
    ///
    /// The store map is not locked while a store opens. When two callers
    /// race on the same profile, the first inserted store wins.
    pub async fn store(&self, name: &str) -> ProxyResult<Arc<CacheBackend>> {
        if let Some(store) = self.stores.lock().await.get(name) {
            return Ok(store.clone());
        }

        let profile = self
            .profile(name)
            .ok_or_else(|| ProxyError::CacheError(format!("Unknown cache profile: {}", name)))?;
        let opened = Arc::new(CacheBackend::open(&profile).await?);
        debug!(profile = %name, kind = opened.kind(), "Opened cache store");

        let store = self
            .stores
            .lock()
            .await
            .entry(name.to_string())
            .or_insert(opened)
            .clone();
        Ok(store)
    }

    /// Forget declared profiles and open stores whose name starts with
    /// `prefix`, so that the next declaration provisions storage again.
    pub(crate) async fn forget_profiles(&self, prefix: &str) {
        if let Ok(mut profiles) = self.lock_profiles() {
            profiles.retain(|name, _| !name.starts_with(prefix));
        }
        self.stores
            .lock()
            .await
            .retain(|name, _| !name.starts_with(prefix));
    }

    fn lock_profiles(
        &self,
    ) -> ProxyResult<std::sync::MutexGuard<'_, HashMap<String, CacheProfile>>> {
        self.profiles
            .lock()
            .map_err(|_| ProxyError::InternalError("Cache profile registry poisoned".to_string()))
    }
}

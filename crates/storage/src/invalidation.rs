//! Repository, project and layer scoped cache clearing.

use std::io::ErrorKind;
use std::path::Path;

use tracing::{error, info, instrument, warn};

use ogc_common::ProxyResult;

use crate::backend::redis::flush_prefix;
use crate::config::CacheStorageType;
use crate::events::CacheEvent;
use crate::manager::CacheManager;
use crate::profile::{RedisParams, PROFILE_NAME_PREFIX};
use crate::root::check_path_component;

/// Result of a layer scoped clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerClearOutcome {
    /// Entries belonging to the layer were removed.
    Cleared { removed: usize },
    /// The layer had nothing cached.
    NothingToClear,
    /// Redis keys are not addressable per layer: the whole project cache
    /// was flushed instead.
    ProjectFlushed,
    /// The clear failed; details are in the error log.
    Failed,
}

impl LayerClearOutcome {
    /// Whether the layer no longer has cached entries.
    pub fn is_success(&self) -> bool {
        !matches!(self, LayerClearOutcome::Failed)
    }
}

/// Whether a cache directory entry belongs to `layer`: the layer name must
/// appear as a token bounded by the start or end of the name or by `_`.
pub fn entry_matches_layer(entry: &str, layer: &str) -> bool {
    if layer.is_empty() {
        return false;
    }
    entry.match_indices(layer).any(|(start, _)| {
        let end = start + layer.len();
        let before_ok = start == 0 || entry.as_bytes()[start - 1] == b'_';
        let after_ok = end == entry.len() || entry.as_bytes()[end] == b'_';
        before_ok && after_ok
    })
}

async fn remove_path(path: &Path) -> std::io::Result<()> {
    let metadata = tokio::fs::symlink_metadata(path).await?;
    if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    }
}

impl CacheManager {
    fn scope_prefix(parts: &[&str]) -> String {
        let mut prefix = PROFILE_NAME_PREFIX.to_string();
        for part in parts {
            prefix.push('_');
            prefix.push_str(part);
        }
        prefix.push('_');
        prefix
    }

    /// Clear the whole cache of a repository.
    ///
    /// Returns the repository key on success, `None` when the clear failed.
    /// A notification is sent in both cases. A repository without cache
    /// directory counts as cleared.
    #[instrument(skip(self))]
    pub async fn clear_repository(&self, repository: &str) -> ProxyResult<Option<String>> {
        check_path_component("repository", repository)?;

        let cleared = match self.config().storage_type {
            CacheStorageType::Redis => {
                let params = RedisParams::for_scope(self.config(), repository, None, None, None);
                match flush_prefix(&params).await {
                    Ok(removed) => {
                        info!(removed, "Flushed repository cache");
                        true
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to flush repository cache");
                        false
                    }
                }
            }
            CacheStorageType::File | CacheStorageType::Sqlite => {
                let dir = self.cache_root().join(repository);
                match tokio::fs::remove_dir_all(&dir).await {
                    Ok(()) => true,
                    Err(e) if e.kind() == ErrorKind::NotFound => true,
                    Err(e) => {
                        warn!(dir = %dir.display(), error = %e, "Failed to remove repository cache");
                        false
                    }
                }
            }
        };

        self.forget_profiles(&Self::scope_prefix(&[repository])).await;
        self.notifier.notify(&CacheEvent::RepositoryCleared {
            repository: repository.to_string(),
        });

        Ok(cleared.then(|| repository.to_string()))
    }

    /// Clear the cache of one project. A project without cache directory
    /// counts as cleared.
    #[instrument(skip(self))]
    pub async fn clear_project(&self, repository: &str, project: &str) -> ProxyResult<bool> {
        check_path_component("repository", repository)?;
        check_path_component("project", project)?;

        let cleared = match self.config().storage_type {
            CacheStorageType::Redis => {
                let params =
                    RedisParams::for_scope(self.config(), repository, Some(project), None, None);
                match flush_prefix(&params).await {
                    Ok(_) => true,
                    Err(e) => {
                        error!(error = %e, "Failed to flush project cache");
                        false
                    }
                }
            }
            CacheStorageType::File | CacheStorageType::Sqlite => {
                let dir = self.cache_root().join(repository).join(project);
                match tokio::fs::remove_dir_all(&dir).await {
                    Ok(()) => true,
                    Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
                    Err(e) => {
                        warn!(dir = %dir.display(), error = %e, "Failed to remove project cache");
                        false
                    }
                }
            }
        };

        self.forget_profiles(&Self::scope_prefix(&[repository, project]))
            .await;
        self.notifier.notify(&CacheEvent::ProjectCleared {
            repository: repository.to_string(),
            project: project.to_string(),
        });

        Ok(cleared)
    }

    /// Clear the cache of one layer of a project.
    ///
    /// On file and SQLite storage every entry of the project cache directory
    /// whose name contains the layer as a token is removed. Redis keys are
    /// not addressable per layer, so the whole project is flushed and
    /// [`LayerClearOutcome::ProjectFlushed`] is returned.
    #[instrument(skip(self))]
    pub async fn clear_layer(
        &self,
        repository: &str,
        project: &str,
        layer: &str,
    ) -> ProxyResult<LayerClearOutcome> {
        check_path_component("repository", repository)?;
        check_path_component("project", project)?;
        check_path_component("layer", layer)?;

        let outcome = match self.config().storage_type {
            CacheStorageType::Redis => {
                let params =
                    RedisParams::for_scope(self.config(), repository, Some(project), None, None);
                match flush_prefix(&params).await {
                    Ok(_) => LayerClearOutcome::ProjectFlushed,
                    Err(e) => {
                        error!(error = %e, "Failed to flush project cache");
                        return Ok(LayerClearOutcome::Failed);
                    }
                }
            }
            CacheStorageType::File | CacheStorageType::Sqlite => {
                let dir = self.cache_root().join(repository).join(project);
                match self.remove_layer_entries(&dir, layer).await {
                    Ok(0) => return Ok(LayerClearOutcome::NothingToClear),
                    Ok(removed) => LayerClearOutcome::Cleared { removed },
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        return Ok(LayerClearOutcome::NothingToClear)
                    }
                    Err(e) => {
                        error!(dir = %dir.display(), error = %e, "Failed to remove layer cache");
                        return Ok(LayerClearOutcome::Failed);
                    }
                }
            }
        };

        self.forget_profiles(&Self::scope_prefix(&[repository, project]))
            .await;
        self.notifier.notify(&CacheEvent::LayerCleared {
            repository: repository.to_string(),
            project: project.to_string(),
            layer: layer.to_string(),
        });

        Ok(outcome)
    }

    async fn remove_layer_entries(&self, dir: &Path, layer: &str) -> std::io::Result<usize> {
        let mut matching = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if entry_matches_layer(&name.to_string_lossy(), layer) {
                matching.push(entry.path());
            }
        }

        for path in &matching {
            remove_path(path).await?;
        }
        Ok(matching.len())
    }
}

//! Profile declaration tests for the cache manager.

use std::path::Path;

use storage::{CacheConfig, CacheManager, CacheStorageType, CacheStore};
use test_utils::temp_cache_root;

fn manager(storage_type: CacheStorageType, root: &Path) -> CacheManager {
    CacheManager::new(CacheConfig {
        storage_type,
        root_directory: root.to_path_buf(),
        ..CacheConfig::default()
    })
}

// ============================================================================
// Declaration
// ============================================================================

#[tokio::test]
async fn test_declare_file_profile_creates_layer_directory() {
    let root = temp_cache_root();
    let manager = manager(CacheStorageType::File, root.path());

    let name = manager
        .declare_profile("demo", "parks", "trees", "EPSG:4326")
        .await
        .unwrap();

    assert_eq!(name, "lizmapCache_demo_parks_trees_EPSG:4326");
    assert!(manager.is_declared(&name));
    assert!(root.path().join("demo/parks/trees/EPSG:4326").is_dir());
}

#[tokio::test]
async fn test_declare_sqlite_profile_creates_database() {
    let root = temp_cache_root();
    let manager = manager(CacheStorageType::Sqlite, root.path());

    manager
        .declare_profile("demo", "parks", "trees", "EPSG:4326")
        .await
        .unwrap();

    assert!(root.path().join("demo/parks/trees_EPSG:4326.db").is_file());
}

#[tokio::test]
async fn test_second_declaration_does_not_touch_storage() {
    let root = temp_cache_root();
    let manager = manager(CacheStorageType::File, root.path());

    manager
        .declare_profile("demo", "parks", "trees", "EPSG:4326")
        .await
        .unwrap();
    let dir = root.path().join("demo/parks/trees/EPSG:4326");
    std::fs::remove_dir_all(&dir).unwrap();

    let name = manager
        .declare_profile("demo", "parks", "trees", "EPSG:4326")
        .await
        .unwrap();

    assert_eq!(name, "lizmapCache_demo_parks_trees_EPSG:4326");
    assert!(!dir.exists());
}

#[tokio::test]
async fn test_unwritable_root_falls_back_to_temp_dir() {
    let not_a_dir = tempfile::NamedTempFile::new().unwrap();
    let manager = manager(CacheStorageType::File, not_a_dir.path());
    let repository = format!("fallback-{}", std::process::id());

    manager
        .declare_profile(&repository, "parks", "trees", "EPSG:4326")
        .await
        .unwrap();

    let expected = std::env::temp_dir().join(&repository);
    assert!(expected.join("parks/trees/EPSG:4326").is_dir());
    std::fs::remove_dir_all(expected).unwrap();
}

#[tokio::test]
async fn test_redis_profile_needs_no_provisioning() {
    let root = temp_cache_root();
    let manager = manager(CacheStorageType::Redis, root.path());

    let name = manager
        .declare_profile("demo", "parks", "trees", "EPSG:4326")
        .await
        .unwrap();

    let profile = manager.profile(&name).unwrap();
    match profile.backend {
        storage::BackendParams::Redis(params) => {
            assert_eq!(params.key_prefix, "demo/parks/trees/EPSG:4326/")
        }
        other => panic!("unexpected backend {:?}", other),
    }
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

// ============================================================================
// Stores
// ============================================================================

#[tokio::test]
async fn test_store_of_declared_profile() {
    let root = temp_cache_root();
    for storage_type in [CacheStorageType::File, CacheStorageType::Sqlite] {
        let manager = manager(storage_type, root.path());
        let name = manager
            .declare_profile("demo", "parks", "trees", "EPSG:4326")
            .await
            .unwrap();

        let store = manager.store(&name).await.unwrap();
        store.set("tile", b"png bytes").await.unwrap();
        assert_eq!(store.get("tile").await.unwrap().unwrap().as_ref(), b"png bytes");

        // same store handed out again
        let again = manager.store(&name).await.unwrap();
        assert!(std::sync::Arc::ptr_eq(&store, &again));
    }
}

#[tokio::test]
async fn test_store_of_unknown_profile_fails() {
    let root = temp_cache_root();
    let manager = manager(CacheStorageType::File, root.path());
    assert!(manager.store("lizmapCache_nope").await.is_err());
}

#[tokio::test]
async fn test_declare_rejects_names_escaping_the_root() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("cache");
    std::fs::create_dir(&root).unwrap();

    for storage_type in [CacheStorageType::File, CacheStorageType::Sqlite] {
        let manager = manager(storage_type, &root);
        let rejected = [
            ("..", "..", "escaped", "x"),
            ("demo", "parks", "../../escaped", "EPSG:4326"),
            ("demo", "parks", "trees", "EPSG/4326"),
            ("demo", "", "trees", "EPSG:4326"),
            ("demo", "parks\0", "trees", "EPSG:4326"),
        ];
        for (repository, project, layers, crs) in rejected {
            let err = manager
                .declare_profile(repository, project, layers, crs)
                .await
                .unwrap_err();
            assert_eq!(err.http_status_code(), 400);
        }
    }

    assert!(!tmp.path().join("escaped").exists());
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
}

#[tokio::test]
async fn test_concurrent_store_opens_share_one_store() {
    let root = temp_cache_root();
    let manager = manager(CacheStorageType::Sqlite, root.path());
    let trees = manager
        .declare_profile("demo", "parks", "trees", "EPSG:4326")
        .await
        .unwrap();
    let benches = manager
        .declare_profile("demo", "parks", "benches", "EPSG:4326")
        .await
        .unwrap();

    let (a, b, c) = tokio::join!(
        manager.store(&trees),
        manager.store(&trees),
        manager.store(&benches)
    );
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

    assert!(std::sync::Arc::ptr_eq(&a, &b));
    assert!(!std::sync::Arc::ptr_eq(&a, &c));
    assert!(std::sync::Arc::ptr_eq(&a, &manager.store(&trees).await.unwrap()));
}

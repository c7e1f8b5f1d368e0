//! Tests for the pool registry

use std::sync::Arc;

use docpool_core::{DocPoolError, PoolConfig, StoreConfig, StoreSettings};
use pretty_assertions::assert_eq;

use crate::testing;

fn two_pools() -> StoreConfig {
    StoreConfig::new()
        .with_pool("default", testing::settings(PoolConfig::new(0, 2)))
        .with_pool("reporting", testing::settings(PoolConfig::new(0, 1)))
}

#[tokio::test]
async fn test_get_pool_is_memoized() {
    let (registry, state) = testing::registry(two_pools());

    let first = registry.get_pool("default").unwrap();
    let second = registry.get_pool("default").unwrap();
    let other = registry.get_pool("reporting").unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(!Arc::ptr_eq(&first, &other));
    assert_eq!(other.config().max_open(), 1);
    // building a pool opens nothing
    assert_eq!(state.open_attempts(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_access_builds_one_pool() {
    let (registry, _state) = testing::registry(two_pools());

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.get_pool("default").unwrap() })
        })
        .collect();

    let mut pools = Vec::new();
    for task in tasks {
        pools.push(task.await.unwrap());
    }

    assert!(pools.iter().all(|pool| Arc::ptr_eq(pool, &pools[0])));
    assert_eq!(registry.pools().len(), 1);
}

#[test]
fn test_unknown_pool_is_config_missing() {
    let (registry, _state) = testing::registry(two_pools());

    match registry.get_pool("analytics") {
        Err(DocPoolError::ConfigMissing(name)) => assert_eq!(name, "analytics"),
        other => panic!("expected ConfigMissing, got {:?}", other),
    }
    assert!(registry.pools().is_empty());
}

#[tokio::test]
async fn test_invalid_pool_settings_fail_without_connecting() {
    let config = StoreConfig::new().with_pool("broken", StoreSettings::new("", "app"));
    let (registry, state) = testing::registry(config);

    match registry.get_pool("broken") {
        Err(DocPoolError::InvalidConfig { field, .. }) => assert_eq!(field, "host"),
        other => panic!("expected InvalidConfig, got {:?}", other),
    }
    assert!(registry.pools().is_empty());
    assert_eq!(state.open_attempts(), 0);
}

#[test]
fn test_pool_names_come_from_configuration() {
    let (registry, _state) = testing::registry(two_pools());
    assert_eq!(registry.pool_names(), vec!["default", "reporting"]);
}

#[tokio::test]
async fn test_shutdown_closes_every_pool() {
    let (registry, state) = testing::registry(two_pools());
    let default = registry.get_pool("default").unwrap();
    let reporting = registry.get_pool("reporting").unwrap();
    default.acquire().await.unwrap().release();

    registry.shutdown().await;

    assert!(default.is_closed());
    assert!(reporting.is_closed());
    assert_eq!(state.closes(), 1);
    assert!(matches!(
        registry.get_pool("default").unwrap().acquire().await,
        Err(DocPoolError::PoolClosed(_))
    ));
}

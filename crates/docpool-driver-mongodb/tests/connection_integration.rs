//! Integration tests against a live MongoDB server
//!
//! These tests require a running MongoDB server.
//! They are ignored by default and can be run with:
//! ```
//! cargo test --package docpool-driver-mongodb --test connection_integration -- --ignored
//! ```
//!
//! To set up a local MongoDB server for testing:
//! ```
//! docker run -d --name mongo-test -p 27017:27017 mongo:7
//! ```

use std::sync::Arc;

use bson::{Bson, doc};
use docpool_connection::{HealthStatus, PoolRegistry, ping_connection};
use docpool_core::{FindOptions, PoolConfig, StoreConfig, StoreSettings};
use docpool_driver_mongodb::MongoDbDriver;

/// Helper to create a registry with one `default` pool
fn test_registry() -> Arc<PoolRegistry> {
    let host = std::env::var("MONGODB_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = std::env::var("MONGODB_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(27017);
    let database =
        std::env::var("MONGODB_DATABASE").unwrap_or_else(|_| "docpool_test".to_string());

    let mut settings = StoreSettings::new(host, database)
        .with_port(port)
        .with_pool(PoolConfig::new(1, 4));
    // Single node test servers cannot satisfy majority when not in a replica set
    settings.write_concern.w = "1".to_string();
    if let (Ok(user), Ok(password)) = (
        std::env::var("MONGODB_USER"),
        std::env::var("MONGODB_PASSWORD"),
    ) {
        settings = settings.with_credentials(user, password);
    }

    let config = StoreConfig::new().with_pool("default", settings);
    Arc::new(PoolRegistry::new(
        Arc::new(config),
        Arc::new(MongoDbDriver::new()),
    ))
}

fn collection_name(test: &str) -> String {
    format!("docpool_{}_{}", test, std::process::id())
}

#[tokio::test]
#[ignore = "requires running MongoDB server"]
async fn test_mongodb_ping_and_health() {
    let registry = test_registry();
    let mut scope = registry.scope();

    let conn = scope.connection("default").await.expect("Failed to connect");
    let latency = ping_connection(conn).await.expect("Ping failed");
    let status = HealthStatus::from_latency(latency);

    assert!(status.is_usable(), "unexpected status {}", status);
}

#[tokio::test]
#[ignore = "requires running MongoDB server"]
async fn test_mongodb_crud_round() {
    let registry = test_registry();
    let mut scope = registry.scope();
    let namespace = collection_name("crud");
    let mut store = scope.store("default");

    let ids = store
        .insert_many(
            &namespace,
            (0..15).map(|n| doc! { "n": n, "even": n % 2 == 0 }).collect(),
        )
        .await
        .expect("insert_many failed");
    assert_eq!(ids.len(), 15);

    let page = store
        .find_paginated(
            &namespace,
            doc! {},
            10,
            1,
            FindOptions::default().with_sort(doc! { "n": 1 }),
        )
        .await
        .expect("find_paginated failed");
    assert_eq!(page.total_count, 15);
    assert_eq!(page.list.len(), 5);
    assert_eq!(page.list[0].get_i32("n").unwrap(), 10);

    let updated = store
        .update_many(&namespace, doc! { "even": true }, doc! { "flag": "x" })
        .await
        .expect("update_many failed");
    assert_eq!(updated.matched, 8);

    let deleted = store
        .delete_many(&namespace, doc! { "flag": "x" })
        .await
        .expect("delete_many failed");
    assert_eq!(deleted, 8);

    assert_eq!(store.count(&namespace, doc! {}).await.unwrap(), 7);

    store
        .delete_many(&namespace, doc! {})
        .await
        .expect("cleanup failed");
    scope.finish();
    registry.shutdown().await;
}

#[tokio::test]
#[ignore = "requires running MongoDB server"]
async fn test_mongodb_hex_id_lookup() {
    let registry = test_registry();
    let mut scope = registry.scope();
    let namespace = collection_name("hex");
    let mut store = scope.store("default");

    let id = store
        .insert_one(&namespace, doc! { "name": "ada" })
        .await
        .expect("insert_one failed");
    let Bson::ObjectId(oid) = id else {
        panic!("expected a generated ObjectId, got {:?}", id);
    };

    let found = store
        .find_one(
            &namespace,
            doc! { "_id": oid.to_hex() },
            FindOptions::default().with_hex_ids(true),
        )
        .await
        .expect("find_one failed")
        .expect("document not found");
    assert_eq!(found.get_str("_id").unwrap(), oid.to_hex());

    store.delete_many(&namespace, doc! {}).await.unwrap();
}

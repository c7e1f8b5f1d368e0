//! Unit tests for the MongoDB driver

use std::time::Duration;

use super::*;
use crate::driver::{find_one_options, find_options, ordered_ids};
use bson::{Bson, doc};
use docpool_core::{
    ConnectOptions, DocPoolError, Driver, ErrorClass, FindOptions, StoreSettings,
    WriteConcernSettings,
};
use mongodb::options::Acknowledgment;

fn connect_options(uri: &str) -> ConnectOptions {
    ConnectOptions {
        uri: uri.to_string(),
        database: "app".to_string(),
        connect_timeout: Duration::from_millis(250),
        write_concern: WriteConcernSettings::default(),
        app_name: None,
    }
}

// ============================================================================
// Driver Metadata Tests
// ============================================================================

mod driver_metadata_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mongodb_driver_name() {
        let driver = MongoDbDriver::new();
        assert_eq!(driver.name(), "mongodb");
    }

    #[test]
    fn test_mongodb_default_driver() {
        let driver = MongoDbDriver::default();
        assert_eq!(driver.name(), "mongodb");
    }
}

// ============================================================================
// Write Concern Tests
// ============================================================================

mod write_concern_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn settings(w: &str, timeout_ms: u64) -> WriteConcernSettings {
        WriteConcernSettings {
            w: w.to_string(),
            timeout_ms,
            journal: None,
        }
    }

    #[test]
    fn test_default_is_majority_with_timeout() {
        let concern = write_concern(&WriteConcernSettings::default()).unwrap();
        assert_eq!(concern.w, Some(Acknowledgment::Majority));
        assert_eq!(concern.w_timeout, Some(Duration::from_secs(1)));
        assert_eq!(concern.journal, None);
    }

    #[test]
    fn test_node_count() {
        let concern = write_concern(&settings("2", 500)).unwrap();
        assert_eq!(concern.w, Some(Acknowledgment::Nodes(2)));
        assert_eq!(concern.w_timeout, Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_custom_tag_set() {
        let concern = write_concern(&settings("multiDC", 1000)).unwrap();
        assert_eq!(concern.w, Some(Acknowledgment::Custom("multiDC".into())));
    }

    #[test]
    fn test_zero_timeout_waits_indefinitely() {
        let concern = write_concern(&settings("majority", 0)).unwrap();
        assert_eq!(concern.w_timeout, None);
    }

    #[test]
    fn test_journal_is_passed_through() {
        let mut journaled = settings("1", 100);
        journaled.journal = Some(true);
        let concern = write_concern(&journaled).unwrap();
        assert_eq!(concern.journal, Some(true));
    }

    #[test]
    fn test_empty_w_is_config_error() {
        let err = write_concern(&settings("  ", 100)).unwrap_err();
        assert!(matches!(
            err,
            DocPoolError::InvalidConfig { ref field, .. } if field == "write_concern.w"
        ));
    }
}

// ============================================================================
// Client Options Tests
// ============================================================================

mod client_options_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_single_connection_per_client() {
        let options = connect_options("mongodb://localhost:27017/app");
        let client_options = MongoDbDriver::client_options(&options).await.unwrap();

        assert_eq!(client_options.max_pool_size, Some(1));
        assert_eq!(client_options.min_pool_size, Some(0));
        assert_eq!(
            client_options.connect_timeout,
            Some(Duration::from_millis(250))
        );
        assert_eq!(
            client_options.server_selection_timeout,
            Some(Duration::from_millis(250))
        );
        assert_eq!(
            client_options.write_concern.and_then(|wc| wc.w),
            Some(Acknowledgment::Majority)
        );
    }

    #[tokio::test]
    async fn test_app_name_overrides_uri() {
        let mut options = connect_options("mongodb://localhost:27017/?appName=from-uri");
        let untouched = MongoDbDriver::client_options(&options).await.unwrap();
        assert_eq!(untouched.app_name.as_deref(), Some("from-uri"));

        options.app_name = Some("billing".into());
        let overridden = MongoDbDriver::client_options(&options).await.unwrap();
        assert_eq!(overridden.app_name.as_deref(), Some("billing"));
    }

    #[tokio::test]
    async fn test_settings_uri_is_accepted() {
        let settings = StoreSettings::new("db1.internal,db2.internal:27018", "app")
            .with_credentials("svc", "p@ss:word")
            .with_replica_set("rs0");
        let options = ConnectOptions::from_settings(&settings).unwrap();

        let client_options = MongoDbDriver::client_options(&options).await.unwrap();

        assert_eq!(client_options.hosts.len(), 2);
        assert_eq!(client_options.repl_set_name.as_deref(), Some("rs0"));
        let credential = client_options.credential.unwrap();
        assert_eq!(credential.username.as_deref(), Some("svc"));
        assert_eq!(credential.password.as_deref(), Some("p@ss:word"));
        assert_eq!(credential.source.as_deref(), Some("admin"));
    }

    #[tokio::test]
    async fn test_malformed_uri_is_config_error() {
        let options = connect_options("not-a-mongodb-uri");
        let err = MongoDbDriver::client_options(&options).await.unwrap_err();

        assert_eq!(err.class(), ErrorClass::Config);
        assert!(matches!(
            err,
            DocPoolError::InvalidConfig { ref field, .. } if field == "uri"
        ));
    }
}

// ============================================================================
// Find Options Tests
// ============================================================================

mod find_options_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_find_options_are_translated() {
        let options = FindOptions::default()
            .with_sort(doc! { "created_at": -1 })
            .with_projection(doc! { "name": 1 })
            .with_limit(5)
            .with_skip(10);

        let find = find_options(&options);
        assert_eq!(find.sort, Some(doc! { "created_at": -1 }));
        assert_eq!(find.projection, Some(doc! { "name": 1 }));
        assert_eq!(find.limit, Some(5));
        assert_eq!(find.skip, Some(10));

        let find_one = find_one_options(&options);
        assert_eq!(find_one.sort, Some(doc! { "created_at": -1 }));
        assert_eq!(find_one.skip, Some(10));
    }

    #[test]
    fn test_zero_limit_means_unlimited() {
        let find = find_options(&FindOptions::default().with_limit(0));
        assert_eq!(find.limit, None);
    }

    #[test]
    fn test_inserted_ids_follow_batch_order() {
        let ids = ordered_ids(vec![
            (2, Bson::Int32(30)),
            (0, Bson::Int32(10)),
            (1, Bson::Int32(20)),
        ]);
        assert_eq!(ids, vec![Bson::Int32(10), Bson::Int32(20), Bson::Int32(30)]);
    }
}

// ============================================================================
// Connect Failure Tests
// ============================================================================

mod connect_failure_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        // Nothing listens on the discard port
        let options = connect_options("mongodb://127.0.0.1:9/?directConnection=true");
        let driver = MongoDbDriver::new();

        let err = match driver.open(&options).await {
            Ok(_) => panic!("opened a session against an unreachable server"),
            Err(err) => err,
        };

        assert_eq!(err.class(), ErrorClass::Transient);
        assert!(err.is_retryable());
    }
}

use std::time::Duration;

use bson::{Bson, doc};
use pretty_assertions::assert_eq;

use crate::{
    DocPoolError, ErrorClass, FindOptions, Operation, OperationKind, OperationOutput,
    UpdateOutcome, validate_namespace,
};

fn update(multi: bool) -> Operation {
    Operation::Update {
        namespace: "users".into(),
        filter: doc! { "name": "ada" },
        update: doc! { "$set": { "active": true } },
        multi,
    }
}

// =============================================================================
// Operation
// =============================================================================

#[test]
fn test_operation_kind_and_namespace() {
    assert_eq!(update(false).kind(), OperationKind::UpdateOne);
    assert_eq!(update(true).kind(), OperationKind::UpdateMany);
    assert_eq!(update(true).namespace(), "users");

    let delete = Operation::Delete {
        namespace: "sessions".into(),
        filter: doc! {},
        multi: true,
    };
    assert_eq!(delete.kind(), OperationKind::DeleteMany);
    assert!(delete.kind().is_write());
    assert!(!OperationKind::Count.is_write());
}

#[test]
fn test_operation_kind_display_matches_serde() {
    assert_eq!(OperationKind::FindPaginated.to_string(), "find_paginated");
    let json = serde_json::to_string(&OperationKind::InsertMany).unwrap();
    assert_eq!(json, "\"insert_many\"");
}

#[test]
fn test_validate_rejects_empty_insert_many() {
    let op = Operation::InsertMany {
        namespace: "users".into(),
        documents: vec![],
    };
    assert!(matches!(op.validate(), Err(DocPoolError::Argument(_))));
}

#[test]
fn test_validate_rejects_bad_updates() {
    let empty = Operation::Update {
        namespace: "users".into(),
        filter: doc! {},
        update: doc! {},
        multi: false,
    };
    assert!(matches!(empty.validate(), Err(DocPoolError::Argument(_))));

    let mixed = Operation::Update {
        namespace: "users".into(),
        filter: doc! {},
        update: doc! { "$set": { "a": 1 }, "b": 1 },
        multi: false,
    };
    assert!(matches!(mixed.validate(), Err(DocPoolError::Argument(_))));

    assert!(update(true).validate().is_ok());
}

#[test]
fn test_validate_rejects_negative_limit() {
    let op = Operation::FindAll {
        namespace: "users".into(),
        filter: doc! {},
        options: FindOptions::default().with_limit(-1),
    };
    assert!(matches!(op.validate(), Err(DocPoolError::Argument(_))));
}

#[test]
fn test_validate_namespace() {
    assert!(validate_namespace("users").is_ok());
    assert!(validate_namespace("events.archive").is_ok());
    assert!(validate_namespace("").is_err());
    assert!(validate_namespace("   ").is_err());
    assert!(validate_namespace("us$ers").is_err());
    assert!(validate_namespace("system.users").is_err());
}

// =============================================================================
// OperationOutput
// =============================================================================

#[test]
fn test_output_accessors() {
    assert_eq!(OperationOutput::Count(3).into_count().unwrap(), 3);
    assert_eq!(
        OperationOutput::InsertedId(Bson::Int32(7)).into_inserted_id().unwrap(),
        Bson::Int32(7)
    );
    let outcome = UpdateOutcome { matched: 2, modified: 1 };
    assert!(outcome.changed());
    assert_eq!(
        OperationOutput::Updated(outcome).into_update_outcome().unwrap(),
        outcome
    );
}

#[test]
fn test_output_mismatch_is_protocol_error() {
    let err = OperationOutput::Deleted(1).into_documents().unwrap_err();
    assert_eq!(err.class(), ErrorClass::Protocol);
    assert!(err.to_string().contains("deleted count"));
}

// =============================================================================
// Error classification
// =============================================================================

#[test]
fn test_error_classes() {
    assert_eq!(DocPoolError::invalid_config("host", "empty").class(), ErrorClass::Config);
    assert_eq!(DocPoolError::ConfigMissing("x".into()).class(), ErrorClass::Config);
    assert_eq!(DocPoolError::Argument("x".into()).class(), ErrorClass::Argument);
    assert_eq!(DocPoolError::Auth("x".into()).class(), ErrorClass::Auth);
    assert_eq!(DocPoolError::ConnectFailed("x".into()).class(), ErrorClass::Transient);
    assert_eq!(DocPoolError::TransientConnectivity("x".into()).class(), ErrorClass::Transient);
    assert_eq!(DocPoolError::Protocol("x".into()).class(), ErrorClass::Protocol);
    assert_eq!(DocPoolError::PoolClosed("p".into()).class(), ErrorClass::Pool);
    assert_eq!(
        DocPoolError::OperationTimeout {
            operation: OperationKind::Count,
            timeout: Duration::from_secs(1),
        }
        .class(),
        ErrorClass::Timeout
    );
}

#[test]
fn test_only_transient_errors_are_retryable() {
    assert!(DocPoolError::TransientConnectivity("reset".into()).is_retryable());
    assert!(!DocPoolError::Argument("bad".into()).is_retryable());
    assert!(!DocPoolError::Auth("denied".into()).is_retryable());
    assert!(!DocPoolError::invalid_config("port", "0").is_retryable());
}

#[test]
fn test_discards_connection() {
    assert!(DocPoolError::Auth("denied".into()).discards_connection());
    assert!(DocPoolError::Protocol("garbage".into()).discards_connection());
    assert!(!DocPoolError::Argument("bad".into()).discards_connection());
    assert!(!DocPoolError::TransientConnectivity("reset".into()).discards_connection());
}

#[test]
fn test_in_operation_wraps_once() {
    let err = DocPoolError::TransientConnectivity("reset".into())
        .in_operation("users", OperationKind::FindOne)
        .in_operation("orders", OperationKind::Count);

    match &err {
        DocPoolError::OperationFailed { namespace, operation, .. } => {
            assert_eq!(namespace, "users");
            assert_eq!(*operation, OperationKind::FindOne);
        }
        other => panic!("expected OperationFailed, got {:?}", other),
    }
    assert!(err.is_retryable());
    assert!(matches!(err.root(), DocPoolError::TransientConnectivity(_)));
    assert_eq!(
        err.to_string(),
        "find_one on `users` failed: Transient connectivity error: reset"
    );
}

//! Store operations and their results

use std::fmt;

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::{DocPoolError, Result};

/// The kind of an operation, used for error context and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    FindOne,
    FindAll,
    FindPaginated,
    InsertOne,
    InsertMany,
    UpdateOne,
    UpdateMany,
    DeleteOne,
    DeleteMany,
    Count,
    Aggregate,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FindOne => "find_one",
            Self::FindAll => "find_all",
            Self::FindPaginated => "find_paginated",
            Self::InsertOne => "insert_one",
            Self::InsertMany => "insert_many",
            Self::UpdateOne => "update_one",
            Self::UpdateMany => "update_many",
            Self::DeleteOne => "delete_one",
            Self::DeleteMany => "delete_many",
            Self::Count => "count",
            Self::Aggregate => "aggregate",
        }
    }

    /// Whether the operation modifies data
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::InsertOne
                | Self::InsertMany
                | Self::UpdateOne
                | Self::UpdateMany
                | Self::DeleteOne
                | Self::DeleteMany
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for read operations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Sort specification, e.g. `{ "created_at": -1 }`
    pub sort: Option<Document>,
    /// Projection specification
    pub projection: Option<Document>,
    /// Maximum number of documents to return
    pub limit: Option<i64>,
    /// Number of documents to skip
    pub skip: Option<u64>,
    /// Treat a string `_id` in the filter as an ObjectId hex string and
    /// render `_id` values in results as hex strings
    pub hex_ids: bool,
}

impl FindOptions {
    pub fn with_sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_hex_ids(mut self, hex_ids: bool) -> Self {
        self.hex_ids = hex_ids;
        self
    }
}

/// A single operation against one collection
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    FindOne {
        namespace: String,
        filter: Document,
        options: FindOptions,
    },
    FindAll {
        namespace: String,
        filter: Document,
        options: FindOptions,
    },
    InsertOne {
        namespace: String,
        document: Document,
    },
    InsertMany {
        namespace: String,
        documents: Vec<Document>,
    },
    Update {
        namespace: String,
        filter: Document,
        update: Document,
        /// Apply to every matching document rather than the first one
        multi: bool,
    },
    Delete {
        namespace: String,
        filter: Document,
        multi: bool,
    },
    Count {
        namespace: String,
        filter: Document,
    },
    Aggregate {
        namespace: String,
        pipeline: Vec<Document>,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::FindOne { .. } => OperationKind::FindOne,
            Self::FindAll { .. } => OperationKind::FindAll,
            Self::InsertOne { .. } => OperationKind::InsertOne,
            Self::InsertMany { .. } => OperationKind::InsertMany,
            Self::Update { multi: false, .. } => OperationKind::UpdateOne,
            Self::Update { multi: true, .. } => OperationKind::UpdateMany,
            Self::Delete { multi: false, .. } => OperationKind::DeleteOne,
            Self::Delete { multi: true, .. } => OperationKind::DeleteMany,
            Self::Count { .. } => OperationKind::Count,
            Self::Aggregate { .. } => OperationKind::Aggregate,
        }
    }

    /// The collection this operation targets
    pub fn namespace(&self) -> &str {
        match self {
            Self::FindOne { namespace, .. }
            | Self::FindAll { namespace, .. }
            | Self::InsertOne { namespace, .. }
            | Self::InsertMany { namespace, .. }
            | Self::Update { namespace, .. }
            | Self::Delete { namespace, .. }
            | Self::Count { namespace, .. }
            | Self::Aggregate { namespace, .. } => namespace,
        }
    }

    /// Check the operation's arguments without touching the network.
    ///
    /// Returns `DocPoolError::Argument` naming the offending part.
    pub fn validate(&self) -> Result<()> {
        validate_namespace(self.namespace())?;

        match self {
            Self::InsertMany { documents, .. } if documents.is_empty() => Err(
                DocPoolError::Argument("insert_many requires at least one document".into()),
            ),
            Self::Update { update, .. } if update.is_empty() => Err(DocPoolError::Argument(
                "update document must not be empty".into(),
            )),
            Self::Update { update, .. } => crate::document::check_update(update),
            Self::FindOne { options, .. } | Self::FindAll { options, .. } => {
                if options.limit.is_some_and(|limit| limit < 0) {
                    return Err(DocPoolError::Argument(
                        "find limit must not be negative".into(),
                    ));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Collection names follow the store's naming restrictions
pub fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace.trim().is_empty() {
        return Err(DocPoolError::Argument("namespace must not be empty".into()));
    }
    if namespace.contains('$') || namespace.contains('\0') {
        return Err(DocPoolError::Argument(format!(
            "namespace `{}` contains a reserved character",
            namespace.escape_debug()
        )));
    }
    if namespace.starts_with("system.") {
        return Err(DocPoolError::Argument(format!(
            "namespace `{}` is reserved",
            namespace
        )));
    }
    Ok(())
}

/// Counts reported by an update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
}

impl UpdateOutcome {
    /// Whether anything was changed
    pub fn changed(&self) -> bool {
        self.modified > 0
    }
}

/// One page of a paginated read
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub total_count: u64,
    pub current_page: u64,
    pub per_page: u64,
    pub list: Vec<Document>,
}

/// Result of executing an `Operation`
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutput {
    Document(Option<Document>),
    Documents(Vec<Document>),
    InsertedId(Bson),
    InsertedIds(Vec<Bson>),
    Updated(UpdateOutcome),
    Deleted(u64),
    Count(u64),
}

impl OperationOutput {
    fn variant(&self) -> &'static str {
        match self {
            Self::Document(_) => "document",
            Self::Documents(_) => "documents",
            Self::InsertedId(_) => "inserted id",
            Self::InsertedIds(_) => "inserted ids",
            Self::Updated(_) => "update outcome",
            Self::Deleted(_) => "deleted count",
            Self::Count(_) => "count",
        }
    }

    fn mismatch(&self, expected: &str) -> DocPoolError {
        DocPoolError::Protocol(format!(
            "driver returned {} where {} was expected",
            self.variant(),
            expected
        ))
    }

    pub fn into_document(self) -> Result<Option<Document>> {
        match self {
            Self::Document(document) => Ok(document),
            other => Err(other.mismatch("document")),
        }
    }

    pub fn into_documents(self) -> Result<Vec<Document>> {
        match self {
            Self::Documents(documents) => Ok(documents),
            other => Err(other.mismatch("documents")),
        }
    }

    pub fn into_inserted_id(self) -> Result<Bson> {
        match self {
            Self::InsertedId(id) => Ok(id),
            other => Err(other.mismatch("inserted id")),
        }
    }

    pub fn into_inserted_ids(self) -> Result<Vec<Bson>> {
        match self {
            Self::InsertedIds(ids) => Ok(ids),
            other => Err(other.mismatch("inserted ids")),
        }
    }

    pub fn into_update_outcome(self) -> Result<UpdateOutcome> {
        match self {
            Self::Updated(outcome) => Ok(outcome),
            other => Err(other.mismatch("update outcome")),
        }
    }

    pub fn into_deleted(self) -> Result<u64> {
        match self {
            Self::Deleted(count) => Ok(count),
            other => Err(other.mismatch("deleted count")),
        }
    }

    pub fn into_count(self) -> Result<u64> {
        match self {
            Self::Count(count) => Ok(count),
            other => Err(other.mismatch("count")),
        }
    }
}

//! CRUD and aggregation surface over a task scope

use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use docpool_core::document::{coerce_hex_id, ensure_id, normalize_update, render_hex_id};
use docpool_core::{
    DocPoolError, FindOptions, Operation, OperationKind, OperationOutput, Page, Result,
    UpdateOutcome,
};
use futures::FutureExt;

use crate::TaskScope;


/// Page size used by [`Store::find_paginated`] when the caller passes 0
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Operations against one pool, routed through a [`TaskScope`] so every call
/// reuses the scope's connection for that pool.
///
/// Arguments are checked before a connection is acquired. Every failure is
/// reported as `OperationFailed` naming the collection and operation.
pub struct Store<'a> {
    scope: &'a mut TaskScope,
    pool: String,
}

impl<'a> Store<'a> {
    pub(crate) fn new(scope: &'a mut TaskScope, pool: String) -> Self {
        Self { scope, pool }
    }

    pub fn pool(&self) -> &str {
        &self.pool
    }

    /// Filter matching the document whose `_id` is the given hex ObjectId
    pub fn by_hex_id(hex: &str) -> Result<Document> {
        let oid = ObjectId::parse_str(hex).map_err(|e| {
            DocPoolError::Argument(format!("`{}` is not an ObjectId: {}", hex, e))
        })?;
        Ok(doc! { "_id": oid })
    }

    async fn run(&mut self, operation: Operation) -> Result<OperationOutput> {
        let namespace = operation.namespace().to_string();
        let kind = operation.kind();
        operation
            .validate()
            .map_err(|e| e.in_operation(&namespace, kind))?;

        tracing::trace!(pool = %self.pool, namespace = %namespace, operation = %kind, "running operation");
        self.scope
            .with_connection(&self.pool, move |conn| {
                async move { conn.run(&operation).await }.boxed()
            })
            .await
            .map_err(|e| e.in_operation(namespace, kind))
    }

    pub async fn find_one(
        &mut self,
        namespace: &str,
        mut filter: Document,
        options: FindOptions,
    ) -> Result<Option<Document>> {
        let hex_ids = options.hex_ids;
        if hex_ids {
            coerce_hex_id(&mut filter).map_err(|e| e.in_operation(namespace, OperationKind::FindOne))?;
        }

        let document = self
            .run(Operation::FindOne {
                namespace: namespace.to_string(),
                filter,
                options,
            })
            .await?
            .into_document()
            .map_err(|e| e.in_operation(namespace, OperationKind::FindOne))?;

        Ok(document.map(|mut document| {
            if hex_ids {
                render_hex_id(&mut document);
            }
            document
        }))
    }

    pub async fn find_all(
        &mut self,
        namespace: &str,
        mut filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>> {
        let hex_ids = options.hex_ids;
        if hex_ids {
            coerce_hex_id(&mut filter).map_err(|e| e.in_operation(namespace, OperationKind::FindAll))?;
        }

        let mut documents = self
            .run(Operation::FindAll {
                namespace: namespace.to_string(),
                filter,
                options,
            })
            .await?
            .into_documents()
            .map_err(|e| e.in_operation(namespace, OperationKind::FindAll))?;

        if hex_ids {
            documents.iter_mut().for_each(render_hex_id);
        }
        Ok(documents)
    }

    /// One page of matching documents plus the total match count.
    ///
    /// `page` is zero-based. A `limit` of 0 means [`DEFAULT_PAGE_SIZE`]. The
    /// skip is `page * limit` unless `options.skip` overrides it. Both reads
    /// run on the same connection.
    pub async fn find_paginated(
        &mut self,
        namespace: &str,
        mut filter: Document,
        limit: u64,
        page: u64,
        options: FindOptions,
    ) -> Result<Page> {
        let kind = OperationKind::FindPaginated;
        let per_page = if limit == 0 { DEFAULT_PAGE_SIZE } else { limit };
        let page_limit = i64::try_from(per_page).map_err(|_| {
            DocPoolError::Argument(format!("page size {} is too large", per_page))
                .in_operation(namespace, kind)
        })?;
        let skip = match options.skip {
            Some(skip) => skip,
            None => page.checked_mul(per_page).ok_or_else(|| {
                DocPoolError::Argument(format!("page {} is out of range", page))
                    .in_operation(namespace, kind)
            })?,
        };

        let hex_ids = options.hex_ids;
        if hex_ids {
            coerce_hex_id(&mut filter).map_err(|e| e.in_operation(namespace, kind))?;
        }

        let find = Operation::FindAll {
            namespace: namespace.to_string(),
            filter: filter.clone(),
            options: FindOptions {
                limit: Some(page_limit),
                skip: Some(skip),
                ..options
            },
        };
        let count = Operation::Count {
            namespace: namespace.to_string(),
            filter,
        };
        find.validate().map_err(|e| e.in_operation(namespace, kind))?;

        let (list, total_count) = self
            .scope
            .with_connection(&self.pool, move |conn| {
                async move {
                    let list = conn.run(&find).await?.into_documents()?;
                    let total = conn.run(&count).await?.into_count()?;
                    Ok::<_, DocPoolError>((list, total))
                }
                .boxed()
            })
            .await
            .map_err(|e| e.in_operation(namespace, kind))?;

        let mut list = list;
        if hex_ids {
            list.iter_mut().for_each(render_hex_id);
        }

        Ok(Page {
            total_count,
            current_page: page,
            per_page,
            list,
        })
    }

    /// Insert one document and return its `_id`.
    ///
    /// A document without `_id` gets an ObjectId before the first attempt.
    pub async fn insert_one(&mut self, namespace: &str, mut document: Document) -> Result<Bson> {
        ensure_id(&mut document);
        self.run(Operation::InsertOne {
            namespace: namespace.to_string(),
            document,
        })
        .await?
        .into_inserted_id()
        .map_err(|e| e.in_operation(namespace, OperationKind::InsertOne))
    }

    /// Insert documents in order and return their `_id`s.
    ///
    /// An empty batch is an argument error and never reaches the store.
    /// Documents without `_id` get an ObjectId before the first attempt.
    pub async fn insert_many(
        &mut self,
        namespace: &str,
        mut documents: Vec<Document>,
    ) -> Result<Vec<Bson>> {
        for document in &mut documents {
            ensure_id(document);
        }
        self.run(Operation::InsertMany {
            namespace: namespace.to_string(),
            documents,
        })
        .await?
        .into_inserted_ids()
        .map_err(|e| e.in_operation(namespace, OperationKind::InsertMany))
    }

    /// Update the first matching document.
    ///
    /// A plain field document is applied as `$set`; operator documents pass
    /// through unchanged.
    pub async fn update_one(
        &mut self,
        namespace: &str,
        filter: Document,
        update: Document,
    ) -> Result<UpdateOutcome> {
        self.update(namespace, filter, update, false).await
    }

    /// Update every matching document
    pub async fn update_many(
        &mut self,
        namespace: &str,
        filter: Document,
        update: Document,
    ) -> Result<UpdateOutcome> {
        self.update(namespace, filter, update, true).await
    }

    async fn update(
        &mut self,
        namespace: &str,
        filter: Document,
        update: Document,
        multi: bool,
    ) -> Result<UpdateOutcome> {
        let kind = if multi {
            OperationKind::UpdateMany
        } else {
            OperationKind::UpdateOne
        };
        if update.is_empty() {
            return Err(DocPoolError::Argument("update document must not be empty".into())
                .in_operation(namespace, kind));
        }
        let update = normalize_update(update).map_err(|e| e.in_operation(namespace, kind))?;

        self.run(Operation::Update {
            namespace: namespace.to_string(),
            filter,
            update,
            multi,
        })
        .await?
        .into_update_outcome()
        .map_err(|e| e.in_operation(namespace, kind))
    }

    /// Delete the first matching document; returns the number deleted
    pub async fn delete_one(&mut self, namespace: &str, filter: Document) -> Result<u64> {
        self.delete(namespace, filter, false).await
    }

    pub async fn delete_many(&mut self, namespace: &str, filter: Document) -> Result<u64> {
        self.delete(namespace, filter, true).await
    }

    async fn delete(&mut self, namespace: &str, filter: Document, multi: bool) -> Result<u64> {
        let kind = if multi {
            OperationKind::DeleteMany
        } else {
            OperationKind::DeleteOne
        };
        self.run(Operation::Delete {
            namespace: namespace.to_string(),
            filter,
            multi,
        })
        .await?
        .into_deleted()
        .map_err(|e| e.in_operation(namespace, kind))
    }

    pub async fn count(&mut self, namespace: &str, filter: Document) -> Result<u64> {
        self.run(Operation::Count {
            namespace: namespace.to_string(),
            filter,
        })
        .await?
        .into_count()
        .map_err(|e| e.in_operation(namespace, OperationKind::Count))
    }

    pub async fn aggregate(&mut self, namespace: &str, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        self.run(Operation::Aggregate {
            namespace: namespace.to_string(),
            pipeline,
        })
        .await?
        .into_documents()
        .map_err(|e| e.in_operation(namespace, OperationKind::Aggregate))
    }
}

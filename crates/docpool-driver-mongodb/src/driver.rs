//! MongoDB driver implementation

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use docpool_core::{
    ConnectOptions, DocPoolError, Driver, FindOptions, Operation, OperationOutput, Result, Session,
    UpdateOutcome, WriteConcernSettings,
};
use futures::TryStreamExt;
use mongodb::options::{
    Acknowledgment, ClientOptions, FindOneOptions, FindOptions as MongoFindOptions, WriteConcern,
};
use mongodb::{Client, Collection, Database};

use crate::error::{map_error, map_parse_error};

/// MongoDB store driver
pub struct MongoDbDriver;

impl MongoDbDriver {
    /// Create a new MongoDB driver instance
    pub fn new() -> Self {
        tracing::debug!("MongoDB driver initialized");
        Self
    }

    /// Client options for one docpool connection.
    ///
    /// The client's own pool is capped at one connection; the server
    /// selection timeout follows the connect timeout so an unreachable
    /// deployment fails within the configured bound.
    pub async fn client_options(options: &ConnectOptions) -> Result<ClientOptions> {
        let mut client_options = ClientOptions::parse(&options.uri)
            .await
            .map_err(map_parse_error)?;

        if options.app_name.is_some() {
            client_options.app_name = options.app_name.clone();
        }
        client_options.connect_timeout = Some(options.connect_timeout);
        client_options.server_selection_timeout = Some(options.connect_timeout);
        client_options.max_pool_size = Some(1);
        client_options.min_pool_size = Some(0);
        client_options.write_concern = Some(write_concern(&options.write_concern)?);
        Ok(client_options)
    }
}

impl Default for MongoDbDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Translate write concern settings into the driver's representation.
///
/// `w` is `"majority"`, a node count, or the name of a custom tag set.
pub fn write_concern(settings: &WriteConcernSettings) -> Result<WriteConcern> {
    let w = settings.w.trim();
    let acknowledgment = if w.is_empty() {
        return Err(DocPoolError::invalid_config(
            "write_concern.w",
            "must not be empty",
        ));
    } else if w.eq_ignore_ascii_case("majority") {
        Acknowledgment::Majority
    } else if let Ok(nodes) = w.parse::<u32>() {
        Acknowledgment::Nodes(nodes)
    } else {
        Acknowledgment::Custom(w.to_string())
    };

    let mut concern = WriteConcern::default();
    concern.w = Some(acknowledgment);
    if settings.timeout_ms > 0 {
        concern.w_timeout = Some(settings.timeout());
    }
    concern.journal = settings.journal;
    Ok(concern)
}

#[async_trait]
impl Driver for MongoDbDriver {
    fn name(&self) -> &'static str {
        "mongodb"
    }

    #[tracing::instrument(skip(self, options), fields(uri = %options.redacted_uri(), database = %options.database))]
    async fn open(&self, options: &ConnectOptions) -> Result<Box<dyn Session>> {
        tracing::debug!("opening MongoDB session");

        let client_options = Self::client_options(options).await?;
        let client = Client::with_options(client_options).map_err(map_error)?;
        let database = client.database(&options.database);

        // Selecting a server and authenticating both happen on the first command
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(map_error)?;

        tracing::debug!("MongoDB session established");
        Ok(Box::new(MongoDbSession { client, database }))
    }
}

/// One MongoDB session bound to a database
pub struct MongoDbSession {
    client: Client,
    database: Database,
}

impl MongoDbSession {
    fn collection(&self, namespace: &str) -> Collection<Document> {
        self.database.collection::<Document>(namespace)
    }
}

pub(crate) fn find_one_options(options: &FindOptions) -> FindOneOptions {
    let mut find_one = FindOneOptions::default();
    find_one.sort = options.sort.clone();
    find_one.projection = options.projection.clone();
    find_one.skip = options.skip;
    find_one
}

pub(crate) fn find_options(options: &FindOptions) -> MongoFindOptions {
    let mut find = MongoFindOptions::default();
    find.sort = options.sort.clone();
    find.projection = options.projection.clone();
    // 0 means "no limit" to the server, matching an absent limit
    find.limit = options.limit.filter(|limit| *limit > 0);
    find.skip = options.skip;
    find
}

/// Inserted ids keyed by batch index, returned in batch order
pub(crate) fn ordered_ids(ids: impl IntoIterator<Item = (usize, Bson)>) -> Vec<Bson> {
    let mut ids: Vec<(usize, Bson)> = ids.into_iter().collect();
    ids.sort_by_key(|(index, _)| *index);
    ids.into_iter().map(|(_, id)| id).collect()
}

#[async_trait]
impl Session for MongoDbSession {
    async fn execute(&mut self, operation: &Operation) -> Result<OperationOutput> {
        let collection = self.collection(operation.namespace());

        let output = match operation {
            Operation::FindOne {
                filter, options, ..
            } => {
                let document = collection
                    .find_one(filter.clone())
                    .with_options(find_one_options(options))
                    .await
                    .map_err(map_error)?;
                OperationOutput::Document(document)
            }
            Operation::FindAll {
                filter, options, ..
            } => {
                let cursor = collection
                    .find(filter.clone())
                    .with_options(find_options(options))
                    .await
                    .map_err(map_error)?;
                let documents: Vec<Document> = cursor.try_collect().await.map_err(map_error)?;
                OperationOutput::Documents(documents)
            }
            Operation::InsertOne { document, .. } => {
                let result = collection
                    .insert_one(document.clone())
                    .await
                    .map_err(map_error)?;
                OperationOutput::InsertedId(result.inserted_id)
            }
            Operation::InsertMany { documents, .. } => {
                let result = collection
                    .insert_many(documents.clone())
                    .await
                    .map_err(map_error)?;
                OperationOutput::InsertedIds(ordered_ids(result.inserted_ids))
            }
            Operation::Update {
                filter,
                update,
                multi,
                ..
            } => {
                let result = if *multi {
                    collection.update_many(filter.clone(), update.clone()).await
                } else {
                    collection.update_one(filter.clone(), update.clone()).await
                }
                .map_err(map_error)?;
                OperationOutput::Updated(UpdateOutcome {
                    matched: result.matched_count,
                    modified: result.modified_count,
                })
            }
            Operation::Delete { filter, multi, .. } => {
                let result = if *multi {
                    collection.delete_many(filter.clone()).await
                } else {
                    collection.delete_one(filter.clone()).await
                }
                .map_err(map_error)?;
                OperationOutput::Deleted(result.deleted_count)
            }
            Operation::Count { filter, .. } => {
                let count = collection
                    .count_documents(filter.clone())
                    .await
                    .map_err(map_error)?;
                OperationOutput::Count(count)
            }
            Operation::Aggregate { pipeline, .. } => {
                let cursor = collection
                    .aggregate(pipeline.clone())
                    .await
                    .map_err(map_error)?;
                let documents: Vec<Document> = cursor.try_collect().await.map_err(map_error)?;
                OperationOutput::Documents(documents)
            }
        };

        Ok(output)
    }

    async fn ping(&mut self) -> Result<()> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(map_error)
    }

    async fn close(&mut self) -> Result<()> {
        tracing::trace!(database = %self.database.name(), "shutting down MongoDB client");
        self.client.clone().shutdown().await;
        Ok(())
    }
}

use std::time::Duration;

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::{
    StreamExt, TryStreamExt,
    stream::{self, BoxStream},
};
use mongodb::{
    Client, ClientSession, Collection as MongoCollection,
    options::ClientOptions,
};
use docrepo_core::{
    driver::{
        CountOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions, StoreDriver,
        StoreDriverBuilder, UpdateOutcome, WriteModel,
    },
    error::{BulkWriteSummary, DocumentStoreError, DocumentStoreResult},
    transaction::TransactionManager,
};

use crate::{options, session::MongoSession};

/// Runs a `mongodb` action, inside `session` when one is given.
macro_rules! run {
    ($action:expr, $session:expr) => {
        match $session {
            Some(session) => $action.session(session).await,
            None => $action.await,
        }
        .map_err(DocumentStoreError::backend)
    };
}

/// A [`StoreDriver`] backed by a MongoDB database.
///
/// Cloning is cheap: clones share the client's connection pool.
#[derive(Debug, Clone)]
pub struct MongoDriver {
    client: Client,
    database: String,
}

impl MongoDriver {
    pub fn new(client: Client, database: impl Into<String>) -> Self {
        Self { client, database: database.into() }
    }

    pub fn builder(uri: &str, database: &str) -> MongoDriverBuilder {
        MongoDriverBuilder::new(uri, database)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    pub(crate) fn collection(&self, name: &str) -> MongoCollection<Document> {
        self.client.database(&self.database).collection(name)
    }

    pub(crate) async fn insert_one_in(
        &self,
        document: Document,
        collection: &str,
        session: Option<&mut ClientSession>,
    ) -> DocumentStoreResult<Bson> {
        let coll = self.collection(collection);
        let result = run!(coll.insert_one(document), session)?;

        tracing::trace!(collection, id = %result.inserted_id, "inserted document");
        Ok(result.inserted_id)
    }

    pub(crate) async fn insert_many_in(
        &self,
        documents: Vec<Document>,
        collection: &str,
        session: Option<&mut ClientSession>,
    ) -> DocumentStoreResult<Vec<Bson>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let coll = self.collection(collection);
        let result = run!(coll.insert_many(documents), session)?;

        let mut ids = result.inserted_ids.into_iter().collect::<Vec<_>>();
        ids.sort_by_key(|(index, _)| *index);

        tracing::trace!(collection, inserted = ids.len(), "inserted documents");
        Ok(ids.into_iter().map(|(_, id)| id).collect())
    }

    pub(crate) async fn replace_one_in(
        &self,
        filter: Document,
        replacement: Document,
        upsert: bool,
        collection: &str,
        session: Option<&mut ClientSession>,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let coll = self.collection(collection);
        let result = run!(
            coll.replace_one(filter, replacement)
                .with_options(options::replace_options(upsert)),
            session
        )?;

        Ok(options::update_outcome(result))
    }

    pub(crate) async fn update_in(
        &self,
        filter: Document,
        update: Document,
        many: bool,
        collection: &str,
        session: Option<&mut ClientSession>,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let coll = self.collection(collection);
        let result = if many {
            run!(coll.update_many(filter, update), session)?
        } else {
            run!(coll.update_one(filter, update), session)?
        };

        tracing::trace!(
            collection,
            matched = result.matched_count,
            modified = result.modified_count,
            "updated documents"
        );
        Ok(options::update_outcome(result))
    }

    pub(crate) async fn delete_in(
        &self,
        filter: Document,
        many: bool,
        collection: &str,
        session: Option<&mut ClientSession>,
    ) -> DocumentStoreResult<u64> {
        let coll = self.collection(collection);
        let result = if many {
            run!(coll.delete_many(filter), session)?
        } else {
            run!(coll.delete_one(filter), session)?
        };

        tracing::trace!(collection, deleted = result.deleted_count, "deleted documents");
        Ok(result.deleted_count)
    }

    pub(crate) async fn find_in(
        &self,
        filter: Document,
        options: FindOptions,
        collection: &str,
        session: Option<&mut ClientSession>,
    ) -> DocumentStoreResult<Vec<Document>> {
        let coll = self.collection(collection);
        let action = coll.find(filter).with_options(options::find_options(options));

        let documents = match session {
            Some(session) => {
                let mut cursor = action
                    .session(&mut *session)
                    .await
                    .map_err(DocumentStoreError::backend)?;
                cursor
                    .stream(session)
                    .try_collect::<Vec<Document>>()
                    .await
                    .map_err(DocumentStoreError::backend)?
            }
            None => action
                .await
                .map_err(DocumentStoreError::backend)?
                .try_collect::<Vec<Document>>()
                .await
                .map_err(DocumentStoreError::backend)?,
        };

        tracing::trace!(collection, found = documents.len(), "found documents");
        Ok(documents)
    }

    pub(crate) async fn find_one_in(
        &self,
        filter: Document,
        options: FindOneOptions,
        collection: &str,
        session: Option<&mut ClientSession>,
    ) -> DocumentStoreResult<Option<Document>> {
        let coll = self.collection(collection);
        run!(
            coll.find_one(filter)
                .with_options(options::find_one_options(options)),
            session
        )
    }

    pub(crate) async fn find_one_and_update_in(
        &self,
        filter: Document,
        update: Document,
        options: FindOneAndUpdateOptions,
        collection: &str,
        session: Option<&mut ClientSession>,
    ) -> DocumentStoreResult<Option<Document>> {
        let coll = self.collection(collection);
        run!(
            coll.find_one_and_update(filter, update)
                .with_options(options::find_one_and_update_options(options)),
            session
        )
    }

    pub(crate) async fn count_documents_in(
        &self,
        filter: Document,
        options: CountOptions,
        collection: &str,
        session: Option<&mut ClientSession>,
    ) -> DocumentStoreResult<u64> {
        let coll = self.collection(collection);
        run!(
            coll.count_documents(filter)
                .with_options(options::count_options(options)),
            session
        )
    }

    pub(crate) async fn bulk_write_in(
        &self,
        models: Vec<WriteModel>,
        ordered: bool,
        collection: &str,
        session: Option<&mut ClientSession>,
    ) -> DocumentStoreResult<BulkWriteSummary> {
        if models.is_empty() {
            return Ok(BulkWriteSummary::default());
        }

        let models = options::write_models(models, &self.collection(collection).namespace());
        let action = self.client.bulk_write(models).ordered(ordered);
        let result = match session {
            Some(session) => action.session(session).await,
            None => action.await,
        };

        match result {
            Ok(result) => {
                let summary = options::bulk_write_summary(&result);
                tracing::debug!(
                    collection,
                    inserted = summary.inserted,
                    matched = summary.matched,
                    upserted = summary.upserted,
                    "bulk write applied"
                );
                Ok(summary)
            }
            Err(err) => match options::partial_bulk_write_error(&err) {
                Some(partial) => {
                    if let DocumentStoreError::BulkWrite { failures, summary } = &partial {
                        tracing::warn!(
                            collection,
                            failed = failures.len(),
                            inserted = summary.inserted,
                            upserted = summary.upserted,
                            "bulk write partially failed"
                        );
                    }
                    Err(partial)
                }
                None => Err(DocumentStoreError::backend(err)),
            },
        }
    }

    pub(crate) async fn drop_collection_in(
        &self,
        collection: &str,
        session: Option<&mut ClientSession>,
    ) -> DocumentStoreResult<()> {
        let coll = self.collection(collection);
        run!(coll.drop(), session)?;

        tracing::debug!(collection, "dropped collection");
        Ok(())
    }
}

#[async_trait]
impl StoreDriver for MongoDriver {
    async fn insert_one(&self, document: Document, collection: &str) -> DocumentStoreResult<Bson> {
        self.insert_one_in(document, collection, None).await
    }

    async fn insert_many(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>> {
        self.insert_many_in(documents, collection, None).await
    }

    async fn replace_one(
        &self,
        filter: Document,
        replacement: Document,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<UpdateOutcome> {
        self.replace_one_in(filter, replacement, upsert, collection, None)
            .await
    }

    async fn update_one(
        &self,
        filter: Document,
        update: Document,
        collection: &str,
    ) -> DocumentStoreResult<UpdateOutcome> {
        self.update_in(filter, update, false, collection, None).await
    }

    async fn update_many(
        &self,
        filter: Document,
        update: Document,
        collection: &str,
    ) -> DocumentStoreResult<UpdateOutcome> {
        self.update_in(filter, update, true, collection, None).await
    }

    async fn delete_one(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64> {
        self.delete_in(filter, false, collection, None).await
    }

    async fn delete_many(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64> {
        self.delete_in(filter, true, collection, None).await
    }

    async fn find(
        &self,
        filter: Document,
        options: FindOptions,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        self.find_in(filter, options, collection, None).await
    }

    fn find_stream<'a>(
        &'a self,
        filter: Document,
        options: FindOptions,
        collection: &'a str,
    ) -> BoxStream<'a, DocumentStoreResult<Document>> {
        let coll = self.collection(collection);
        let opened = async move {
            coll.find(filter)
                .with_options(options::find_options(options))
                .await
                .map_err(DocumentStoreError::backend)
        };

        stream::once(opened)
            .map_ok(|cursor| cursor.map_err(DocumentStoreError::backend))
            .try_flatten()
            .boxed()
    }

    async fn find_one(
        &self,
        filter: Document,
        options: FindOneOptions,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        self.find_one_in(filter, options, collection, None).await
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        options: FindOneAndUpdateOptions,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        self.find_one_and_update_in(filter, update, options, collection, None)
            .await
    }

    async fn count_documents(
        &self,
        filter: Document,
        options: CountOptions,
        collection: &str,
    ) -> DocumentStoreResult<u64> {
        self.count_documents_in(filter, options, collection, None)
            .await
    }

    async fn bulk_write(
        &self,
        models: Vec<WriteModel>,
        ordered: bool,
        collection: &str,
    ) -> DocumentStoreResult<BulkWriteSummary> {
        self.bulk_write_in(models, ordered, collection, None).await
    }

    async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()> {
        self.drop_collection_in(collection, None).await
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.client.shutdown().await;
        tracing::debug!(database = %self.database, "mongodb client shut down");

        Ok(())
    }
}

#[async_trait]
impl TransactionManager for MongoDriver {
    type Session = MongoSession;

    async fn start_session(&self) -> DocumentStoreResult<Self::Session> {
        let session = self
            .client
            .start_session()
            .await
            .map_err(|e| DocumentStoreError::Transaction(e.to_string()))?;

        Ok(MongoSession::new(self.clone(), session))
    }
}

/// Builder for [`MongoDriver`].
#[derive(Debug, Clone)]
pub struct MongoDriverBuilder {
    uri: String,
    database: String,
    app_name: Option<String>,
    max_pool_size: Option<u32>,
    connect_timeout: Option<Duration>,
}

impl MongoDriverBuilder {
    pub fn new(uri: &str, database: &str) -> Self {
        Self {
            uri: uri.to_string(),
            database: database.to_string(),
            app_name: None,
            max_pool_size: None,
            connect_timeout: None,
        }
    }

    /// Name reported to the server in the connection handshake.
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    pub fn max_pool_size(mut self, max_pool_size: u32) -> Self {
        self.max_pool_size = Some(max_pool_size);
        self
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = Some(connect_timeout);
        self
    }
}

#[async_trait]
impl StoreDriverBuilder for MongoDriverBuilder {
    type Driver = MongoDriver;

    async fn build(self) -> DocumentStoreResult<Self::Driver> {
        let mut options = ClientOptions::parse(&self.uri)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        if let Some(app_name) = self.app_name {
            options.app_name = Some(app_name);
        }
        if let Some(max_pool_size) = self.max_pool_size {
            options.max_pool_size = Some(max_pool_size);
        }
        if let Some(connect_timeout) = self.connect_timeout {
            options.connect_timeout = Some(connect_timeout);
        }

        let client = Client::with_options(options)
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        tracing::debug!(database = %self.database, "mongodb driver initialized");
        Ok(MongoDriver::new(client, self.database))
    }
}

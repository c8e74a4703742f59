//! Session-bound MongoDB driver.
//!
//! A [`MongoSession`] runs every operation inside one `ClientSession`, so everything a
//! repository does through it joins the session's transaction. Operations on a session are
//! serialized: the underlying `ClientSession` is guarded by a mutex.

use std::fmt;

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::{
    StreamExt, TryStreamExt,
    stream::{self, BoxStream},
};
use mea::mutex::Mutex;
use mongodb::ClientSession;
use docrepo_core::{
    driver::{
        CountOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions, StoreDriver,
        UpdateOutcome, WriteModel,
    },
    error::{BulkWriteSummary, DocumentStoreError, DocumentStoreResult},
    transaction::TransactionSession,
};

use crate::{driver::MongoDriver, options};

/// A [`StoreDriver`] bound to a MongoDB client session.
///
/// Obtained from [`TransactionManager::start_session`](docrepo_core::transaction::TransactionManager::start_session)
/// on a [`MongoDriver`].
pub struct MongoSession {
    driver: MongoDriver,
    session: Mutex<ClientSession>,
}

impl MongoSession {
    pub(crate) fn new(driver: MongoDriver, session: ClientSession) -> Self {
        Self { driver, session: Mutex::new(session) }
    }
}

impl fmt::Debug for MongoSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoSession")
            .field("database", &self.driver.database_name())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StoreDriver for MongoSession {
    async fn insert_one(&self, document: Document, collection: &str) -> DocumentStoreResult<Bson> {
        let mut session = self.session.lock().await;
        self.driver
            .insert_one_in(document, collection, Some(&mut *session))
            .await
    }

    async fn insert_many(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>> {
        let mut session = self.session.lock().await;
        self.driver
            .insert_many_in(documents, collection, Some(&mut *session))
            .await
    }

    async fn replace_one(
        &self,
        filter: Document,
        replacement: Document,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let mut session = self.session.lock().await;
        self.driver
            .replace_one_in(filter, replacement, upsert, collection, Some(&mut *session))
            .await
    }

    async fn update_one(
        &self,
        filter: Document,
        update: Document,
        collection: &str,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let mut session = self.session.lock().await;
        self.driver
            .update_in(filter, update, false, collection, Some(&mut *session))
            .await
    }

    async fn update_many(
        &self,
        filter: Document,
        update: Document,
        collection: &str,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let mut session = self.session.lock().await;
        self.driver
            .update_in(filter, update, true, collection, Some(&mut *session))
            .await
    }

    async fn delete_one(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64> {
        let mut session = self.session.lock().await;
        self.driver
            .delete_in(filter, false, collection, Some(&mut *session))
            .await
    }

    async fn delete_many(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64> {
        let mut session = self.session.lock().await;
        self.driver
            .delete_in(filter, true, collection, Some(&mut *session))
            .await
    }

    async fn find(
        &self,
        filter: Document,
        options: FindOptions,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        let mut session = self.session.lock().await;
        self.driver
            .find_in(filter, options, collection, Some(&mut *session))
            .await
    }

    /// The stream holds the session for as long as it is alive, so other operations on this
    /// session wait until it is dropped.
    fn find_stream<'a>(
        &'a self,
        filter: Document,
        options: FindOptions,
        collection: &'a str,
    ) -> BoxStream<'a, DocumentStoreResult<Document>> {
        let opened = async move {
            let mut session = self.session.lock().await;
            let cursor = self
                .driver
                .collection(collection)
                .find(filter)
                .with_options(options::find_options(options))
                .session(&mut *session)
                .await
                .map_err(DocumentStoreError::backend)?;
            Ok::<_, DocumentStoreError>((session, cursor))
        };

        stream::once(opened)
            .map_ok(|state| {
                stream::try_unfold(state, |(mut session, mut cursor)| async move {
                    let Some(next) = cursor.next(&mut session).await else {
                        return Ok(None);
                    };
                    let document = next.map_err(DocumentStoreError::backend)?;
                    Ok::<_, DocumentStoreError>(Some((document, (session, cursor))))
                })
            })
            .try_flatten()
            .boxed()
    }

    async fn find_one(
        &self,
        filter: Document,
        options: FindOneOptions,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        let mut session = self.session.lock().await;
        self.driver
            .find_one_in(filter, options, collection, Some(&mut *session))
            .await
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        options: FindOneAndUpdateOptions,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>> {
        let mut session = self.session.lock().await;
        self.driver
            .find_one_and_update_in(filter, update, options, collection, Some(&mut *session))
            .await
    }

    async fn count_documents(
        &self,
        filter: Document,
        options: CountOptions,
        collection: &str,
    ) -> DocumentStoreResult<u64> {
        let mut session = self.session.lock().await;
        self.driver
            .count_documents_in(filter, options, collection, Some(&mut *session))
            .await
    }

    async fn bulk_write(
        &self,
        models: Vec<WriteModel>,
        ordered: bool,
        collection: &str,
    ) -> DocumentStoreResult<BulkWriteSummary> {
        let mut session = self.session.lock().await;
        self.driver
            .bulk_write_in(models, ordered, collection, Some(&mut *session))
            .await
    }

    async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()> {
        let mut session = self.session.lock().await;
        self.driver
            .drop_collection_in(collection, Some(&mut *session))
            .await
    }
}

#[async_trait]
impl TransactionSession for MongoSession {
    async fn start_transaction(&mut self) -> DocumentStoreResult<()> {
        self.session
            .lock()
            .await
            .start_transaction()
            .await
            .map_err(|e| DocumentStoreError::Transaction(e.to_string()))?;

        tracing::trace!(database = %self.driver.database_name(), "transaction started");
        Ok(())
    }

    async fn commit_transaction(&mut self) -> DocumentStoreResult<()> {
        self.session
            .lock()
            .await
            .commit_transaction()
            .await
            .map_err(|e| DocumentStoreError::Transaction(e.to_string()))
    }

    async fn abort_transaction(&mut self) -> DocumentStoreResult<()> {
        self.session
            .lock()
            .await
            .abort_transaction()
            .await
            .map_err(|e| DocumentStoreError::Transaction(e.to_string()))
    }
}

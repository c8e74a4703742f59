//! In-memory store driver and transactional sessions.
//!
//! This module provides a complete [`StoreDriver`] that keeps collections in memory behind
//! async-aware read-write locks, plus [`InMemorySession`] for snapshot-isolated transactions.

use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::{
    StreamExt, TryStreamExt,
    stream::{self, BoxStream},
};
use mea::rwlock::RwLock;

use docrepo_core::{
    driver::{
        CountOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions, StoreDriver,
        StoreDriverBuilder, UpdateOutcome, WriteModel,
    },
    error::{BulkWriteSummary, DocumentStoreError, DocumentStoreResult},
    transaction::{TransactionManager, TransactionSession},
};

use crate::database::Database;

/// Thread-safe in-memory store driver.
///
/// Filters, updates and sorts are evaluated the way a MongoDB server would for the supported
/// operator subset. Queries scan the whole collection; there are no indexes. `max_time`
/// options are accepted and ignored since no operation waits on I/O.
///
/// # Thread Safety
///
/// `InMemoryDriver` is cloneable and uses an `Arc`-wrapped internal state, allowing it to be
/// safely shared across async tasks. Multiple clones of the same instance share the same
/// underlying data.
///
/// # Example
///
/// ```ignore
/// use docrepo_memory::InMemoryDriver;
/// use docrepo::driver::{FindOptions, StoreDriver};
/// use bson::doc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let driver = InMemoryDriver::new();
///
///     driver.insert_one(doc! { "name": "Alice", "age": 30 }, "users").await?;
///
///     let docs = driver.find(doc! { "age": { "$gt": 18 } }, FindOptions::default(), "users").await?;
///     assert_eq!(docs.len(), 1);
///
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryDriver {
    state: Arc<RwLock<Database>>,
}

impl InMemoryDriver {
    /// Creates a new driver with no collections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for constructing an `InMemoryDriver`, optionally seeded with data.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use docrepo_memory::InMemoryDriver;
    ///
    /// let driver = InMemoryDriver::builder()
    ///     .with_documents("users", [doc! { "name": "Alice" }])
    ///     .build()
    ///     .await?;
    /// ```
    pub fn builder() -> InMemoryDriverBuilder {
        InMemoryDriverBuilder::default()
    }

    async fn read<R>(&self, op: impl FnOnce(&Database) -> R) -> R {
        op(&*self.state.read().await)
    }

    async fn write<R>(&self, op: impl FnOnce(&mut Database) -> R) -> R {
        op(&mut *self.state.write().await)
    }
}

/// A session on an [`InMemoryDriver`].
///
/// Outside a transaction the session reads and writes the shared state directly. A started
/// transaction works on a private snapshot of the whole store: its writes stay invisible to
/// everyone else until commit, which replaces the shared state with the snapshot. Concurrent
/// transactions are not merged; the last one to commit wins.
#[derive(Debug)]
pub struct InMemorySession {
    shared: Arc<RwLock<Database>>,
    snapshot: RwLock<Option<Database>>,
}

impl InMemorySession {
    /// Returns `true` while a transaction is in progress.
    pub async fn in_transaction(&self) -> bool {
        self.snapshot.read().await.is_some()
    }

    async fn read<R>(&self, op: impl FnOnce(&Database) -> R) -> R {
        {
            let snapshot = self.snapshot.read().await;
            if let Some(database) = snapshot.as_ref() {
                return op(database);
            }
        }

        op(&*self.shared.read().await)
    }

    async fn write<R>(&self, op: impl FnOnce(&mut Database) -> R) -> R {
        {
            let mut snapshot = self.snapshot.write().await;
            if let Some(database) = snapshot.as_mut() {
                return op(database);
            }
        }

        op(&mut *self.shared.write().await)
    }
}

macro_rules! impl_store_driver {
    ($driver:ty) => {
        #[async_trait]
        impl StoreDriver for $driver {
            async fn insert_one(
                &self,
                document: Document,
                collection: &str,
            ) -> DocumentStoreResult<Bson> {
                tracing::trace!(collection, "insert_one");
                self.write(|db| db.insert_one(collection, document)).await
            }

            async fn insert_many(
                &self,
                documents: Vec<Document>,
                collection: &str,
            ) -> DocumentStoreResult<Vec<Bson>> {
                tracing::trace!(collection, count = documents.len(), "insert_many");
                self.write(|db| db.insert_many(collection, documents)).await
            }

            async fn replace_one(
                &self,
                filter: Document,
                replacement: Document,
                upsert: bool,
                collection: &str,
            ) -> DocumentStoreResult<UpdateOutcome> {
                tracing::trace!(collection, upsert, "replace_one");
                self.write(|db| db.replace_one(collection, &filter, replacement, upsert))
                    .await
            }

            async fn update_one(
                &self,
                filter: Document,
                update: Document,
                collection: &str,
            ) -> DocumentStoreResult<UpdateOutcome> {
                tracing::trace!(collection, "update_one");
                self.write(|db| db.update(collection, &filter, &update, false))
                    .await
            }

            async fn update_many(
                &self,
                filter: Document,
                update: Document,
                collection: &str,
            ) -> DocumentStoreResult<UpdateOutcome> {
                tracing::trace!(collection, "update_many");
                self.write(|db| db.update(collection, &filter, &update, true))
                    .await
            }

            async fn delete_one(
                &self,
                filter: Document,
                collection: &str,
            ) -> DocumentStoreResult<u64> {
                tracing::trace!(collection, "delete_one");
                self.write(|db| db.delete(collection, &filter, false)).await
            }

            async fn delete_many(
                &self,
                filter: Document,
                collection: &str,
            ) -> DocumentStoreResult<u64> {
                tracing::trace!(collection, "delete_many");
                self.write(|db| db.delete(collection, &filter, true)).await
            }

            async fn find(
                &self,
                filter: Document,
                options: FindOptions,
                collection: &str,
            ) -> DocumentStoreResult<Vec<Document>> {
                tracing::trace!(collection, ?options, "find");
                self.read(|db| db.find(collection, &filter, &options)).await
            }

            fn find_stream<'a>(
                &'a self,
                filter: Document,
                options: FindOptions,
                collection: &'a str,
            ) -> BoxStream<'a, DocumentStoreResult<Document>> {
                tracing::trace!(collection, ?options, "find_stream");
                stream::once(async move {
                    self.read(|db| db.find(collection, &filter, &options)).await
                })
                .map_ok(|documents| {
                    stream::iter(documents.into_iter().map(Ok::<_, DocumentStoreError>))
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
                tracing::trace!(collection, "find_one");
                self.read(|db| db.find_one(collection, &filter, &options)).await
            }

            async fn find_one_and_update(
                &self,
                filter: Document,
                update: Document,
                options: FindOneAndUpdateOptions,
                collection: &str,
            ) -> DocumentStoreResult<Option<Document>> {
                tracing::trace!(collection, upsert = options.upsert, "find_one_and_update");
                self.write(|db| db.find_one_and_update(collection, &filter, &update, &options))
                    .await
            }

            async fn count_documents(
                &self,
                filter: Document,
                options: CountOptions,
                collection: &str,
            ) -> DocumentStoreResult<u64> {
                tracing::trace!(collection, "count_documents");
                self.read(|db| db.count(collection, &filter, &options)).await
            }

            async fn bulk_write(
                &self,
                models: Vec<WriteModel>,
                ordered: bool,
                collection: &str,
            ) -> DocumentStoreResult<BulkWriteSummary> {
                tracing::trace!(collection, count = models.len(), ordered, "bulk_write");
                self.write(|db| db.bulk_write(collection, models, ordered)).await
            }

            async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()> {
                tracing::trace!(collection, "drop_collection");
                self.write(|db| db.drop_collection(collection)).await;
                Ok(())
            }
        }
    };
}

impl_store_driver!(InMemoryDriver);
impl_store_driver!(InMemorySession);

#[async_trait]
impl TransactionManager for InMemoryDriver {
    type Session = InMemorySession;

    async fn start_session(&self) -> DocumentStoreResult<InMemorySession> {
        Ok(InMemorySession {
            shared: Arc::clone(&self.state),
            snapshot: RwLock::new(None),
        })
    }
}

#[async_trait]
impl TransactionSession for InMemorySession {
    async fn start_transaction(&mut self) -> DocumentStoreResult<()> {
        if self.in_transaction().await {
            return Err(DocumentStoreError::Transaction(
                "transaction already in progress".to_string(),
            ));
        }

        let snapshot = self.shared.read().await.clone();
        *self.snapshot.write().await = Some(snapshot);
        tracing::trace!("started in-memory transaction");
        Ok(())
    }

    async fn commit_transaction(&mut self) -> DocumentStoreResult<()> {
        let Some(snapshot) = self.snapshot.write().await.take() else {
            return Err(DocumentStoreError::Transaction(
                "no transaction in progress".to_string(),
            ));
        };

        *self.shared.write().await = snapshot;
        tracing::trace!("committed in-memory transaction");
        Ok(())
    }

    async fn abort_transaction(&mut self) -> DocumentStoreResult<()> {
        match self.snapshot.write().await.take() {
            Some(_) => {
                tracing::trace!("aborted in-memory transaction");
                Ok(())
            }
            None => Err(DocumentStoreError::Transaction(
                "no transaction in progress".to_string(),
            )),
        }
    }
}

/// Builder for constructing [`InMemoryDriver`] instances.
///
/// # Example
///
/// ```ignore
/// use docrepo_memory::InMemoryDriver;
/// use docrepo::driver::StoreDriverBuilder;
///
/// #[tokio::main]
/// async fn main() {
///     let driver = InMemoryDriver::builder().build().await.unwrap();
/// }
/// ```
#[derive(Default, Debug)]
pub struct InMemoryDriverBuilder {
    seed: Vec<(String, Vec<Document>)>,
}

impl InMemoryDriverBuilder {
    /// Inserts `documents` into `collection` when the driver is built.
    ///
    /// Documents without an `_id` are assigned one.
    pub fn with_documents(
        mut self,
        collection: impl Into<String>,
        documents: impl IntoIterator<Item = Document>,
    ) -> Self {
        self.seed
            .push((collection.into(), documents.into_iter().collect()));
        self
    }
}

#[async_trait]
impl StoreDriverBuilder for InMemoryDriverBuilder {
    type Driver = InMemoryDriver;

    /// Builds the driver, failing if the seed data contains duplicate identifiers.
    async fn build(self) -> DocumentStoreResult<Self::Driver> {
        let mut database = Database::default();

        for (collection, documents) in self.seed {
            database
                .insert_many(&collection, documents)
                .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;
        }

        Ok(InMemoryDriver { state: Arc::new(RwLock::new(database)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[tokio::test]
    async fn clones_share_state() {
        let driver = InMemoryDriver::new();
        let clone = driver.clone();

        driver.insert_one(doc! { "a": 1 }, "c").await.unwrap();
        let count = clone
            .count_documents(doc! {}, CountOptions::default(), "c")
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn builder_seeds_collections() {
        let driver = InMemoryDriver::builder()
            .with_documents("users", [doc! { "name": "a" }, doc! { "name": "b" }])
            .build()
            .await
            .unwrap();

        let users = driver
            .find(doc! {}, FindOptions::default(), "users")
            .await
            .unwrap();
        assert_eq!(users.len(), 2);
    }

    #[tokio::test]
    async fn transaction_writes_are_isolated_until_commit() {
        let driver = InMemoryDriver::new();
        let mut session = driver.start_session().await.unwrap();

        session.start_transaction().await.unwrap();
        session.insert_one(doc! { "a": 1 }, "c").await.unwrap();

        let outside = driver.count_documents(doc! {}, CountOptions::default(), "c").await.unwrap();
        let inside = session.count_documents(doc! {}, CountOptions::default(), "c").await.unwrap();
        assert_eq!((outside, inside), (0, 1));

        session.commit_transaction().await.unwrap();
        let committed = driver.count_documents(doc! {}, CountOptions::default(), "c").await.unwrap();
        assert_eq!(committed, 1);
    }

    #[tokio::test]
    async fn aborted_transaction_discards_writes() {
        let driver = InMemoryDriver::new();
        let mut session = driver.start_session().await.unwrap();

        session.start_transaction().await.unwrap();
        session.insert_one(doc! { "a": 1 }, "c").await.unwrap();
        session.abort_transaction().await.unwrap();

        let count = driver.count_documents(doc! {}, CountOptions::default(), "c").await.unwrap();
        assert_eq!(count, 0);
        assert!(session.abort_transaction().await.is_err());
        assert!(session.commit_transaction().await.is_err());
    }

    #[tokio::test]
    async fn nested_transactions_are_rejected() {
        let driver = InMemoryDriver::new();
        let mut session = driver.start_session().await.unwrap();

        session.start_transaction().await.unwrap();
        assert!(session.start_transaction().await.is_err());
    }
}

//! Store driver abstraction consumed by repositories.
//!
//! This module defines the traits a document store must implement for a
//! [`DocumentRepository`](crate::repository::DocumentRepository) to work on top of it,
//! together with the option and result types those operations exchange.
//!
//! # Overview
//!
//! The [`StoreDriver`] trait is the async surface of a MongoDB-style store: filters, updates
//! and sorts are plain `bson::Document`s in the store's own query language, and every
//! operation names the collection it applies to. Drivers are thread-safe (`Send + Sync`) and
//! may be shared by any number of repositories.
//!
//! # Traits
//!
//! - [`StoreDriver`]: The operations a repository needs from a store
//! - [`StoreDriverBuilder`]: Factory trait for creating driver instances
//!
//! # Examples
//!
//! ```ignore
//! use docrepo::driver::{FindOptions, StoreDriver};
//! use bson::doc;
//!
//! let driver = MyDriverImpl::new();
//!
//! driver.insert_one(doc! { "name": "Alice", "age": 30 }, "users").await?;
//! let adults = driver
//!     .find(doc! { "age": { "$gte": 18 } }, FindOptions::default().with_limit(10), "users")
//!     .await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::{fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::stream::BoxStream;

use crate::error::{BulkWriteSummary, DocumentStoreResult};

/// Options for [`StoreDriver::find`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Number of matching documents to skip.
    pub skip: Option<u64>,
    /// Maximum number of documents to return.
    pub limit: Option<i64>,
    /// Sort document, e.g. `{ "name": 1 }`.
    pub sort: Option<Document>,
    /// Server-side time limit for the query.
    pub max_time: Option<Duration>,
}

impl FindOptions {
    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the sort. An empty sort document is treated as no sort.
    pub fn with_sort(mut self, sort: Document) -> Self {
        self.sort = (!sort.is_empty()).then_some(sort);
        self
    }

    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }
}

/// Options for [`StoreDriver::find_one`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOneOptions {
    pub skip: Option<u64>,
    pub sort: Option<Document>,
    pub max_time: Option<Duration>,
}

/// Which version of the document [`StoreDriver::find_one_and_update`] returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReturnDocument {
    /// The document as it was before the update.
    #[default]
    Before,
    /// The document as it is after the update.
    After,
}

/// Options for [`StoreDriver::find_one_and_update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOneAndUpdateOptions {
    /// Picks the first match in this order when several documents match.
    pub sort: Option<Document>,
    /// Inserts a document built from the filter and the update when nothing matches.
    pub upsert: bool,
    pub return_document: ReturnDocument,
    pub max_time: Option<Duration>,
}

/// Options for [`StoreDriver::count_documents`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountOptions {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub max_time: Option<Duration>,
}

/// Outcome of a replace or update operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    /// Number of documents that matched the filter.
    pub matched: u64,
    /// Number of matched documents that were changed.
    pub modified: u64,
    /// Identifier of the document inserted by an upsert, if one was inserted.
    pub upserted_id: Option<Bson>,
}

/// A single write in a [`StoreDriver::bulk_write`] batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    /// Inserts a new document.
    InsertOne { document: Document },
    /// Replaces the first document matching `filter`, inserting it when `upsert` is set.
    ReplaceOne {
        filter: Document,
        replacement: Document,
        upsert: bool,
    },
}

/// Abstract interface for document stores.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks.
///
/// # Cancellation
///
/// Dropping a returned future abandons the operation. Drivers pass `max_time` options on to
/// the store where it supports server-side deadlines.
///
/// # Error Handling
///
/// Store failures are returned as
/// [`DocumentStoreError::Backend`](crate::error::DocumentStoreError::Backend) carrying the
/// driver's own error. Absence is never an error at this level: lookups return `None`, counts
/// return `0`.
#[async_trait]
pub trait StoreDriver: Send + Sync + Debug {
    /// Inserts a document, generating an `_id` when it carries none.
    ///
    /// Returns the `_id` of the inserted document. Fails with
    /// [`DocumentAlreadyExists`](crate::error::DocumentStoreError::DocumentAlreadyExists) or a
    /// backend duplicate-key error when the `_id` is taken.
    async fn insert_one(&self, document: Document, collection: &str) -> DocumentStoreResult<Bson>;

    /// Inserts several documents, returning their `_id`s in input order.
    async fn insert_many(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>>;

    /// Replaces the first document matching `filter` with `replacement`.
    ///
    /// When nothing matches and `upsert` is set, `replacement` is inserted instead.
    async fn replace_one(
        &self,
        filter: Document,
        replacement: Document,
        upsert: bool,
        collection: &str,
    ) -> DocumentStoreResult<UpdateOutcome>;

    /// Applies an update document (`$set`, `$inc`, ...) to the first document matching `filter`.
    async fn update_one(
        &self,
        filter: Document,
        update: Document,
        collection: &str,
    ) -> DocumentStoreResult<UpdateOutcome>;

    /// Applies an update document to every document matching `filter`.
    async fn update_many(
        &self,
        filter: Document,
        update: Document,
        collection: &str,
    ) -> DocumentStoreResult<UpdateOutcome>;

    /// Deletes the first document matching `filter`, returning the number deleted.
    async fn delete_one(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64>;

    /// Deletes every document matching `filter`, returning the number deleted.
    async fn delete_many(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64>;

    /// Returns the documents matching `filter`, ordered, skipped and limited per `options`.
    async fn find(
        &self,
        filter: Document,
        options: FindOptions,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Streams the documents matching `filter`, honouring `options` like [`find`](Self::find).
    ///
    /// Cursor-backed drivers yield documents as the server delivers batches instead of
    /// collecting the whole result first. A failure to open the cursor is the stream's first
    /// and only item.
    fn find_stream<'a>(
        &'a self,
        filter: Document,
        options: FindOptions,
        collection: &'a str,
    ) -> BoxStream<'a, DocumentStoreResult<Document>>;

    /// Returns the first document matching `filter`, if any.
    async fn find_one(
        &self,
        filter: Document,
        options: FindOneOptions,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>>;

    /// Atomically updates the first document matching `filter` and returns it.
    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        options: FindOneAndUpdateOptions,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>>;

    /// Counts the documents matching `filter`.
    async fn count_documents(
        &self,
        filter: Document,
        options: CountOptions,
        collection: &str,
    ) -> DocumentStoreResult<u64>;

    /// Applies a batch of writes in a single round trip.
    ///
    /// With `ordered` unset every model is attempted even after a failure, and failed models
    /// are reported in [`DocumentStoreError::BulkWrite`](crate::error::DocumentStoreError::BulkWrite)
    /// with their index into `models`.
    async fn bulk_write(
        &self,
        models: Vec<WriteModel>,
        ordered: bool,
        collection: &str,
    ) -> DocumentStoreResult<BulkWriteSummary>;

    /// Drops a collection and all its documents. Dropping a missing collection succeeds.
    async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()>;

    /// Cleanly shuts down the driver, releasing all resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

macro_rules! forward_store_driver {
    ($($target:ty),+) => {$(
        #[async_trait]
        impl<D> StoreDriver for $target
        where
            D: StoreDriver,
        {
            async fn insert_one(
                &self,
                document: Document,
                collection: &str,
            ) -> DocumentStoreResult<Bson> {
                (**self).insert_one(document, collection).await
            }

            async fn insert_many(
                &self,
                documents: Vec<Document>,
                collection: &str,
            ) -> DocumentStoreResult<Vec<Bson>> {
                (**self).insert_many(documents, collection).await
            }

            async fn replace_one(
                &self,
                filter: Document,
                replacement: Document,
                upsert: bool,
                collection: &str,
            ) -> DocumentStoreResult<UpdateOutcome> {
                (**self)
                    .replace_one(filter, replacement, upsert, collection)
                    .await
            }

            async fn update_one(
                &self,
                filter: Document,
                update: Document,
                collection: &str,
            ) -> DocumentStoreResult<UpdateOutcome> {
                (**self).update_one(filter, update, collection).await
            }

            async fn update_many(
                &self,
                filter: Document,
                update: Document,
                collection: &str,
            ) -> DocumentStoreResult<UpdateOutcome> {
                (**self).update_many(filter, update, collection).await
            }

            async fn delete_one(
                &self,
                filter: Document,
                collection: &str,
            ) -> DocumentStoreResult<u64> {
                (**self).delete_one(filter, collection).await
            }

            async fn delete_many(
                &self,
                filter: Document,
                collection: &str,
            ) -> DocumentStoreResult<u64> {
                (**self).delete_many(filter, collection).await
            }

            async fn find(
                &self,
                filter: Document,
                options: FindOptions,
                collection: &str,
            ) -> DocumentStoreResult<Vec<Document>> {
                (**self).find(filter, options, collection).await
            }

            fn find_stream<'a>(
                &'a self,
                filter: Document,
                options: FindOptions,
                collection: &'a str,
            ) -> BoxStream<'a, DocumentStoreResult<Document>> {
                (**self).find_stream(filter, options, collection)
            }

            async fn find_one(
                &self,
                filter: Document,
                options: FindOneOptions,
                collection: &str,
            ) -> DocumentStoreResult<Option<Document>> {
                (**self).find_one(filter, options, collection).await
            }

            async fn find_one_and_update(
                &self,
                filter: Document,
                update: Document,
                options: FindOneAndUpdateOptions,
                collection: &str,
            ) -> DocumentStoreResult<Option<Document>> {
                (**self)
                    .find_one_and_update(filter, update, options, collection)
                    .await
            }

            async fn count_documents(
                &self,
                filter: Document,
                options: CountOptions,
                collection: &str,
            ) -> DocumentStoreResult<u64> {
                (**self).count_documents(filter, options, collection).await
            }

            async fn bulk_write(
                &self,
                models: Vec<WriteModel>,
                ordered: bool,
                collection: &str,
            ) -> DocumentStoreResult<BulkWriteSummary> {
                (**self).bulk_write(models, ordered, collection).await
            }

            async fn drop_collection(&self, collection: &str) -> DocumentStoreResult<()> {
                (**self).drop_collection(collection).await
            }
        }
    )+};
}

forward_store_driver!(&D, Arc<D>);

/// Factory trait for creating driver instances.
///
/// Builders carry the connection configuration and perform the async setup (connecting,
/// pinging) in [`StoreDriverBuilder::build`].
#[async_trait]
pub trait StoreDriverBuilder {
    type Driver: StoreDriver;

    async fn build(self) -> DocumentStoreResult<Self::Driver>;
}

//! Generic repository for entities of one collection.
//!
//! A [`DocumentRepository`] binds an [`Entity`] type to a collection on a [`StoreDriver`]
//! and provides typed persistence, lookup, filtering, sorting and pagination. It holds no
//! state beyond the driver and the collection name, so it is cheap to build per request.
//!
//! # Example
//!
//! ```ignore
//! use docrepo::prelude::*;
//!
//! let users = DocumentRepository::<User, _>::new(driver);
//!
//! let alice = users.save(User::new("alice")).await?;
//! let found = users.find_by_id(alice.id()).await?;
//!
//! let page = users
//!     .query_with_page(
//!         Filter::new().starts_with("name", "al"),
//!         Some(&Pageable::new(0, 10).with_sort("name,asc")),
//!     )
//!     .await?;
//! ```

use std::{fmt, marker::PhantomData};

use bson::{Document, doc, oid::ObjectId};
use futures::{
    StreamExt, TryStreamExt,
    future::{self, BoxFuture},
    stream::BoxStream,
};

use crate::{
    driver::{
        CountOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions, StoreDriver,
        WriteModel,
    },
    entity::{Entity, EntityExt},
    error::{BulkWriteSummary, DocumentStoreError, DocumentStoreResult},
    id::{IdValue, Identifier, ObjectIdExt},
    page::{Page, Pageable},
    sort::{PRIMARY_KEY, Sort},
    transaction::{self, TransactionManager},
};

/// A typed repository over one collection.
///
/// # Type Parameters
///
/// * `E` - The entity type stored in the collection
/// * `D` - The store driver. Pass a reference or an `Arc` to share one driver between
///   repositories.
pub struct DocumentRepository<E, D> {
    driver: D,
    collection: String,
    _marker: PhantomData<fn() -> E>,
}

impl<E, D> fmt::Debug for DocumentRepository<E, D>
where
    D: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentRepository")
            .field("collection", &self.collection)
            .field("driver", &self.driver)
            .finish()
    }
}

impl<E, D> Clone for DocumentRepository<E, D>
where
    D: Clone,
{
    fn clone(&self) -> Self {
        Self {
            driver: self.driver.clone(),
            collection: self.collection.clone(),
            _marker: PhantomData,
        }
    }
}

impl<E, D> DocumentRepository<E, D>
where
    E: Entity,
    D: StoreDriver,
{
    /// Creates a repository over the entity's own collection.
    pub fn new(driver: D) -> Self {
        Self::with_collection(driver, E::collection_name())
    }

    /// Creates a repository over an explicitly named collection.
    pub fn with_collection(driver: D, collection: impl Into<String>) -> Self {
        Self {
            driver,
            collection: collection.into(),
            _marker: PhantomData,
        }
    }

    /// Returns the name of the collection this repository reads and writes.
    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    /// Returns the underlying driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Consumes the repository, returning the underlying driver.
    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Persists an entity and returns it with its identifier set.
    ///
    /// An entity without an identifier is assigned a fresh one and inserted. Otherwise the
    /// stored document with that identifier is replaced, or inserted when there is none, so
    /// saving the same entity twice leaves a single document.
    ///
    /// # Errors
    ///
    /// Returns a [`DocumentStoreError`] if serialization or the driver fails.
    pub async fn save(&self, mut entity: E) -> DocumentStoreResult<E> {
        if entity.id().is_zero() {
            let id = ObjectId::new();
            entity.id_mut().set_id(IdValue::Native(id));

            self.driver
                .insert_one(entity.to_document()?, &self.collection)
                .await?;
            tracing::debug!(collection = %self.collection, %id, "inserted entity");
        } else {
            let id = entity.id_value().to_object_id_or_zero();

            let outcome = self
                .driver
                .replace_one(doc! { PRIMARY_KEY: id }, entity.to_document()?, true, &self.collection)
                .await?;
            tracing::debug!(
                collection = %self.collection,
                %id,
                upserted = outcome.upserted_id.is_some(),
                "saved entity"
            );
        }

        Ok(entity)
    }

    /// Persists a batch of entities with a single unordered bulk write.
    ///
    /// Entities without an identifier are assigned one in place and inserted; the others are
    /// upserted by identifier. Identifiers are assigned before the write, so they stay on the
    /// caller's entities whether or not the write succeeds. An empty batch performs no I/O.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::BulkWrite`] listing the failed items by their index in
    /// `entities` when some writes fail. The other items are still applied.
    pub async fn save_many(&self, entities: &mut [E]) -> DocumentStoreResult<BulkWriteSummary> {
        if entities.is_empty() {
            return Ok(BulkWriteSummary::default());
        }

        let models = entities
            .iter_mut()
            .map(|entity| {
                if entity.id().is_zero() {
                    entity.id_mut().set_id(IdValue::Native(ObjectId::new()));
                    return Ok(WriteModel::InsertOne { document: entity.to_document()? });
                }

                Ok(WriteModel::ReplaceOne {
                    filter: doc! { PRIMARY_KEY: entity.id_value().to_object_id_or_zero() },
                    replacement: entity.to_document()?,
                    upsert: true,
                })
            })
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        let summary = self
            .driver
            .bulk_write(models, false, &self.collection)
            .await
            .inspect_err(|err| {
                if let DocumentStoreError::BulkWrite { failures, .. } = err {
                    tracing::warn!(
                        collection = %self.collection,
                        failed = failures.len(),
                        "batch save partially failed"
                    );
                }
            })?;
        tracing::debug!(
            collection = %self.collection,
            inserted = summary.inserted,
            upserted = summary.upserted,
            modified = summary.modified,
            "saved entities"
        );

        Ok(summary)
    }

    /// Finds the entity with the given identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::DocumentNotFound`] when no entity has this identifier,
    /// which includes identifiers that are not valid at all.
    pub async fn find_by_id(&self, id: impl Into<IdValue>) -> DocumentStoreResult<E> {
        let id = id.into();

        self.driver
            .find_one(Self::id_filter(&id), FindOneOptions::default(), &self.collection)
            .await?
            .map(E::from_document)
            .unwrap_or_else(|| {
                Err(DocumentStoreError::DocumentNotFound(
                    id.to_string(),
                    self.collection.clone(),
                ))
            })
    }

    /// Returns `true` if an entity with the given identifier exists.
    pub async fn exists_by_id(&self, id: impl Into<IdValue>) -> DocumentStoreResult<bool> {
        let options = CountOptions { limit: Some(1), ..Default::default() };

        Ok(self
            .driver
            .count_documents(Self::id_filter(&id.into()), options, &self.collection)
            .await?
            > 0)
    }

    /// Deletes the entity with the given identifier, returning `true` if one was removed.
    pub async fn delete_by_id(&self, id: impl Into<IdValue>) -> DocumentStoreResult<bool> {
        let id = id.into();
        let deleted = self
            .driver
            .delete_one(Self::id_filter(&id), &self.collection)
            .await?;

        tracing::debug!(collection = %self.collection, %id, deleted, "deleted entity by id");
        Ok(deleted > 0)
    }

    /// Returns every entity in the collection.
    pub async fn find_all(&self) -> DocumentStoreResult<Vec<E>> {
        self.find(Document::new(), FindOptions::default())
            .await
    }

    /// Returns the entities with any of the given identifiers.
    ///
    /// Invalid and nil identifiers are skipped. When none remain nothing is queried.
    pub async fn find_all_by_id<I, V>(&self, ids: I) -> DocumentStoreResult<Vec<E>>
    where
        I: IntoIterator<Item = V>,
        V: Into<IdValue>,
    {
        let ids = ids
            .into_iter()
            .filter_map(|id| id.into().to_object_id())
            .filter(|id| !id.is_nil())
            .collect::<Vec<_>>();

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        self.find(doc! { PRIMARY_KEY: { "$in": ids } }, FindOptions::default())
            .await
    }

    /// Deletes every entity matching `filter`, returning how many were removed.
    pub async fn delete(&self, filter: impl Into<Document>) -> DocumentStoreResult<u64> {
        let deleted = self
            .driver
            .delete_many(filter.into(), &self.collection)
            .await?;

        tracing::debug!(collection = %self.collection, deleted, "deleted entities");
        Ok(deleted)
    }

    /// Applies `update` to the first entity matching `filter`, returning the modified count.
    pub async fn update_one(
        &self,
        filter: impl Into<Document>,
        update: Document,
    ) -> DocumentStoreResult<u64> {
        let outcome = self
            .driver
            .update_one(filter.into(), update, &self.collection)
            .await?;

        tracing::debug!(collection = %self.collection, modified = outcome.modified, "updated entity");
        Ok(outcome.modified)
    }

    /// Applies `update` to every entity matching `filter`, returning the modified count.
    pub async fn update_many(
        &self,
        filter: impl Into<Document>,
        update: Document,
    ) -> DocumentStoreResult<u64> {
        let outcome = self
            .driver
            .update_many(filter.into(), update, &self.collection)
            .await?;

        tracing::debug!(collection = %self.collection, modified = outcome.modified, "updated entities");
        Ok(outcome.modified)
    }

    /// Returns the entities matching `filter`. No match yields an empty vector.
    pub async fn find(
        &self,
        filter: impl Into<Document>,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<E>> {
        self.driver
            .find(filter.into(), options, &self.collection)
            .await?
            .into_iter()
            .map(E::from_document)
            .collect()
    }

    /// Streams the entities matching `filter` without collecting them first.
    ///
    /// Each item is decoded as it arrives; a document that fails to decode yields an error
    /// item and the stream goes on with the next one.
    ///
    /// ```ignore
    /// let mut adults = users.find_stream(Filter::new().greater_or_equal("age", 18), FindOptions::default());
    /// while let Some(user) = adults.try_next().await? {
    ///     notify(&user).await;
    /// }
    /// ```
    pub fn find_stream(
        &self,
        filter: impl Into<Document>,
        options: FindOptions,
    ) -> BoxStream<'_, DocumentStoreResult<E>> {
        self.driver
            .find_stream(filter.into(), options, &self.collection)
            .and_then(|document| future::ready(E::from_document(document)))
            .boxed()
    }

    /// Returns the first entity matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NoMatch`] when nothing matches.
    pub async fn find_one(
        &self,
        filter: impl Into<Document>,
        options: FindOneOptions,
    ) -> DocumentStoreResult<E> {
        self.driver
            .find_one(filter.into(), options, &self.collection)
            .await?
            .map(E::from_document)
            .unwrap_or_else(|| Err(DocumentStoreError::NoMatch(self.collection.clone())))
    }

    /// Atomically applies `update` to the first entity matching `filter` and returns it.
    ///
    /// Whether the entity is returned as it was before or after the update is controlled by
    /// [`FindOneAndUpdateOptions::return_document`].
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NoMatch`] when nothing matches and nothing is upserted.
    pub async fn find_one_and_modify(
        &self,
        filter: impl Into<Document>,
        update: Document,
        options: FindOneAndUpdateOptions,
    ) -> DocumentStoreResult<E> {
        self.driver
            .find_one_and_update(filter.into(), update, options, &self.collection)
            .await?
            .map(E::from_document)
            .unwrap_or_else(|| Err(DocumentStoreError::NoMatch(self.collection.clone())))
    }

    /// Counts the entities matching `filter`.
    pub async fn count(
        &self,
        filter: impl Into<Document>,
        options: CountOptions,
    ) -> DocumentStoreResult<u64> {
        self.driver
            .count_documents(filter.into(), options, &self.collection)
            .await
    }

    /// Returns `true` if at least one entity matches `filter`.
    pub async fn exist(
        &self,
        filter: impl Into<Document>,
        options: CountOptions,
    ) -> DocumentStoreResult<bool> {
        Ok(self.count(filter, options).await? > 0)
    }

    /// Returns one page of the entities matching `filter`.
    ///
    /// The matches are counted first. When there are none, or the page size is `0`, the page
    /// is returned without fetching anything. A missing `pageable` means
    /// [`Pageable::default`].
    pub async fn query_with_page(
        &self,
        filter: impl Into<Document>,
        pageable: Option<&Pageable>,
    ) -> DocumentStoreResult<Page<E>> {
        let pageable = pageable.cloned().unwrap_or_default();
        let filter = filter.into();

        let total = self
            .driver
            .count_documents(filter.clone(), CountOptions::default(), &self.collection)
            .await?;

        if total == 0 || pageable.size == 0 {
            tracing::debug!(collection = %self.collection, total, "nothing to page");
            return Ok(Page::new(Vec::new(), total, Some(&pageable)));
        }

        let options = FindOptions::default()
            .with_skip(pageable.offset())
            .with_limit(i64::try_from(pageable.size).unwrap_or(i64::MAX))
            .with_sort(pageable.sort.to_document());
        let content = self.find(filter, options).await?;

        tracing::debug!(
            collection = %self.collection,
            page = pageable.page,
            size = pageable.size,
            total,
            "queried page"
        );
        Ok(Page::new(content, total, Some(&pageable)))
    }

    /// Returns every entity matching `filter`, in the order given by `sort`.
    pub async fn query_with_sort(
        &self,
        filter: impl Into<Document>,
        sort: Option<&Sort>,
    ) -> DocumentStoreResult<Vec<E>> {
        let options = match sort {
            Some(sort) => FindOptions::default().with_sort(sort.to_document()),
            None => FindOptions::default(),
        };

        self.find(filter, options).await
    }

    fn id_filter(id: &IdValue) -> Document {
        doc! { PRIMARY_KEY: id.to_object_id_or_zero() }
    }
}

impl<E, D> DocumentRepository<E, D>
where
    E: Entity,
    D: StoreDriver + TransactionManager,
{
    /// Runs `work` inside a transaction, handing it a repository over the same collection
    /// bound to the transaction's session.
    ///
    /// The transaction commits when `work` succeeds and is aborted when it fails, in which
    /// case the error from `work` is returned.
    ///
    /// ```ignore
    /// users
    ///     .with_transaction(|users| {
    ///         async move {
    ///             users.save(alice).await?;
    ///             users.save(bob).await
    ///         }
    ///         .boxed()
    ///     })
    ///     .await?;
    /// ```
    pub async fn with_transaction<F, T>(&self, work: F) -> DocumentStoreResult<T>
    where
        F: for<'s> FnOnce(DocumentRepository<E, &'s D::Session>) -> BoxFuture<'s, DocumentStoreResult<T>>
            + Send,
        T: Send,
    {
        let collection = self.collection.clone();

        transaction::with_transaction(&self.driver, move |session| {
            work(DocumentRepository::with_collection(session, collection))
        })
        .await
    }
}

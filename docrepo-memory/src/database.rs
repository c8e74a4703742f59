//! The in-memory collections and the operations applied to them.
//!
//! [`Database`] is plain data: drivers and sessions wrap it in a lock and apply these
//! synchronous operations while holding it. Collections keep documents in insertion
//! order, which is the natural order of unsorted queries.

use std::{borrow::Borrow, collections::HashMap};

use bson::{Bson, Document, oid::ObjectId};

use docrepo_core::{
    driver::{
        CountOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions, ReturnDocument,
        UpdateOutcome, WriteModel,
    },
    error::{BulkWriteFailure, BulkWriteSummary, DocumentStoreError, DocumentStoreResult},
};

use crate::{
    evaluator::{FilterMatcher, filter_documents, sort_documents},
    update,
};

const PRIMARY_KEY: &str = "_id";

#[derive(Debug, Clone, Default)]
pub(crate) struct Database {
    collections: HashMap<String, Vec<Document>>,
}

impl Database {
    pub fn insert_one(&mut self, collection: &str, document: Document) -> DocumentStoreResult<Bson> {
        let document = with_primary_key(document, None);
        let id = document
            .get(PRIMARY_KEY)
            .cloned()
            .unwrap_or(Bson::Null);

        let documents = self.collections.entry(collection.to_string()).or_default();
        if documents.iter().any(|existing| existing.get(PRIMARY_KEY) == Some(&id)) {
            return Err(DocumentStoreError::DocumentAlreadyExists(
                display_id(&id),
                collection.to_string(),
            ));
        }

        documents.push(document);
        Ok(id)
    }

    pub fn insert_many(
        &mut self,
        collection: &str,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<Vec<Bson>> {
        documents
            .into_iter()
            .map(|document| self.insert_one(collection, document))
            .collect()
    }

    pub fn replace_one(
        &mut self,
        collection: &str,
        filter: &Document,
        replacement: Document,
        upsert: bool,
    ) -> DocumentStoreResult<UpdateOutcome> {
        update::validate_replacement(&replacement)?;

        let Some(position) = self.position(collection, filter, None)? else {
            if !upsert {
                return Ok(UpdateOutcome::default());
            }

            let document = with_primary_key(replacement, equality_value(filter, PRIMARY_KEY));
            let id = self.insert_one(collection, document)?;
            return Ok(UpdateOutcome { upserted_id: Some(id), ..Default::default() });
        };

        let documents = self.collection_mut(collection);
        let current = &documents[position];
        let id = current.get(PRIMARY_KEY).cloned().unwrap_or(Bson::Null);

        if replacement
            .get(PRIMARY_KEY)
            .is_some_and(|replacement_id| *replacement_id != id)
        {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "replacement would modify the immutable field {PRIMARY_KEY}"
            )));
        }

        let replacement = with_primary_key(replacement, Some(id));
        let modified = u64::from(*current != replacement);
        documents[position] = replacement;

        Ok(UpdateOutcome { matched: 1, modified, upserted_id: None })
    }

    pub fn update(
        &mut self,
        collection: &str,
        filter: &Document,
        changes: &Document,
        many: bool,
    ) -> DocumentStoreResult<UpdateOutcome> {
        update::validate(changes)?;

        let positions = match many {
            true => self.positions(collection, filter)?,
            false => self.position(collection, filter, None)?.into_iter().collect(),
        };

        let mut outcome = UpdateOutcome::default();
        let documents = self.collection_mut(collection);

        for position in positions {
            let mut document = documents[position].clone();
            update::apply(&mut document, changes, false)?;

            outcome.matched += 1;
            if document != documents[position] {
                outcome.modified += 1;
                documents[position] = document;
            }
        }

        Ok(outcome)
    }

    pub fn delete(&mut self, collection: &str, filter: &Document, many: bool) -> DocumentStoreResult<u64> {
        let mut positions = match many {
            true => self.positions(collection, filter)?,
            false => self.position(collection, filter, None)?.into_iter().collect(),
        };
        positions.sort_unstable();

        let documents = self.collection_mut(collection);
        for position in positions.iter().rev() {
            documents.remove(*position);
        }

        Ok(positions.len() as u64)
    }

    pub fn find(
        &self,
        collection: &str,
        filter: &Document,
        options: &FindOptions,
    ) -> DocumentStoreResult<Vec<Document>> {
        let mut matched = filter_documents(self.collection(collection), filter)?;

        if let Some(sort) = &options.sort {
            sort_documents(&mut matched, sort)?;
        }

        let limit = match options.limit {
            None | Some(0) => usize::MAX,
            Some(limit) => usize::try_from(limit.unsigned_abs()).unwrap_or(usize::MAX),
        };

        Ok(matched
            .into_iter()
            .skip(to_usize(options.skip))
            .take(limit)
            .cloned()
            .collect())
    }

    pub fn find_one(
        &self,
        collection: &str,
        filter: &Document,
        options: &FindOneOptions,
    ) -> DocumentStoreResult<Option<Document>> {
        let options = FindOptions {
            skip: options.skip,
            limit: Some(1),
            sort: options.sort.clone(),
            max_time: options.max_time,
        };

        Ok(self
            .find(collection, filter, &options)?
            .into_iter()
            .next())
    }

    pub fn find_one_and_update(
        &mut self,
        collection: &str,
        filter: &Document,
        changes: &Document,
        options: &FindOneAndUpdateOptions,
    ) -> DocumentStoreResult<Option<Document>> {
        update::validate(changes)?;

        let Some(position) = self.position(collection, filter, options.sort.as_ref())? else {
            if !options.upsert {
                return Ok(None);
            }

            let mut document = seed_from_filter(filter);
            update::apply(&mut document, changes, true)?;
            let document = with_primary_key(document, None);
            self.insert_one(collection, document.clone())?;

            return Ok(match options.return_document {
                ReturnDocument::After => Some(document),
                ReturnDocument::Before => None,
            });
        };

        let documents = self.collection_mut(collection);
        let before = documents[position].clone();
        let mut after = before.clone();
        update::apply(&mut after, changes, false)?;
        documents[position] = after.clone();

        Ok(Some(match options.return_document {
            ReturnDocument::After => after,
            ReturnDocument::Before => before,
        }))
    }

    pub fn count(
        &self,
        collection: &str,
        filter: &Document,
        options: &CountOptions,
    ) -> DocumentStoreResult<u64> {
        let matched = filter_documents(self.collection(collection), filter)?.len();
        let counted = matched
            .saturating_sub(to_usize(options.skip))
            .min(match options.limit {
                None | Some(0) => usize::MAX,
                limit => to_usize(limit),
            });

        Ok(counted as u64)
    }

    /// Applies each model in turn, collecting per-item failures.
    ///
    /// An ordered batch stops at the first failure.
    pub fn bulk_write(
        &mut self,
        collection: &str,
        models: Vec<WriteModel>,
        ordered: bool,
    ) -> DocumentStoreResult<BulkWriteSummary> {
        let mut summary = BulkWriteSummary::default();
        let mut failures = Vec::new();

        for (index, model) in models.into_iter().enumerate() {
            let result = match model {
                WriteModel::InsertOne { document } => self
                    .insert_one(collection, document)
                    .map(|_| summary.inserted += 1),
                WriteModel::ReplaceOne { filter, replacement, upsert } => self
                    .replace_one(collection, &filter, replacement, upsert)
                    .map(|outcome| {
                        summary.matched += outcome.matched;
                        summary.modified += outcome.modified;
                        summary.upserted += u64::from(outcome.upserted_id.is_some());
                    }),
            };

            if let Err(err) = result {
                failures.push(BulkWriteFailure { index, message: err.to_string() });
                if ordered {
                    break;
                }
            }
        }

        if failures.is_empty() {
            Ok(summary)
        } else {
            Err(DocumentStoreError::BulkWrite { failures, summary })
        }
    }

    pub fn drop_collection(&mut self, collection: &str) {
        self.collections.remove(collection);
    }

    fn collection(&self, collection: &str) -> &[Document] {
        self.collections
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn collection_mut(&mut self, collection: &str) -> &mut Vec<Document> {
        self.collections.entry(collection.to_string()).or_default()
    }

    fn positions(&self, collection: &str, filter: &Document) -> DocumentStoreResult<Vec<usize>> {
        let matcher = FilterMatcher::new(filter);
        let mut positions = Vec::new();

        for (position, document) in self.collection(collection).iter().enumerate() {
            if matcher.matches(document)? {
                positions.push(position);
            }
        }

        Ok(positions)
    }

    /// Position of the first match, in natural order or in `sort` order when given.
    fn position(
        &self,
        collection: &str,
        filter: &Document,
        sort: Option<&Document>,
    ) -> DocumentStoreResult<Option<usize>> {
        let positions = self.positions(collection, filter)?;
        let Some(sort) = sort else {
            return Ok(positions.first().copied());
        };

        let documents = self.collection(collection);
        let mut candidates = positions
            .into_iter()
            .map(|position| Positioned { document: &documents[position], position })
            .collect::<Vec<_>>();
        sort_documents(&mut candidates, sort)?;

        Ok(candidates.first().map(|candidate| candidate.position))
    }
}

struct Positioned<'d> {
    document: &'d Document,
    position: usize,
}

impl Borrow<Document> for Positioned<'_> {
    fn borrow(&self) -> &Document {
        self.document
    }
}

/// Returns `document` with a primary key in first position: its own, else `fallback`, else a
/// freshly generated one.
fn with_primary_key(mut document: Document, fallback: Option<Bson>) -> Document {
    let id = document
        .remove(PRIMARY_KEY)
        .or(fallback)
        .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));

    let mut keyed = Document::new();
    keyed.insert(PRIMARY_KEY, id);
    for (key, value) in document {
        keyed.insert(key, value);
    }
    keyed
}

/// The value a filter pins `field` to by plain equality, if it does.
fn equality_value(filter: &Document, field: &str) -> Option<Bson> {
    match filter.get(field)? {
        Bson::Document(condition) => match condition.get("$eq") {
            Some(value) if condition.len() == 1 => Some(value.clone()),
            _ => None,
        },
        value => Some(value.clone()),
    }
}

/// The document an upsert starts from: every top-level field the filter pins by equality.
fn seed_from_filter(filter: &Document) -> Document {
    filter
        .keys()
        .filter(|key| !key.starts_with('$') && !key.contains('.'))
        .filter_map(|key| Some((key.clone(), equality_value(filter, key)?)))
        .collect()
}

fn display_id(id: &Bson) -> String {
    match id {
        Bson::ObjectId(id) => id.to_hex(),
        Bson::String(id) => id.clone(),
        other => other.to_string(),
    }
}

fn to_usize(value: Option<u64>) -> usize {
    value.map_or(0, |value| usize::try_from(value).unwrap_or(usize::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn seeded() -> Database {
        let mut database = Database::default();
        for (name, age) in [("ann", 31), ("bob", 25), ("cid", 40)] {
            database
                .insert_one("people", doc! { "name": name, "age": age })
                .unwrap();
        }
        database
    }

    fn names(documents: &[Document]) -> Vec<&str> {
        documents
            .iter()
            .map(|document| document.get_str("name").unwrap())
            .collect()
    }

    #[test]
    fn insert_generates_leading_primary_key() {
        let mut database = Database::default();
        let id = database.insert_one("c", doc! { "a": 1 }).unwrap();

        let stored = database.find("c", &doc! {}, &FindOptions::default()).unwrap();
        assert!(matches!(id, Bson::ObjectId(_)));
        assert_eq!(stored[0].keys().next().map(String::as_str), Some("_id"));
        assert_eq!(stored[0].get("_id"), Some(&id));
    }

    #[test]
    fn duplicate_primary_key_is_rejected() {
        let mut database = Database::default();
        let id = ObjectId::new();
        database.insert_one("c", doc! { "_id": id }).unwrap();

        let err = database.insert_one("c", doc! { "_id": id }).unwrap_err();
        assert!(matches!(err, DocumentStoreError::DocumentAlreadyExists(..)));
    }

    #[test]
    fn find_sorts_skips_and_limits() {
        let database = seeded();
        let options = FindOptions::default()
            .with_sort(doc! { "age": -1 })
            .with_skip(1)
            .with_limit(1);

        let found = database.find("people", &doc! {}, &options).unwrap();
        assert_eq!(names(&found), vec!["ann"]);
        assert!(database.find("missing", &doc! {}, &options).unwrap().is_empty());
    }

    #[test]
    fn replace_upserts_then_replaces() {
        let mut database = Database::default();
        let id = ObjectId::new();
        let filter = doc! { "_id": id };

        let inserted = database
            .replace_one("c", &filter, doc! { "_id": id, "v": 1 }, true)
            .unwrap();
        assert_eq!(inserted.upserted_id, Some(Bson::ObjectId(id)));

        let replaced = database
            .replace_one("c", &filter, doc! { "_id": id, "v": 2 }, true)
            .unwrap();
        assert_eq!((replaced.matched, replaced.modified), (1, 1));
        assert_eq!(database.count("c", &doc! {}, &CountOptions::default()).unwrap(), 1);

        let missed = database
            .replace_one("c", &doc! { "_id": ObjectId::new() }, doc! { "v": 3 }, false)
            .unwrap();
        assert_eq!(missed, UpdateOutcome::default());
    }

    #[test]
    fn update_many_reports_counts() {
        let mut database = seeded();
        let outcome = database
            .update("people", &doc! { "age": { "$gt": 30 } }, &doc! { "$inc": { "age": 1 } }, true)
            .unwrap();
        assert_eq!((outcome.matched, outcome.modified), (2, 2));

        let unchanged = database
            .update("people", &doc! { "name": "bob" }, &doc! { "$set": { "age": 25 } }, false)
            .unwrap();
        assert_eq!((unchanged.matched, unchanged.modified), (1, 0));
    }

    #[test]
    fn delete_removes_matches() {
        let mut database = seeded();
        assert_eq!(database.delete("people", &doc! { "age": { "$lt": 35 } }, false).unwrap(), 1);
        assert_eq!(database.delete("people", &doc! {}, true).unwrap(), 2);
        assert_eq!(database.delete("people", &doc! {}, true).unwrap(), 0);
    }

    #[test]
    fn find_one_and_update_honors_sort_and_return_document() {
        let mut database = seeded();
        let options = FindOneAndUpdateOptions {
            sort: Some(doc! { "age": 1 }),
            return_document: ReturnDocument::After,
            ..Default::default()
        };

        let updated = database
            .find_one_and_update("people", &doc! {}, &doc! { "$set": { "seen": true } }, &options)
            .unwrap()
            .unwrap();
        assert_eq!(updated.get_str("name").unwrap(), "bob");
        assert!(updated.get_bool("seen").unwrap());
    }

    #[test]
    fn find_one_and_update_upserts_from_filter() {
        let mut database = Database::default();
        let options = FindOneAndUpdateOptions {
            upsert: true,
            return_document: ReturnDocument::After,
            ..Default::default()
        };

        let created = database
            .find_one_and_update(
                "counters",
                &doc! { "name": "orders" },
                &doc! { "$inc": { "seq": 1 } },
                &options,
            )
            .unwrap()
            .unwrap();
        assert_eq!(created.get_str("name").unwrap(), "orders");
        assert_eq!(created.get_i32("seq").unwrap(), 1);
        assert!(created.get_object_id("_id").is_ok());
    }

    #[test]
    fn count_applies_skip_and_limit() {
        let database = seeded();
        let options = CountOptions { skip: Some(1), limit: Some(1), ..Default::default() };

        assert_eq!(database.count("people", &doc! {}, &CountOptions::default()).unwrap(), 3);
        assert_eq!(database.count("people", &doc! {}, &options).unwrap(), 1);
    }

    #[test]
    fn unordered_bulk_write_reports_failed_items() {
        let mut database = Database::default();
        let id = ObjectId::new();
        let models = vec![
            WriteModel::InsertOne { document: doc! { "_id": id } },
            WriteModel::InsertOne { document: doc! { "_id": id } },
            WriteModel::ReplaceOne {
                filter: doc! { "_id": ObjectId::new() },
                replacement: doc! { "v": 1 },
                upsert: true,
            },
        ];

        let err = database.bulk_write("c", models, false).unwrap_err();
        let DocumentStoreError::BulkWrite { failures, summary } = err else {
            panic!("expected bulk write error");
        };

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 1);
        assert_eq!((summary.inserted, summary.upserted), (1, 1));
    }
}

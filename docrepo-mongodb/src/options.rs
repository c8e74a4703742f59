//! Conversions from driver-neutral options to the `mongodb` crate's option types.

use mongodb::{
    Namespace,
    error::{Error as MongoError, ErrorKind, PartialBulkWriteResult},
    options::{
        CountOptions as MongoCountOptions, FindOneAndUpdateOptions as MongoFindOneAndUpdateOptions,
        FindOneOptions as MongoFindOneOptions, FindOptions as MongoFindOptions, InsertOneModel,
        ReplaceOneModel, ReplaceOptions, ReturnDocument as MongoReturnDocument,
        WriteModel as MongoWriteModel,
    },
    results::{SummaryBulkWriteResult, UpdateResult},
};

use docrepo_core::{
    driver::{
        CountOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions, ReturnDocument,
        UpdateOutcome, WriteModel,
    },
    error::{BulkWriteFailure, BulkWriteSummary, DocumentStoreError},
};

pub(crate) fn find_options(options: FindOptions) -> MongoFindOptions {
    let mut converted = MongoFindOptions::default();
    converted.skip = options.skip;
    converted.limit = options.limit;
    converted.sort = options.sort;
    converted.max_time = options.max_time;
    converted
}

pub(crate) fn find_one_options(options: FindOneOptions) -> MongoFindOneOptions {
    let mut converted = MongoFindOneOptions::default();
    converted.skip = options.skip;
    converted.sort = options.sort;
    converted.max_time = options.max_time;
    converted
}

pub(crate) fn find_one_and_update_options(
    options: FindOneAndUpdateOptions,
) -> MongoFindOneAndUpdateOptions {
    let mut converted = MongoFindOneAndUpdateOptions::default();
    converted.sort = options.sort;
    converted.upsert = Some(options.upsert);
    converted.return_document = Some(match options.return_document {
        ReturnDocument::Before => MongoReturnDocument::Before,
        ReturnDocument::After => MongoReturnDocument::After,
    });
    converted.max_time = options.max_time;
    converted
}

pub(crate) fn count_options(options: CountOptions) -> MongoCountOptions {
    let mut converted = MongoCountOptions::default();
    converted.skip = options.skip;
    converted.limit = options.limit;
    converted.max_time = options.max_time;
    converted
}

pub(crate) fn replace_options(upsert: bool) -> ReplaceOptions {
    let mut converted = ReplaceOptions::default();
    converted.upsert = Some(upsert);
    converted
}

pub(crate) fn update_outcome(result: UpdateResult) -> UpdateOutcome {
    UpdateOutcome {
        matched: result.matched_count,
        modified: result.modified_count,
        upserted_id: result.upserted_id,
    }
}

/// Binds each model to `namespace` for the client-level bulk write command.
pub(crate) fn write_models(models: Vec<WriteModel>, namespace: &Namespace) -> Vec<MongoWriteModel> {
    models
        .into_iter()
        .map(|model| match model {
            WriteModel::InsertOne { document } => MongoWriteModel::InsertOne(
                InsertOneModel::builder()
                    .namespace(namespace.clone())
                    .document(document)
                    .build(),
            ),
            WriteModel::ReplaceOne { filter, replacement, upsert } => MongoWriteModel::ReplaceOne(
                ReplaceOneModel::builder()
                    .namespace(namespace.clone())
                    .filter(filter)
                    .replacement(replacement)
                    .upsert(upsert)
                    .build(),
            ),
        })
        .collect()
}

pub(crate) fn bulk_write_summary(result: &SummaryBulkWriteResult) -> BulkWriteSummary {
    BulkWriteSummary {
        inserted: count(result.inserted_count),
        matched: count(result.matched_count),
        modified: count(result.modified_count),
        upserted: count(result.upserted_count),
    }
}

/// Converts a bulk write error that failed individual models into
/// [`DocumentStoreError::BulkWrite`], carrying the counts of the writes the server applied.
///
/// Returns `None` for errors that are not per-model write failures, such as network errors
/// or a write concern failure without write errors.
pub(crate) fn partial_bulk_write_error(err: &MongoError) -> Option<DocumentStoreError> {
    let ErrorKind::BulkWrite(bulk) = err.kind.as_ref() else {
        return None;
    };
    if bulk.write_errors.is_empty() {
        return None;
    }

    let mut failures = bulk
        .write_errors
        .iter()
        .map(|(index, error)| BulkWriteFailure { index: *index, message: error.message.clone() })
        .collect::<Vec<_>>();
    failures.sort_by_key(|failure| failure.index);

    Some(DocumentStoreError::BulkWrite {
        failures,
        summary: partial_summary(bulk.partial_result.as_ref()),
    })
}

/// Counts of the writes applied before a bulk write failed. The server omits the partial
/// result when nothing was applied.
pub(crate) fn partial_summary(partial: Option<&PartialBulkWriteResult>) -> BulkWriteSummary {
    match partial {
        Some(PartialBulkWriteResult::Summary(result)) => bulk_write_summary(result),
        Some(PartialBulkWriteResult::Verbose(result)) => bulk_write_summary(&result.summary),
        None => BulkWriteSummary::default(),
    }
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use std::time::Duration;

    #[test]
    fn find_options_carry_paging_and_deadline() {
        let options = find_options(
            FindOptions::default()
                .with_skip(40)
                .with_limit(20)
                .with_sort(doc! { "name": 1 })
                .with_max_time(Duration::from_secs(2)),
        );

        assert_eq!(options.skip, Some(40));
        assert_eq!(options.limit, Some(20));
        assert_eq!(options.sort, Some(doc! { "name": 1 }));
        assert_eq!(options.max_time, Some(Duration::from_secs(2)));
    }

    #[test]
    fn find_one_and_update_defaults_to_returning_the_original() {
        let options = find_one_and_update_options(FindOneAndUpdateOptions::default());

        assert_eq!(options.upsert, Some(false));
        assert!(matches!(options.return_document, Some(MongoReturnDocument::Before)));

        let options = find_one_and_update_options(FindOneAndUpdateOptions {
            upsert: true,
            return_document: ReturnDocument::After,
            ..Default::default()
        });
        assert_eq!(options.upsert, Some(true));
        assert!(matches!(options.return_document, Some(MongoReturnDocument::After)));
    }

    #[test]
    fn missing_partial_result_counts_nothing() {
        assert_eq!(partial_summary(None), BulkWriteSummary::default());
    }

    #[test]
    fn count_options_keep_limit() {
        let options = count_options(CountOptions { limit: Some(1), ..Default::default() });
        assert_eq!(options.limit, Some(1));
        assert_eq!(options.skip, None);
    }
}

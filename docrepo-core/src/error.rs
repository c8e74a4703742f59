//! Error types and result types for repository and driver operations.
//!
//! This module provides the error taxonomy shared by every layer of the crate.
//! Use [`DocumentStoreResult<T>`] as the return type for fallible operations.
//!
//! Three kinds of failure are kept apart:
//!
//! - **Absence** ([`DocumentStoreError::DocumentNotFound`], [`DocumentStoreError::NoMatch`]) -
//!   a single-document lookup matched nothing. Check with [`DocumentStoreError::is_not_found`].
//! - **Driver failures** ([`DocumentStoreError::Backend`]) - the store driver's own error,
//!   carried as the source without being rewritten.
//! - **Partial bulk failures** ([`DocumentStoreError::BulkWrite`]) - per-item outcomes of an
//!   unordered bulk write.

use std::error::Error as StdError;

use bson::error::Error as BsonError;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Boxed driver error, kept as-is so callers can downcast to the driver's concrete type.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// A single failed item of a bulk write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkWriteFailure {
    /// Position of the failed item in the submitted batch.
    pub index: usize,
    /// The driver's description of the failure.
    pub message: String,
}

/// Counts reported by a bulk write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkWriteSummary {
    /// Number of documents inserted by insert models.
    pub inserted: u64,
    /// Number of documents matched by replace models.
    pub matched: u64,
    /// Number of matched documents that were modified.
    pub modified: u64,
    /// Number of documents created by upserting replace models.
    pub upserted: u64,
}

/// Represents all possible errors that can occur when interacting with a document repository.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between entity and document formats.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during driver initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// No document with the given ID exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document not found {0} in collection {1}")]
    DocumentNotFound(String, String),
    /// A single-document query by filter matched nothing in the named collection.
    #[error("No document matched in collection {0}")]
    NoMatch(String),
    /// The document has an invalid structure or carries an unsupported operator.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// Some items of an unordered bulk write failed. The remaining items were applied.
    #[error("Bulk write failed for {} item(s)", .failures.len())]
    BulkWrite {
        /// Per-item failures, indexed into the submitted batch.
        failures: Vec<BulkWriteFailure>,
        /// What the store reports as applied despite the failures.
        summary: BulkWriteSummary,
    },
    /// Starting, committing or aborting a transaction failed.
    #[error("Transaction error: {0}")]
    Transaction(String),
    /// An error raised by the underlying store driver.
    #[error(transparent)]
    Backend(BoxError),
}

impl DocumentStoreError {
    /// Wraps a driver error without altering it.
    pub fn backend(err: impl Into<BoxError>) -> Self {
        DocumentStoreError::Backend(err.into())
    }

    /// Returns `true` when this error reports an absent document rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DocumentStoreError::DocumentNotFound(..) | DocumentStoreError::NoMatch(_)
        )
    }
}

/// A specialized `Result` type for repository and driver operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_variants_are_distinguished() {
        assert!(DocumentStoreError::DocumentNotFound("1".into(), "users".into()).is_not_found());
        assert!(DocumentStoreError::NoMatch("users".into()).is_not_found());
        assert!(!DocumentStoreError::backend("connection reset").is_not_found());
    }

    #[test]
    fn backend_error_is_displayed_unchanged() {
        let err = DocumentStoreError::backend("connection reset by peer");
        assert_eq!(err.to_string(), "connection reset by peer");
    }

    #[test]
    fn bulk_write_reports_failure_count() {
        let err = DocumentStoreError::BulkWrite {
            failures: vec![
                BulkWriteFailure { index: 0, message: "duplicate key".into() },
                BulkWriteFailure { index: 3, message: "duplicate key".into() },
            ],
            summary: BulkWriteSummary::default(),
        };
        assert_eq!(err.to_string(), "Bulk write failed for 2 item(s)");
    }
}

//! Convenient re-exports of commonly used types from docrepo.
//!
//! ```ignore
//! use docrepo::prelude::*;
//! ```
//!
//! This provides access to:
//! - The entity trait, its derive and its document conversions
//! - Repositories, filters, sorting and paging
//! - Identifier types
//! - Driver traits, their options and transactions
//! - Error types

pub use docrepo_core::{
    driver::{
        CountOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions, ReturnDocument,
        StoreDriver, StoreDriverBuilder, UpdateOutcome, WriteModel,
    },
    entity::{Entity, EntityExt},
    error::{BulkWriteFailure, BulkWriteSummary, DocumentStoreError, DocumentStoreResult},
    filter::Filter,
    id::{IdValue, Identifier, ObjectIdExt, StrObjectId},
    page::{Page, Pageable},
    repository::DocumentRepository,
    sort::{Direction, Order, Sort},
    transaction::{TransactionManager, TransactionSession, with_transaction},
};
pub use docrepo_macros::Entity;

pub use bson::{doc, oid::ObjectId};
pub use serde::{Deserialize, Serialize};

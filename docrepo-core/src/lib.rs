//! A typed repository layer over MongoDB-style document stores.
//!
//! This crate is the core of the docrepo project and provides:
//!
//! - **Sorting** ([`sort`]) - Sort orders and the compact `"field,direction"` form
//! - **Pagination** ([`page`]) - Page requests and page results with derived metadata
//! - **Filtering** ([`filter`]) - A fluent builder for filter documents
//! - **Identifiers** ([`id`]) - Normalization between string ids and the store's `ObjectId`
//! - **Entities** ([`entity`]) - The trait persisted types implement
//! - **Store drivers** ([`driver`]) - The async interface a store must provide
//! - **Transactions** ([`transaction`]) - Session-scoped transactions over a driver
//! - **Repositories** ([`repository`]) - Typed persistence, lookup and paging for one collection
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docrepo::prelude::*;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Entity)]
//! pub struct User {
//!     #[serde(rename = "_id")]
//!     pub id: StrObjectId,
//!     pub name: String,
//! }
//!
//! let users = DocumentRepository::<User, _>::new(driver);
//! let page = users.query_with_page(Filter::new(), Some(&Pageable::new(0, 20))).await?;
//! ```

pub mod driver;
pub mod entity;
pub mod error;
pub mod filter;
pub mod id;
pub mod page;
pub mod repository;
pub mod sort;
pub mod transaction;

//! Main docrepo crate: typed, paginated repositories over MongoDB-style document stores.
//!
//! This crate is the primary entry point for users of docrepo. It re-exports the core types
//! from the sub-crates, the `#[derive(Entity)]` macro, and the available store drivers.
//!
//! # Features
//!
//! - **Typed repositories** - Save, look up, update, delete and page entities of one type
//! - **Identifier normalization** - String ids and native `ObjectId`s are interchangeable
//! - **Pagination and sorting** - `Pageable` requests in, `Page` results with metadata out
//! - **Transactions** - Run repository operations inside a session-bound transaction
//! - **Multiple drivers** - In-memory for tests and development, MongoDB for production
//!
//! # Quick Start
//!
//! ```ignore
//! use docrepo::{prelude::*, memory::InMemoryDriver};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Entity)]
//! pub struct User {
//!     #[serde(rename = "_id")]
//!     pub id: StrObjectId,
//!     pub name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let users = DocumentRepository::<User, _>::new(InMemoryDriver::new());
//!
//!     let alice = users
//!         .save(User { id: StrObjectId::default(), name: "Alice".into() })
//!         .await?;
//!     let found = users.find_by_id(&alice.id).await?;
//!
//!     let page = users
//!         .query_with_page(
//!             Filter::new().starts_with("name", "A"),
//!             Some(&Pageable::new(0, 10).with_sort("name,asc")),
//!         )
//!         .await?;
//!
//!     println!("{found:?} {page:?}");
//!     Ok(())
//! }
//! ```
//!
//! # Transactions
//!
//! Drivers that implement [`transaction::TransactionManager`] can run a unit of work
//! atomically. The closure receives a repository bound to the transaction's session:
//!
//! ```ignore
//! use futures::FutureExt;
//!
//! users
//!     .with_transaction(|users| {
//!         async move {
//!             users.save(alice).await?;
//!             users.delete_by_id(&bob_id).await
//!         }
//!         .boxed()
//!     })
//!     .await?;
//! ```
//!
//! # Drivers
//!
//! - [`memory`] - In-memory storage for development and testing
//! - `mongodb` - MongoDB storage (requires the `mongodb` feature)

#[allow(unused_extern_crates)]
extern crate self as docrepo;

pub mod prelude;

pub use docrepo_core::{driver, entity, error, filter, id, page, repository, sort, transaction};
pub use docrepo_macros::Entity;

// Re-export BSON types for convenience
pub use bson;

/// In-memory driver implementations.
pub mod memory {
    pub use docrepo_memory::{InMemoryDriver, InMemoryDriverBuilder, InMemorySession};
}

/// MongoDB driver implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docrepo_mongodb::{MongoDriver, MongoDriverBuilder, MongoDriverConfig, MongoSession};
}

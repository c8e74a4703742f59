//! In-memory store driver for docrepo.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreDriver` and
//! `TransactionManager` traits. It evaluates the same filter, update and sort documents a
//! MongoDB server would for the common operators, which makes it a drop-in driver for
//! development and tests.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Query evaluation** - Comparison, membership, existence, regex and logical operators
//! - **Updates** - `$set`, `$unset`, `$inc`, `$push` and `$setOnInsert`
//! - **Transactions** - Snapshot-isolated sessions with commit and abort
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
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let driver = InMemoryDriver::builder().build().await?;
//!     let users = DocumentRepository::<User, _>::new(driver);
//!
//!     let user = users.save(User { id: StrObjectId::default(), name: "Alice".into() }).await?;
//!     assert!(!user.id.is_zero());
//!
//!     Ok(())
//! }
//! ```

mod database;
pub mod driver;
mod evaluator;
mod update;

pub use driver::{InMemoryDriver, InMemoryDriverBuilder, InMemorySession};

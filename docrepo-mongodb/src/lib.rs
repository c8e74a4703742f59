//! MongoDB driver for docrepo.
//!
//! This crate implements the `StoreDriver` and `TransactionManager` traits on top of the
//! official async `mongodb` driver. Filters, updates and sorts are passed to the server
//! unchanged, so the full MongoDB query language is available to repositories.
//!
//! To use this driver, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docrepo = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Server requirements
//!
//! - `bulk_write` (and therefore `DocumentRepository::save_many`) uses the client-level bulk
//!   write command, available from MongoDB 8.0.
//! - Transactions require a replica set or a sharded cluster.
//!
//! # Example
//!
//! ```ignore
//! use docrepo::{driver::StoreDriverBuilder, mongodb::MongoDriver};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let driver = MongoDriver::builder("mongodb://localhost:27017", "my_database")
//!         .app_name("billing")
//!         .connect_timeout(Duration::from_secs(5))
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrepo_mongodb;

pub mod config;
pub mod driver;
mod options;
pub mod session;

pub use config::MongoDriverConfig;
pub use driver::{MongoDriver, MongoDriverBuilder};
pub use session::MongoSession;

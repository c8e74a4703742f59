//! Transactions over a store driver.
//!
//! A driver that supports multi-document transactions also implements [`TransactionManager`].
//! Its sessions are drivers themselves, so a repository built on a session runs every
//! operation inside that session's transaction.
//!
//! There is no process-wide transaction state. The composition root owns the driver and
//! hands it to whatever needs to open transactions.
//!
//! # Example
//!
//! ```ignore
//! use docrepo::{repository::DocumentRepository, transaction::with_transaction};
//! use futures::FutureExt;
//!
//! let moved = with_transaction(&driver, |session| {
//!     async move {
//!         let accounts = DocumentRepository::<Account, _>::new(session);
//!         accounts.update_one(doc! { "_id": from }, doc! { "$inc": { "balance": -10 } }).await?;
//!         accounts.update_one(doc! { "_id": to }, doc! { "$inc": { "balance": 10 } }).await
//!     }
//!     .boxed()
//! })
//! .await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::{driver::StoreDriver, error::DocumentStoreResult};

/// Transaction control for a session.
#[async_trait]
pub trait TransactionSession: Send + Sync {
    /// Begins a transaction. Operations issued through the session until commit or abort
    /// belong to it.
    ///
    /// Fails with [`DocumentStoreError::Transaction`](crate::error::DocumentStoreError::Transaction)
    /// when a transaction is already in progress on this session.
    async fn start_transaction(&mut self) -> DocumentStoreResult<()>;

    /// Makes the transaction's writes visible outside the session.
    async fn commit_transaction(&mut self) -> DocumentStoreResult<()>;

    /// Discards the transaction's writes.
    async fn abort_transaction(&mut self) -> DocumentStoreResult<()>;
}

/// A driver able to open transactional sessions.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// A session-bound driver. Operations issued through it join the session's transaction.
    type Session: StoreDriver + TransactionSession;

    async fn start_session(&self) -> DocumentStoreResult<Self::Session>;
}

#[async_trait]
impl<M> TransactionManager for &M
where
    M: TransactionManager,
{
    type Session = M::Session;

    async fn start_session(&self) -> DocumentStoreResult<Self::Session> {
        (**self).start_session().await
    }
}

#[async_trait]
impl<M> TransactionManager for Arc<M>
where
    M: TransactionManager,
{
    type Session = M::Session;

    async fn start_session(&self) -> DocumentStoreResult<Self::Session> {
        (**self).start_session().await
    }
}

/// Runs `work` inside a transaction on a fresh session of `manager`.
///
/// The transaction is committed when `work` succeeds. When `work` fails the transaction is
/// aborted and the error from `work` is returned. A failure to abort is logged, not returned.
pub async fn with_transaction<M, F, T>(manager: &M, work: F) -> DocumentStoreResult<T>
where
    M: TransactionManager + ?Sized,
    F: for<'s> FnOnce(&'s M::Session) -> BoxFuture<'s, DocumentStoreResult<T>> + Send,
    T: Send,
{
    let mut session = manager.start_session().await?;
    session.start_transaction().await?;

    match work(&session).await {
        Ok(value) => {
            session.commit_transaction().await?;
            tracing::trace!("transaction committed");
            Ok(value)
        }
        Err(err) => {
            if let Err(abort_err) = session.abort_transaction().await {
                tracing::warn!(error = %abort_err, cause = %err, "failed to abort transaction");
            } else {
                tracing::debug!(cause = %err, "transaction aborted");
            }
            Err(err)
        }
    }
}

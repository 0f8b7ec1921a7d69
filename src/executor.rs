use sqlx::{Postgres, Transaction};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::{StoreError, StoreResult};

/// Shared handle to the transaction of one unit of work.
///
/// Every repository taking part in an order placement or a seeding run holds
/// a clone of the same executor, so all of their statements land in one
/// PostgreSQL transaction.
#[derive(Clone, Debug)]
pub struct Executor {
    tx: Arc<Mutex<Option<Transaction<'static, Postgres>>>>,
}

impl Executor {
    pub fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
        }
    }

    /// Locks the transaction for the duration of one statement.
    ///
    /// The slot is `None` once the owning session committed or rolled back;
    /// use [`active`] on the guard to get at the connection.
    pub async fn lock(&self) -> MutexGuard<'_, Option<Transaction<'static, Postgres>>> {
        self.tx.lock().await
    }

    /// Takes the transaction out, leaving the executor closed.
    /// Only the session calls this, when committing or rolling back.
    pub(crate) async fn take_transaction(&self) -> StoreResult<Transaction<'static, Postgres>> {
        self.tx.lock().await.take().ok_or(StoreError::TransactionClosed)
    }

    pub async fn is_closed(&self) -> bool {
        self.tx.lock().await.is_none()
    }
}

/// Borrows the live transaction out of a locked executor slot.
pub fn active<'a>(
    slot: &'a mut Option<Transaction<'static, Postgres>>,
) -> StoreResult<&'a mut Transaction<'static, Postgres>> {
    slot.as_mut().ok_or(StoreError::TransactionClosed)
}

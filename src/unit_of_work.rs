use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;

use crate::error::{StoreContext, StoreError, StoreResult};
use crate::{Executor, TransactionAware};

/// Factory for transactional sessions.
///
/// Services are generic over this trait so the order engine, the query
/// façade and the seeders all open their transactions the same way.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    type Session: UnitOfWorkSession;

    /// Begin a new transaction session.
    async fn begin(&self) -> StoreResult<Self::Session>;
}

/// One open transaction plus the observers waiting on its outcome.
#[async_trait]
pub trait UnitOfWorkSession: Send + Sync {
    /// Transaction handle to hand to repositories.
    fn executor(&self) -> &Executor;

    /// Register a component that needs to hear about commit or rollback.
    fn register_transaction_aware(&self, observer: Arc<dyn TransactionAware>);

    /// Commit the transaction, then notify observers.
    async fn commit(self) -> StoreResult<()>;

    /// Roll the transaction back, then notify observers.
    async fn rollback(self) -> StoreResult<()>;
}

/// PostgreSQL-backed unit of work over a shared pool.
#[derive(Clone)]
pub struct PgUnitOfWork {
    pool: PgPool,
}

impl PgUnitOfWork {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    type Session = PgSession;

    async fn begin(&self) -> StoreResult<Self::Session> {
        let tx = self.pool.begin().await.context("begin transaction")?;
        Ok(PgSession::new(tx))
    }
}

pub struct PgSession {
    executor: Executor,
    observers: RwLock<Vec<Arc<dyn TransactionAware>>>,
}

impl PgSession {
    pub fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self {
            executor: Executor::new(tx),
            observers: RwLock::new(Vec::new()),
        }
    }

    fn observers(&self) -> Vec<Arc<dyn TransactionAware>> {
        self.observers.read().clone()
    }
}

#[async_trait]
impl UnitOfWorkSession for PgSession {
    fn executor(&self) -> &Executor {
        &self.executor
    }

    fn register_transaction_aware(&self, observer: Arc<dyn TransactionAware>) {
        self.observers.write().push(observer);
    }

    async fn commit(self) -> StoreResult<()> {
        let tx = self.executor.take_transaction().await?;
        tx.commit().await.map_err(StoreError::CommitFailed)?;

        for observer in self.observers() {
            observer.on_commit().await?;
        }
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        let tx = self.executor.take_transaction().await?;
        tx.rollback().await.map_err(StoreError::RollbackFailed)?;

        for observer in self.observers() {
            observer.on_rollback().await?;
        }
        Ok(())
    }
}

/// Commits `session` when `outcome` is `Ok`, rolls it back otherwise.
///
/// A failed rollback is only logged; the caller gets the original error.
pub async fn finish<S, T, E>(session: S, outcome: Result<T, E>) -> Result<T, E>
where
    S: UnitOfWorkSession,
    E: From<StoreError>,
{
    match outcome {
        Ok(value) => {
            session.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = session.rollback().await {
                tracing::error!(error = %rollback_err, "rollback after failed unit of work did not complete");
            }
            Err(err)
        }
    }
}

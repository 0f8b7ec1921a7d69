use async_trait::async_trait;

use crate::error::StoreResult;

/// Hook for work that may only happen once a transaction's outcome is known.
///
/// Observers are registered on a [`UnitOfWorkSession`](crate::UnitOfWorkSession)
/// and called after the commit or rollback went through, in registration
/// order. The order engine uses one to log a placement only when it is
/// durable.
#[async_trait]
pub trait TransactionAware: Send + Sync {
    /// Called after a successful commit.
    async fn on_commit(&self) -> StoreResult<()>;

    /// Called after a rollback.
    async fn on_rollback(&self) -> StoreResult<()>;
}

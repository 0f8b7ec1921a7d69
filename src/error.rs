//! Error types shared by the store-facing components.
//!
//! Every failure coming out of sqlx is wrapped in [`StoreError`] together with
//! a short description of the operation that was running, so callers get a
//! stable message while the original cause stays reachable through
//! [`std::error::Error::source`].

use std::path::PathBuf;

/// Failure inside the persistent store or its transaction handling.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to {operation}")]
    Query {
        operation: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("transaction is no longer active")]
    TransactionClosed,

    #[error("transaction commit failed")]
    CommitFailed(#[source] sqlx::Error),

    #[error("transaction rollback failed")]
    RollbackFailed(#[source] sqlx::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Attaches an operation description to a raw sqlx result.
pub trait StoreContext<T> {
    fn context(self, operation: impl Into<String>) -> StoreResult<T>;
}

impl<T> StoreContext<T> for Result<T, sqlx::Error> {
    fn context(self, operation: impl Into<String>) -> StoreResult<T> {
        self.map_err(|source| StoreError::Query {
            operation: operation.into(),
            source,
        })
    }
}

/// Fatal failure while loading the coupon corpus.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("coupon directory {} does not exist", .0.display())]
    MissingDirectory(PathBuf),

    #[error("coupon directory {} could not be listed", .path.display())]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("coupon file {} could not be opened", .path.display())]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("coupon file {} could not be read", .path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Rejection or failure of an order placement.
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("coupon code {0} is not valid")]
    InvalidCoupon(String),

    #[error("order must contain at least one item")]
    EmptyItems,

    #[error("quantity for product {product_id} must be greater than zero, got {quantity}")]
    InvalidQuantity { product_id: String, quantity: i64 },

    #[error("one or more products not found: {}", .0.join(", "))]
    UnknownProducts(Vec<String>),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure of a read path.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("invalid id supplied: {0:?}")]
    InvalidId(String),

    #[error("no product found with id: {0}")]
    ProductNotFound(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

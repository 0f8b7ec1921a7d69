//! Food ordering backend.
//!
//! Products are seeded once into PostgreSQL, coupon codes are harvested from
//! a directory of text files, and orders are placed through a transactional
//! engine that writes an order, its items and its product links atomically.
//! All database work goes through the unit-of-work primitives re-exported
//! here.

pub mod api;
pub mod catalog;
pub mod config;
pub mod corpus;
pub mod coupons;
pub mod db;
pub mod error;
pub mod executor;
pub mod models;
pub mod orders;
pub mod queries;
pub mod telemetry;
pub mod transaction_aware;
pub mod unit_of_work;

pub use error::{OrderError, QueryError, SeedError, StoreError, StoreResult};
pub use executor::Executor;
pub use transaction_aware::TransactionAware;
pub use unit_of_work::{PgSession, PgUnitOfWork, UnitOfWork, UnitOfWorkSession};

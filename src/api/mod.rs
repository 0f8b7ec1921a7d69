//! HTTP surface: routing, handlers and response mapping.

pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use tracing::info_span;

use crate::coupons::CouponPolicy;
use crate::orders::OrderService;
use crate::queries::QueryService;
use crate::PgUnitOfWork;

pub use error::ApiError;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderService<PgUnitOfWork>>,
    pub queries: Arc<QueryService<PgUnitOfWork>>,
}

impl AppState {
    pub fn new(uow: PgUnitOfWork, policy: CouponPolicy) -> Self {
        Self {
            orders: Arc::new(
                OrderService::new(uow.clone(), policy)
                    .with_span(info_span!("orders", min_sources = policy.min_sources)),
            ),
            queries: Arc::new(
                QueryService::new(uow).with_span(info_span!("queries", read_only = true)),
            ),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/products", get(handlers::list_products))
        .route("/product/", get(handlers::missing_product_id))
        .route("/product/:product_id", get(handlers::get_product))
        .route("/orders", get(handlers::list_orders))
        .route("/order", post(handlers::place_order))
        .layer(from_fn(middleware::http_tracing))
        .layer(from_fn(middleware::request_id))
        .with_state(state)
}

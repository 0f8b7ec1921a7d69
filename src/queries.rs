//! Read paths: products and orders.

use tracing::{info_span, Instrument, Span};

use crate::catalog::CatalogRepository;
use crate::error::{QueryError, StoreResult};
use crate::models::{Order, Product};
use crate::orders::{assemble_orders, parse_product_id, OrderRepository};
use crate::unit_of_work::finish;
use crate::{UnitOfWork, UnitOfWorkSession};

pub struct QueryService<U> {
    uow: U,
    span: Span,
}

impl<U: UnitOfWork> QueryService<U> {
    pub fn new(uow: U) -> Self {
        Self {
            uow,
            span: info_span!("queries"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub async fn list_products(&self) -> StoreResult<Vec<Product>> {
        async {
            let session = self.uow.begin().await?;
            let outcome = CatalogRepository::new(session.executor().clone())
                .list()
                .await;
            finish(session, outcome).await
        }
        .instrument(self.span.clone())
        .await
    }

    /// Looks up one product by its API id.
    pub async fn get_product(&self, raw_id: &str) -> Result<Product, QueryError> {
        let raw_id = raw_id.trim();
        let id = parse_product_id(raw_id).ok_or_else(|| QueryError::InvalidId(raw_id.to_string()))?;

        async {
            let session = self.uow.begin().await?;
            let outcome = CatalogRepository::new(session.executor().clone())
                .find_by_id(id)
                .await
                .map_err(QueryError::from)
                .and_then(|found| found.ok_or(QueryError::ProductNotFound(id)));
            finish(session, outcome).await
        }
        .instrument(self.span.clone())
        .await
    }

    /// Every order with its items and products loaded.
    pub async fn list_orders(&self) -> StoreResult<Vec<Order>> {
        async {
            let session = self.uow.begin().await?;
            let outcome = Self::load_orders(&session).await;
            finish(session, outcome).await
        }
        .instrument(self.span.clone())
        .await
    }

    async fn load_orders(session: &U::Session) -> StoreResult<Vec<Order>> {
        let repo = OrderRepository::new(session.executor().clone());
        let orders = repo.list().await?;
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = orders.iter().map(|order| order.id).collect();
        let items = repo.items_for(&ids).await?;
        let products = repo.products_for(&ids).await?;
        Ok(assemble_orders(orders, items, products))
    }
}

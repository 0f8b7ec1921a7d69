//! Order transaction engine.
//!
//! `place_order` validates a request and writes the order, its items and its
//! product links in a single transaction. Validation is fail-fast, in this
//! order: coupon, item list, quantities, product existence. Nothing is
//! written unless every check passes, and a failure at any later step rolls
//! the whole order back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::catalog::CatalogRepository;
use crate::coupons::{CouponPolicy, CouponRepository};
use crate::error::{OrderError, StoreContext, StoreResult};
use crate::executor::active;
use crate::models::{Order, OrderItem, OrderLine, PlaceOrderRequest, Product};
use crate::unit_of_work::finish;
use crate::{Executor, TransactionAware, UnitOfWork, UnitOfWorkSession};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderRow {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderItemRow {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderProductRow {
    pub order_id: i64,
    #[sqlx(flatten)]
    pub product: Product,
}

/// Order persistence bound to one transaction.
pub struct OrderRepository {
    executor: Executor,
}

impl OrderRepository {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }

    pub async fn insert_order(&self) -> StoreResult<OrderRow> {
        let mut slot = self.executor.lock().await;
        let tx = active(&mut slot)?;
        sqlx::query_as::<_, OrderRow>(
            "INSERT INTO orders DEFAULT VALUES RETURNING id, created_at, updated_at",
        )
        .fetch_one(&mut **tx)
        .await
        .context("create order")
    }

    pub async fn insert_item(
        &self,
        order_id: i64,
        product_id: i64,
        quantity: i64,
    ) -> StoreResult<OrderItemRow> {
        let mut slot = self.executor.lock().await;
        let tx = active(&mut slot)?;
        sqlx::query_as::<_, OrderItemRow>(
            "INSERT INTO order_items (order_id, product_id, quantity) VALUES ($1, $2, $3) \
             RETURNING id, order_id, product_id, quantity",
        )
        .bind(order_id)
        .bind(product_id)
        .bind(quantity)
        .fetch_one(&mut **tx)
        .await
        .context(format!("create item for product {product_id} on order {order_id}"))
    }

    pub async fn link_product(&self, order_id: i64, product_id: i64) -> StoreResult<()> {
        let mut slot = self.executor.lock().await;
        let tx = active(&mut slot)?;
        sqlx::query(
            "INSERT INTO order_products (order_id, product_id) VALUES ($1, $2) \
             ON CONFLICT (order_id, product_id) DO NOTHING",
        )
        .bind(order_id)
        .bind(product_id)
        .execute(&mut **tx)
        .await
        .context(format!("link product {product_id} to order {order_id}"))?;
        Ok(())
    }

    pub async fn list(&self) -> StoreResult<Vec<OrderRow>> {
        let mut slot = self.executor.lock().await;
        let tx = active(&mut slot)?;
        sqlx::query_as::<_, OrderRow>("SELECT id, created_at, updated_at FROM orders ORDER BY id")
            .fetch_all(&mut **tx)
            .await
            .context("fetch orders")
    }

    pub async fn items_for(&self, order_ids: &[i64]) -> StoreResult<Vec<OrderItemRow>> {
        let mut slot = self.executor.lock().await;
        let tx = active(&mut slot)?;
        sqlx::query_as::<_, OrderItemRow>(
            "SELECT id, order_id, product_id, quantity FROM order_items \
             WHERE order_id = ANY($1) ORDER BY order_id, id",
        )
        .bind(order_ids)
        .fetch_all(&mut **tx)
        .await
        .context("fetch order items")
    }

    pub async fn products_for(&self, order_ids: &[i64]) -> StoreResult<Vec<OrderProductRow>> {
        let mut slot = self.executor.lock().await;
        let tx = active(&mut slot)?;
        sqlx::query_as::<_, OrderProductRow>(
            "SELECT op.order_id, p.id, p.name, p.price, p.category \
             FROM order_products op JOIN products p ON p.id = op.product_id \
             WHERE op.order_id = ANY($1) ORDER BY op.order_id, p.id",
        )
        .bind(order_ids)
        .fetch_all(&mut **tx)
        .await
        .context("fetch order products")
    }

    pub async fn count_orders(&self) -> StoreResult<i64> {
        self.count("SELECT COUNT(*) FROM orders", "count orders").await
    }

    pub async fn count_items(&self) -> StoreResult<i64> {
        self.count("SELECT COUNT(*) FROM order_items", "count order items")
            .await
    }

    async fn count(&self, sql: &'static str, operation: &str) -> StoreResult<i64> {
        let mut slot = self.executor.lock().await;
        let tx = active(&mut slot)?;
        sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(&mut **tx)
            .await
            .context(operation)
    }
}

/// Builds fully populated orders from the three row sets, keeping the order
/// of `orders`.
pub fn assemble_orders(
    orders: Vec<OrderRow>,
    items: Vec<OrderItemRow>,
    products: Vec<OrderProductRow>,
) -> Vec<Order> {
    let mut items_by_order: BTreeMap<i64, Vec<OrderItem>> = BTreeMap::new();
    for item in items {
        items_by_order.entry(item.order_id).or_default().push(OrderItem {
            id: item.id,
            product_id: item.product_id.to_string(),
            quantity: item.quantity,
        });
    }

    let mut products_by_order: BTreeMap<i64, Vec<Product>> = BTreeMap::new();
    for row in products {
        products_by_order.entry(row.order_id).or_default().push(row.product);
    }

    orders
        .into_iter()
        .map(|row| Order {
            id: row.id,
            items: items_by_order.remove(&row.id).unwrap_or_default(),
            products: products_by_order.remove(&row.id).unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
        .collect()
}

/// Parses an API product id. Only positive integers can name a product.
pub fn parse_product_id(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok().filter(|id| *id > 0)
}

/// Checks the shape of the requested lines: at least one, all with a
/// positive quantity.
pub fn check_lines(lines: &[OrderLine]) -> Result<(), OrderError> {
    if lines.is_empty() {
        return Err(OrderError::EmptyItems);
    }
    if let Some(line) = lines.iter().find(|line| line.quantity < 1) {
        return Err(OrderError::InvalidQuantity {
            product_id: line.product_id.clone(),
            quantity: line.quantity,
        });
    }
    Ok(())
}

/// Distinct parseable product ids in first-seen order, and the raw ids that
/// cannot name any product.
fn distinct_product_ids(lines: &[OrderLine]) -> (Vec<i64>, Vec<String>) {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    let mut malformed = Vec::new();
    for line in lines {
        match parse_product_id(&line.product_id) {
            Some(id) => {
                if seen.insert(id) {
                    ids.push(id);
                }
            }
            None => malformed.push(line.product_id.clone()),
        }
    }
    (ids, malformed)
}

/// Logs a placement once its transaction outcome is known.
struct PlacementJournal {
    span: Span,
    pending: Mutex<Option<(i64, usize)>>,
}

impl PlacementJournal {
    fn new(span: Span) -> Self {
        Self {
            span,
            pending: Mutex::new(None),
        }
    }

    fn record(&self, order_id: i64, items: usize) {
        *self.pending.lock() = Some((order_id, items));
    }
}

#[async_trait]
impl TransactionAware for PlacementJournal {
    async fn on_commit(&self) -> StoreResult<()> {
        let pending = self.pending.lock().take();
        if let Some((order_id, items)) = pending {
            self.span.in_scope(|| info!(order_id, items, "order placed"));
        }
        Ok(())
    }

    async fn on_rollback(&self) -> StoreResult<()> {
        let pending = self.pending.lock().take();
        match pending {
            Some((order_id, items)) => self
                .span
                .in_scope(|| warn!(order_id, items, "order placement rolled back")),
            None => self
                .span
                .in_scope(|| debug!("order rejected before any write")),
        }
        Ok(())
    }
}

pub struct OrderService<U> {
    uow: U,
    policy: CouponPolicy,
    span: Span,
}

impl<U: UnitOfWork> OrderService<U> {
    pub fn new(uow: U, policy: CouponPolicy) -> Self {
        Self {
            uow,
            policy,
            span: info_span!("orders"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Validate `request` and create the order atomically.
    pub async fn place_order(&self, request: &PlaceOrderRequest) -> Result<Order, OrderError> {
        async {
            let session = self.uow.begin().await?;
            let journal = Arc::new(PlacementJournal::new(Span::current()));
            session.register_transaction_aware(journal.clone());

            let outcome = self.place_in(&session, &journal, request).await;
            match &outcome {
                Err(OrderError::Store(err)) => {
                    error!(error = %err, cause = ?std::error::Error::source(err), "order placement failed");
                }
                Err(rejection) => info!(reason = %rejection, "order rejected"),
                Ok(_) => {}
            }
            finish(session, outcome).await
        }
        .instrument(self.span.clone())
        .await
    }

    async fn place_in(
        &self,
        session: &U::Session,
        journal: &PlacementJournal,
        request: &PlaceOrderRequest,
    ) -> Result<Order, OrderError> {
        if let Some(code) = request.coupon() {
            let coupons = CouponRepository::new(session.executor().clone());
            let redeemable = coupons
                .find_by_code(code)
                .await?
                .is_some_and(|coupon| self.policy.is_redeemable(&coupon));
            if !redeemable {
                return Err(OrderError::InvalidCoupon(code.to_string()));
            }
        }

        check_lines(&request.items)?;

        let (ids, mut missing) = distinct_product_ids(&request.items);
        let catalog = CatalogRepository::new(session.executor().clone());
        let products = if ids.is_empty() {
            Vec::new()
        } else {
            catalog.lock_existing(&ids).await?
        };
        let found: HashSet<i64> = products.iter().map(|p| p.id).collect();
        missing.extend(
            ids.iter()
                .filter(|id| !found.contains(*id))
                .map(|id| id.to_string()),
        );
        if !missing.is_empty() {
            return Err(OrderError::UnknownProducts(missing));
        }

        let orders = OrderRepository::new(session.executor().clone());
        let header = orders.insert_order().await?;
        journal.record(header.id, request.items.len());

        let mut items = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let product_id = parse_product_id(&line.product_id)
                .ok_or_else(|| OrderError::UnknownProducts(vec![line.product_id.clone()]))?;
            let row = orders
                .insert_item(header.id, product_id, line.quantity)
                .await?;
            items.push(OrderItem {
                id: row.id,
                product_id: row.product_id.to_string(),
                quantity: row.quantity,
            });
        }

        for product in &products {
            orders.link_product(header.id, product.id).await?;
        }

        Ok(Order {
            id: header.id,
            items,
            products,
            created_at: header.created_at,
            updated_at: header.updated_at,
        })
    }
}

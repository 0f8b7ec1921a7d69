//! Product catalog: a fixed seed set, read-only once inserted.

use tracing::{info, info_span, Instrument, Span};

use crate::error::{StoreContext, StoreResult};
use crate::executor::active;
use crate::models::{NewProduct, Product};
use crate::unit_of_work::finish;
use crate::{Executor, UnitOfWork, UnitOfWorkSession};

/// Products inserted the first time the service starts against an empty store.
pub const SEED_PRODUCTS: [NewProduct; 6] = [
    NewProduct { name: "Margherita Pizza", price: 12.99, category: "Pizza" },
    NewProduct { name: "Pepperoni Pizza", price: 14.99, category: "Pizza" },
    NewProduct { name: "Caesar Salad", price: 8.99, category: "Salad" },
    NewProduct { name: "Garlic Bread", price: 4.99, category: "Sides" },
    NewProduct { name: "Chocolate Cake", price: 6.99, category: "Dessert" },
    NewProduct { name: "Chicken Waffle", price: 1.00, category: "Waffle" },
];

/// Product queries bound to one transaction.
pub struct CatalogRepository {
    executor: Executor,
}

impl CatalogRepository {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }

    pub async fn count(&self) -> StoreResult<i64> {
        let mut slot = self.executor.lock().await;
        let tx = active(&mut slot)?;
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products")
            .fetch_one(&mut **tx)
            .await
            .context("count products")
    }

    pub async fn insert(&self, product: &NewProduct) -> StoreResult<Product> {
        let mut slot = self.executor.lock().await;
        let tx = active(&mut slot)?;
        sqlx::query_as::<_, Product>(
            "INSERT INTO products (name, price, category) VALUES ($1, $2, $3) \
             RETURNING id, name, price, category",
        )
        .bind(product.name)
        .bind(product.price)
        .bind(product.category)
        .fetch_one(&mut **tx)
        .await
        .context(format!("create product {}", product.name))
    }

    pub async fn list(&self) -> StoreResult<Vec<Product>> {
        let mut slot = self.executor.lock().await;
        let tx = active(&mut slot)?;
        sqlx::query_as::<_, Product>("SELECT id, name, price, category FROM products ORDER BY id")
            .fetch_all(&mut **tx)
            .await
            .context("fetch products")
    }

    pub async fn find_by_id(&self, id: i64) -> StoreResult<Option<Product>> {
        let mut slot = self.executor.lock().await;
        let tx = active(&mut slot)?;
        sqlx::query_as::<_, Product>("SELECT id, name, price, category FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .context(format!("fetch product {id}"))
    }

    /// Fetch the given products and hold a share lock on their rows until the
    /// transaction ends, so none of them can be deleted before commit.
    pub async fn lock_existing(&self, ids: &[i64]) -> StoreResult<Vec<Product>> {
        let mut slot = self.executor.lock().await;
        let tx = active(&mut slot)?;
        sqlx::query_as::<_, Product>(
            "SELECT id, name, price, category FROM products WHERE id = ANY($1) ORDER BY id FOR SHARE",
        )
        .bind(ids)
        .fetch_all(&mut **tx)
        .await
        .context("lock ordered products")
    }
}

/// Inserts [`SEED_PRODUCTS`] on first run.
pub struct CatalogSeeder<U> {
    uow: U,
    span: Span,
}

impl<U: UnitOfWork> CatalogSeeder<U> {
    pub fn new(uow: U) -> Self {
        Self {
            uow,
            span: info_span!("catalog_seed"),
        }
    }

    /// Replaces the span this component logs under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Seed an empty catalog and return its contents. A catalog that already
    /// holds products is left untouched.
    pub async fn seed(&self) -> StoreResult<Vec<Product>> {
        async {
            let session = self.uow.begin().await?;
            let outcome = Self::seed_in(&session).await;
            finish(session, outcome).await
        }
        .instrument(self.span.clone())
        .await
    }

    async fn seed_in(session: &U::Session) -> StoreResult<Vec<Product>> {
        let repo = CatalogRepository::new(session.executor().clone());

        let existing = repo.count().await?;
        if existing == 0 {
            for product in &SEED_PRODUCTS {
                repo.insert(product).await?;
            }
            info!(inserted = SEED_PRODUCTS.len(), "catalog seeded");
        } else {
            info!(existing, "catalog already seeded");
        }

        repo.list().await
    }
}

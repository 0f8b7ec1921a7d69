//! Coupons, their source files, and the redemption rule.

use sqlx::Row;

use crate::config::DEFAULT_MIN_COUPON_SOURCES;
use crate::error::{StoreContext, StoreResult};
use crate::executor::active;
use crate::models::{Coupon, CouponSource};
use crate::Executor;

/// Decides whether a coupon has enough provenance to be redeemed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CouponPolicy {
    pub min_sources: usize,
}

impl Default for CouponPolicy {
    fn default() -> Self {
        Self {
            min_sources: DEFAULT_MIN_COUPON_SOURCES,
        }
    }
}

impl CouponPolicy {
    pub fn new(min_sources: usize) -> Self {
        Self { min_sources }
    }

    pub fn is_redeemable(&self, coupon: &Coupon) -> bool {
        coupon.sources.len() >= self.min_sources
    }
}

/// Coupon and coupon-source persistence bound to one transaction.
///
/// Creation is find-or-create throughout: existing rows are returned, never
/// duplicated, and unique-constraint violations are not relied upon.
pub struct CouponRepository {
    executor: Executor,
}

impl CouponRepository {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }

    pub async fn find_or_create_source(&self, path: &str) -> StoreResult<CouponSource> {
        let mut slot = self.executor.lock().await;
        let tx = active(&mut slot)?;

        let existing = sqlx::query_as::<_, CouponSource>(
            "SELECT id, path FROM coupon_sources WHERE path = $1",
        )
        .bind(path)
        .fetch_optional(&mut **tx)
        .await
        .context(format!("look up coupon source {path}"))?;
        if let Some(source) = existing {
            return Ok(source);
        }

        let inserted = sqlx::query_as::<_, CouponSource>(
            "INSERT INTO coupon_sources (path) VALUES ($1) \
             ON CONFLICT (path) DO NOTHING RETURNING id, path",
        )
        .bind(path)
        .fetch_optional(&mut **tx)
        .await
        .context(format!("create coupon source {path}"))?;
        if let Some(source) = inserted {
            return Ok(source);
        }

        // Another transaction inserted the same path between our select and insert.
        sqlx::query_as::<_, CouponSource>("SELECT id, path FROM coupon_sources WHERE path = $1")
            .bind(path)
            .fetch_one(&mut **tx)
            .await
            .context(format!("re-read coupon source {path}"))
    }

    /// Returns the coupon id for `code`, creating the coupon if needed.
    pub async fn find_or_create_coupon(&self, code: &str) -> StoreResult<i64> {
        let mut slot = self.executor.lock().await;
        let tx = active(&mut slot)?;

        let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM coupons WHERE code = $1")
            .bind(code)
            .fetch_optional(&mut **tx)
            .await
            .context(format!("look up coupon {code}"))?;
        if let Some(id) = existing {
            return Ok(id);
        }

        let inserted = sqlx::query_scalar::<_, i64>(
            "INSERT INTO coupons (code) VALUES ($1) ON CONFLICT (code) DO NOTHING RETURNING id",
        )
        .bind(code)
        .fetch_optional(&mut **tx)
        .await
        .context(format!("create coupon {code}"))?;
        if let Some(id) = inserted {
            return Ok(id);
        }

        sqlx::query_scalar::<_, i64>("SELECT id FROM coupons WHERE code = $1")
            .bind(code)
            .fetch_one(&mut **tx)
            .await
            .context(format!("re-read coupon {code}"))
    }

    /// Links a coupon to a source. Returns `false` when the link already existed.
    pub async fn link_source(&self, coupon_id: i64, source_id: i64) -> StoreResult<bool> {
        let mut slot = self.executor.lock().await;
        let tx = active(&mut slot)?;
        let result = sqlx::query(
            "INSERT INTO coupon_sources_join (coupon_id, source_id) VALUES ($1, $2) \
             ON CONFLICT (coupon_id, source_id) DO NOTHING",
        )
        .bind(coupon_id)
        .bind(source_id)
        .execute(&mut **tx)
        .await
        .context(format!("link coupon {coupon_id} to source {source_id}"))?;
        Ok(result.rows_affected() == 1)
    }

    /// Loads a coupon together with every source it was harvested from.
    pub async fn find_by_code(&self, code: &str) -> StoreResult<Option<Coupon>> {
        let mut slot = self.executor.lock().await;
        let tx = active(&mut slot)?;

        let rows = sqlx::query(
            "SELECT c.id AS coupon_id, s.id AS source_id, s.path \
             FROM coupons c \
             LEFT JOIN coupon_sources_join j ON j.coupon_id = c.id \
             LEFT JOIN coupon_sources s ON s.id = j.source_id \
             WHERE c.code = $1 \
             ORDER BY s.id",
        )
        .bind(code)
        .fetch_all(&mut **tx)
        .await
        .context(format!("fetch coupon {code}"))?;

        let Some(first) = rows.first() else {
            return Ok(None);
        };

        let sources = rows
            .iter()
            .filter_map(|row| {
                let id: Option<i64> = row.get("source_id");
                let path: Option<String> = row.get("path");
                Some(CouponSource { id: id?, path: path? })
            })
            .collect();

        Ok(Some(Coupon {
            id: first.get("coupon_id"),
            code: code.to_string(),
            sources,
        }))
    }

    pub async fn count_coupons(&self) -> StoreResult<i64> {
        self.count("SELECT COUNT(*) FROM coupons", "count coupons").await
    }

    pub async fn count_sources(&self) -> StoreResult<i64> {
        self.count("SELECT COUNT(*) FROM coupon_sources", "count coupon sources")
            .await
    }

    pub async fn count_links(&self) -> StoreResult<i64> {
        self.count("SELECT COUNT(*) FROM coupon_sources_join", "count coupon links")
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

//! Domain records and the request shape accepted by `POST /order`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub category: String,
}

/// Catalog entry before it has been assigned an id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewProduct {
    pub name: &'static str,
    pub price: f64,
    pub category: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: i64,
    /// Product id as exposed over the API.
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub items: Vec<OrderItem>,
    pub products: Vec<Product>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct CouponSource {
    pub id: i64,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Coupon {
    pub id: i64,
    pub code: String,
    pub sources: Vec<CouponSource>,
}

/// One requested line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    #[serde(default)]
    pub coupon_code: Option<String>,
    pub items: Vec<OrderLine>,
}

impl PlaceOrderRequest {
    /// Coupon code to validate, exactly as sent. An empty code counts as no coupon.
    pub fn coupon(&self) -> Option<&str> {
        self.coupon_code.as_deref().filter(|code| !code.is_empty())
    }
}

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};

use crate::api::{error::ApiError, AppState};
use crate::error::QueryError;
use crate::models::{Order, PlaceOrderRequest, Product};

/// GET /health
pub async fn health() -> &'static str {
    "OK"
}

/// GET /products
pub async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(state.queries.list_products().await?))
}

/// GET /product/{productId}
pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(state.queries.get_product(&product_id).await?))
}

/// GET /product/ (no id in the path)
pub async fn missing_product_id() -> ApiError {
    QueryError::InvalidId(String::new()).into()
}

/// GET /orders
pub async fn list_orders(State(state): State<AppState>) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.queries.list_orders().await?))
}

/// POST /order
pub async fn place_order(
    State(state): State<AppState>,
    payload: Result<Json<PlaceOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let Json(request) = payload?;
    let order = state.orders.place_order(&request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

//! Mapping from service errors to HTTP responses.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::{OrderError, QueryError, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message}")]
    BadRequest { code: &'static str, message: String },

    #[error("validation exception: {0}")]
    InvalidCoupon(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::InvalidCoupon(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest { code, .. } => code,
            Self::InvalidCoupon(_) => "INVALID_COUPON",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Storage(_) => "INTERNAL_ERROR",
        }
    }

    fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidCoupon(code) => Self::InvalidCoupon(code),
            OrderError::EmptyItems => Self::bad_request("EMPTY_ITEMS", err.to_string()),
            OrderError::InvalidQuantity { .. } => {
                Self::bad_request("INVALID_QUANTITY", err.to_string())
            }
            OrderError::UnknownProducts(_) => Self::bad_request("UNKNOWN_PRODUCT", err.to_string()),
            OrderError::Store(store) => Self::Storage(store),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::InvalidId(_) => Self::bad_request("INVALID_ID", "Invalid ID supplied"),
            QueryError::ProductNotFound(_) => Self::NotFound(err.to_string()),
            QueryError::Store(store) => Self::Storage(store),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request("INVALID_BODY", format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Storage failures are logged in full and reported generically.
        let message = match &self {
            Self::Storage(err) => {
                tracing::error!(
                    error = %err,
                    cause = ?std::error::Error::source(err),
                    "request failed in the store"
                );
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "code": self.error_code(),
            "message": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

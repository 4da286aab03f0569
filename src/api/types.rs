use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::error::OrdersError;

// ============================================================================
// Response bodies
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIdsResponse {
    pub order_uids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheResponse {
    pub size: usize,
    pub capacity: usize,
    /// Most recently used first
    pub order_uids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Errors
// ============================================================================

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

impl From<OrdersError> for ErrorResponse {
    fn from(e: OrdersError) -> Self {
        Self {
            error: e.to_string(),
        }
    }
}

/// Map a crate error onto an HTTP status
pub fn error_response(e: OrdersError) -> ApiError {
    let status = match &e {
        OrdersError::Validation(_) => StatusCode::BAD_REQUEST,
        OrdersError::StoreUnavailable(_) | OrdersError::Database(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(e.into()))
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::api::{state::AppState, types::*};
use crate::domain::OrderRecord;

/// GET /orders/:uid
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_uid): Path<String>,
) -> std::result::Result<Json<Arc<OrderRecord>>, ApiError> {
    match state.query.get_order(&order_uid).await {
        Ok(Some(order)) => Ok(Json(order)),
        Ok(None) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("order {} not found", order_uid),
        )),
        Err(e) => Err(error_response(e)),
    }
}

/// GET /orders
pub async fn list_orders(
    State(state): State<AppState>,
) -> std::result::Result<Json<OrderIdsResponse>, ApiError> {
    let order_uids = state.query.list_order_ids().await.map_err(error_response)?;
    Ok(Json(OrderIdsResponse { order_uids }))
}

/// GET /cache
pub async fn get_cache(State(state): State<AppState>) -> Json<CacheResponse> {
    let cache = state.query.cache();
    let order_uids = cache.ids_by_recency().await;

    Json(CacheResponse {
        size: order_uids.len(),
        capacity: cache.capacity(),
        order_uids,
    })
}

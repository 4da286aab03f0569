use axum::{routing::get, Router};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::{handlers, state::AppState};
use crate::coordination::ShutdownListener;
use crate::error::{OrdersError, Result};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Order endpoints
        .route("/orders", get(handlers::list_orders))
        .route("/orders/:uid", get(handlers::get_order))
        .route("/cache", get(handlers::get_cache))
        // Probes
        .route("/server_check", get(handlers::server_check))
        .route("/db_check", get(handlers::db_check))
        .route("/health", get(handlers::health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Bind and serve until shutdown is requested
pub async fn serve(port: u16, state: AppState, mut shutdown: ShutdownListener) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP API listening on {}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move {
            shutdown.triggered().await;
        })
        .await
        .map_err(|e| OrdersError::Internal(format!("HTTP server error: {}", e)))?;

    info!("HTTP API stopped");
    Ok(())
}

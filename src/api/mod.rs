//! The single-route values API the demo client calls.

use crate::error::{ResilienceError, Result};
use axum::{extract::Path, routing::get, Router};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// `GET /api/values/{id}` echoes `id`; negative ids are rejected with 400
pub async fn get_value(Path(id): Path<i64>) -> Result<String> {
    if id < 0 {
        debug!(id, "Rejecting negative id");
        return Err(ResilienceError::InvalidArgument(
            "id must not be negative.".to_string(),
        ));
    }

    Ok(id.to_string())
}

/// Build the API router
pub fn router() -> Router {
    Router::new()
        .route("/api/values/:id", get(get_value))
        .layer(TraceLayer::new_for_http())
}

/// Bind `addr` and serve until the process exits
pub async fn serve(addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Values API listening");

    axum::serve(listener, router())
        .await
        .map_err(|e| ResilienceError::Internal(format!("Server error: {}", e)))
}

//! HTTP surface: health probe and payment webhooks.

pub mod webhooks;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::core::ServerState;

pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/razorpay", post(webhooks::razorpay))
        .route("/webhooks/oxapay/{secret}", post(webhooks::oxapay))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests;

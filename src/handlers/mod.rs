pub mod correlations;
pub mod dev;
pub mod webhooks;

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::db::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// All always-on routes. The dev simulation endpoint is wired separately in
/// main, behind the dev-mode flag.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .merge(webhooks::router())
        .merge(correlations::router())
}

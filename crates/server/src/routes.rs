//! Operational HTTP surface: Prometheus scraping and liveness.

use crate::metrics;
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

/// Build the router for the metrics listener.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics::metrics_handler))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// GET /healthz - store connectivity probe.
async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(error) => {
            tracing::error!(error = %error, "Health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "store unreachable")
        }
    }
}

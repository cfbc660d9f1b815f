//! `GET /v1/metrics` — Prometheus text exposition for scraping.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};

use crate::api::state::AppState;

pub fn metrics_routes() -> Router<AppState> {
    Router::new().route("/v1/metrics", get(prometheus_metrics))
}

async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(metrics) => match metrics.encode() {
            Ok(output) => (
                StatusCode::OK,
                [("Content-Type", "text/plain; version=0.0.4; charset=utf-8")],
                output,
            ),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("Content-Type", "text/plain; charset=utf-8")],
                format!("failed to encode metrics: {}", e),
            ),
        },
        None => (
            StatusCode::NOT_FOUND,
            [("Content-Type", "text/plain; charset=utf-8")],
            "metrics not enabled".to_string(),
        ),
    }
}

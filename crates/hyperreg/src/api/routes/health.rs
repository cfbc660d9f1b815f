//! Liveness routes at the service root.

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::api::AppState;

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/", get(root)).route("/healthz", get(liveness))
}

async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: "hyperreg",
        version: env!("CARGO_PKG_VERSION"),
        description: "universal hyper-registry with real-time propagation",
    })
}

#[derive(Serialize)]
struct ServiceInfo {
    name: &'static str,
    version: &'static str,
    description: &'static str,
}

async fn liveness() -> Json<Liveness> {
    Json(Liveness {
        status: "healthy",
        timestamp: chrono::Utc::now(),
    })
}

#[derive(Serialize)]
struct Liveness {
    status: &'static str,
    timestamp: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn liveness_reports_healthy() {
        let response = liveness().await;
        assert_eq!(response.status, "healthy");
    }
}

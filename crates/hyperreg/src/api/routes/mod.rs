//! Route handlers, organized by resource.

pub mod entries;
pub mod health;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod registry;
pub mod stream;

use axum::Router;

use crate::api::AppState;

/// Build the complete router: `/v1/registry/*`, `/v1/stream/*`, health and
/// (feature-gated) metrics at the root.
pub fn api_router(state: AppState) -> Router {
    let registry_routes = Router::new()
        .merge(entries::routes())
        .merge(registry::routes());

    let mut router = Router::new()
        .nest("/v1/registry", registry_routes)
        .nest("/v1/stream", stream::routes())
        .merge(health::health_routes());

    #[cfg(feature = "metrics")]
    {
        router = router.merge(metrics::metrics_routes());
    }

    router.with_state(state)
}

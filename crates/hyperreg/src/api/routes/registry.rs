//! Propagation, hot-swap, and operational routes.

use std::collections::HashMap;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::api::types::{
    ApiError, HealthResponse, HotSwapRequest, HotSwapResponse, PropagateRequest,
    PropagateResponse, StatsResponse,
};
use crate::api::AppState;
use crate::identity::EntryId;
use crate::propagation::Rule;

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/propagate", post(propagate))
        .route("/hotswap", post(hotswap))
        .route("/health", get(health))
        .route("/stats", get(stats))
}

/// `Rule.when`/`transform`/`target_filter` are closures and can't be
/// deserialized from JSON, so an HTTP propagate request can't carry real
/// rule semantics. This handler builds one identical pass-through `Rule`
/// per target; CASCADE issued over this endpoint always visits every
/// target unconditionally. Expressing conditional rules (as the engine
/// itself supports) currently requires calling `PropagationEngine`
/// in-process, e.g. from `hyperreg-cli`.
async fn propagate(
    State(state): State<AppState>,
    Json(request): Json<PropagateRequest>,
) -> ApiResult<Json<PropagateResponse>> {
    let timeout = request.timeout();
    let source = EntryId::from(request.entry_id);
    let targets: Vec<EntryId> = request.targets.into_iter().map(EntryId::from).collect();

    let rules: HashMap<EntryId, Rule> = targets
        .iter()
        .map(|target| {
            (
                target.clone(),
                Rule {
                    name: "api-propagate".to_string(),
                    when: Box::new(|_| true),
                    transform: None,
                    target_filter: None,
                },
            )
        })
        .collect();

    let session_id = state
        .propagation
        .propagate(
            &source,
            request.update,
            request.mode,
            targets,
            &rules,
            request.quorum,
            timeout,
        )
        .await?;

    Ok(Json(PropagateResponse { session_id }))
}

async fn hotswap(
    State(state): State<AppState>,
    Json(request): Json<HotSwapRequest>,
) -> ApiResult<Json<HotSwapResponse>> {
    let verify_deadline = Duration::from_millis(request.verify_deadline_ms.unwrap_or(5_000));
    let drain_deadline = Duration::from_millis(request.drain_deadline_ms.unwrap_or(0));

    let transition_id = state
        .hotswap
        .swap(
            EntryId::from(request.entry_id),
            request.new_entry,
            Box::new(|_| true),
            verify_deadline,
            drain_deadline,
        )
        .await?;

    Ok(Json(HotSwapResponse { transition_id }))
}

async fn health(State(_state): State<AppState>) -> Json<HealthResponse> {
    let mut components = HashMap::new();
    components.insert("registry".to_string(), "up");
    components.insert("bus".to_string(), "up");
    components.insert("storage".to_string(), "up");

    Json(HealthResponse {
        status: "healthy",
        components,
    })
}

async fn stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let stats = state.registry.stats().await?;
    Ok(Json(StatsResponse {
        total_registered: stats.total_registered,
        total_active: stats.total_active,
        total_queries: stats.total_queries,
        avg_query_time_ms: stats.avg_query_time_ms,
        cache_hits: stats.cache_hits,
        cache_misses: stats.cache_misses,
        rollbacks_total: state.hotswap.rollbacks_total(),
        subscriber_count: state.bus.subscriber_count(),
    }))
}

//! Entry CRUD and search routes: `/v1/registry/entries`, `/v1/registry/search`,
//! `/v1/registry/relationships`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};

use crate::api::types::{
    ApiError, CreateEntryRequest, CreateEntryResponse, CreateRelationshipRequest,
    CreateRelationshipResponse, DeleteEntryQuery, EntryListQuery, SearchApiRequest,
    SearchApiResponse,
};
use crate::api::AppState;
use crate::error::RegistryError;
use crate::identity::{Entry, EntryId, Relationship};

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/entries", get(list_entries).post(create_entry))
        .route(
            "/entries/:id",
            get(get_entry).put(replace_entry).patch(patch_entry).delete(delete_entry),
        )
        .route("/search", post(search_entries))
        .route("/relationships", post(create_relationship))
}

async fn list_entries(
    State(state): State<AppState>,
    Query(query): Query<EntryListQuery>,
) -> ApiResult<Json<Vec<Entry>>> {
    let entries = state.registry.search(&query.into_filters()).await?;
    Ok(Json(entries))
}

async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Entry>> {
    let entry = state.registry.get(&EntryId::from(id)).await?;
    Ok(Json(entry))
}

async fn create_entry(
    State(state): State<AppState>,
    Json(CreateEntryRequest(mut entry)): Json<CreateEntryRequest>,
) -> ApiResult<(StatusCode, Json<CreateEntryResponse>)> {
    if entry.id.0.is_empty() {
        entry.id = EntryId::generate();
    }
    let registered = state.registry.register(entry).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateEntryResponse {
            id: registered.id.0,
        }),
    ))
}

async fn replace_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut entry): Json<Entry>,
) -> ApiResult<Json<Entry>> {
    entry.id = EntryId::from(id);
    let updated = state.registry.update(entry, false).await?;
    Ok(Json(updated))
}

async fn patch_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<serde_json::Value>,
) -> ApiResult<Json<Entry>> {
    let entry_id = EntryId::from(id);
    let mut current = state.registry.get(&entry_id).await?;

    if let Some(map) = patch.as_object() {
        if let Some(status) = map.get("status") {
            current.status = serde_json::from_value(status.clone())
                .map_err(|e| RegistryError::validation("status", e.to_string(), uuid::Uuid::new_v4()))?;
        }
        if let Some(data) = map.get("data").and_then(|v| v.as_object()) {
            for (k, v) in data {
                current.data.insert(k.clone(), v.clone());
            }
        }
        if let Some(metadata) = map.get("metadata").and_then(|v| v.as_object()) {
            for (k, v) in metadata {
                current.metadata.insert(k.clone(), v.clone());
            }
        }
        if let Some(config) = map.get("config").and_then(|v| v.as_object()) {
            for (k, v) in config {
                current.config.insert(k.clone(), v.clone());
            }
        }
    }

    current.refresh_checksum();
    let updated = state.registry.update(current, false).await?;
    Ok(Json(updated))
}

async fn delete_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DeleteEntryQuery>,
) -> ApiResult<StatusCode> {
    state
        .registry
        .delete(&EntryId::from(id), query.force)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn search_entries(
    State(state): State<AppState>,
    Json(request): Json<SearchApiRequest>,
) -> ApiResult<Json<SearchApiResponse>> {
    let mut hits = state.registry.search(&request.filters).await?;

    if let Some(query) = request.query.as_deref() {
        let query = query.to_lowercase();
        hits.retain(|e| e.name.to_lowercase().contains(&query) || e.namespace.to_lowercase().contains(&query));
    }

    let total = hits.len();
    hits.truncate(request.limit);
    Ok(Json(SearchApiResponse { hits, total }))
}

async fn create_relationship(
    State(state): State<AppState>,
    Json(request): Json<CreateRelationshipRequest>,
) -> ApiResult<Json<CreateRelationshipResponse>> {
    let source_id = EntryId::from(request.source);
    let mut source = state.registry.get(&source_id).await?;
    source.relationships.push(Relationship {
        target_id: EntryId::from(request.target),
        kind: request.kind,
    });
    source.refresh_checksum();
    let updated = state.registry.update(source, false).await?;
    Ok(Json(CreateRelationshipResponse {
        id: updated.id.0,
    }))
}

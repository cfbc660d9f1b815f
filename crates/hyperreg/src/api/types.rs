//! API Request and Response Types
//!
//! These types define the JSON schema for the `/v1/registry` surface.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::{Category, Entry, RelationshipKind, Status};
use crate::propagation::PropagationMode;
use crate::storage::SearchFilters as CoreSearchFilters;

fn default_limit() -> usize {
    20
}

/// Query parameters for `GET /v1/registry/entries`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryListQuery {
    pub namespace: Option<String>,
    #[serde(rename = "type")]
    pub category: Option<Category>,
    pub status: Option<Status>,
}

impl EntryListQuery {
    pub fn into_filters(self) -> CoreSearchFilters {
        CoreSearchFilters {
            namespace: self.namespace,
            category: self.category,
            status: self.status,
            facets: HashMap::new(),
        }
    }
}

/// Request body for `POST /v1/registry/search`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchApiRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub filters: CoreSearchFilters,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// Response body for `POST /v1/registry/search`.
#[derive(Debug, Clone, Serialize)]
pub struct SearchApiResponse {
    pub hits: Vec<Entry>,
    pub total: usize,
}

/// Request body for `POST /v1/registry/entries` (id optional, server-assigned otherwise).
#[derive(Debug, Clone, Deserialize)]
pub struct CreateEntryRequest(pub Entry);

/// Response body for `POST /v1/registry/entries`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateEntryResponse {
    pub id: String,
}

/// Query parameters for `DELETE /v1/registry/entries/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteEntryQuery {
    #[serde(default)]
    pub force: bool,
}

/// Request body for `POST /v1/registry/relationships`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRelationshipRequest {
    pub source: String,
    pub target: String,
    pub kind: RelationshipKind,
}

/// Response body for `POST /v1/registry/relationships`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateRelationshipResponse {
    pub id: String,
}

/// Request body for `POST /v1/registry/propagate`.
#[derive(Debug, Clone, Deserialize)]
pub struct PropagateRequest {
    pub entry_id: String,
    pub update: serde_json::Value,
    pub mode: PropagationMode,
    /// Entries the propagation should reach. Required for `cascade` and
    /// `consensus`; ignored (treated as empty) for `eventual`.
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub quorum: Option<usize>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl PropagateRequest {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(5_000))
    }
}

/// Response body for `POST /v1/registry/propagate`.
#[derive(Debug, Clone, Serialize)]
pub struct PropagateResponse {
    pub session_id: Uuid,
}

/// Request body for `POST /v1/registry/hotswap`.
#[derive(Debug, Clone, Deserialize)]
pub struct HotSwapRequest {
    pub entry_id: String,
    pub new_entry: Entry,
    #[serde(default)]
    pub verify_deadline_ms: Option<u64>,
    #[serde(default)]
    pub drain_deadline_ms: Option<u64>,
}

/// Response body for `POST /v1/registry/hotswap`.
#[derive(Debug, Clone, Serialize)]
pub struct HotSwapResponse {
    pub transition_id: Uuid,
}

/// Response body for `GET /v1/registry/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub components: HashMap<String, &'static str>,
}

/// Response body for `GET /v1/registry/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub total_registered: u64,
    pub total_active: u64,
    pub total_queries: u64,
    pub avg_query_time_ms: f64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub rollbacks_total: u64,
    pub subscriber_count: usize,
}

/// Standard API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
    pub request_id: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// Common error codes, mirroring `error::ErrorCategory`.
pub mod error_codes {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const CONFLICT: &str = "CONFLICT";
    pub const UNAVAILABLE: &str = "UNAVAILABLE";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

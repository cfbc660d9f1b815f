//! HTTP API Gateway for the registry
//!
//! Exposes spec.md §6's `/v1/registry` surface over Axum:
//! ```text
//! /v1/registry/
//! ├── entries        - CRUD + list
//! ├── search          - query with filters
//! ├── relationships    - link two entries
//! ├── propagate        - rule-driven updates
//! ├── hotswap          - version replacement
//! ├── health / stats   - operational surface
//! /v1/stream/{entry_id} - WS change feed
//! /v1/metrics           - Prometheus text (feature `metrics`)
//! ```

pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;
pub mod types;

pub use server::{ApiConfig, ApiServer};
pub use state::AppState;
pub use types::*;

use axum::{http::StatusCode, Json};

use crate::error::{ErrorCategory, RegistryError};
use crate::api::types::{error_codes, ApiError};

/// Map a [`RegistryError`] onto the HTTP status/body pair spec.md §6
/// prescribes. Every route handler's `Result<_, (StatusCode, Json<ApiError>)>`
/// uses this via `?`/`.map_err`.
impl From<RegistryError> for (StatusCode, Json<ApiError>) {
    fn from(err: RegistryError) -> Self {
        let (status, code) = match err.category() {
            ErrorCategory::Validation => (StatusCode::BAD_REQUEST, error_codes::VALIDATION_FAILED),
            ErrorCategory::NotFound => (StatusCode::NOT_FOUND, error_codes::NOT_FOUND),
            ErrorCategory::Conflict => (StatusCode::CONFLICT, error_codes::CONFLICT),
            ErrorCategory::Unavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, error_codes::UNAVAILABLE)
            }
            ErrorCategory::Internal => {
                (StatusCode::INTERNAL_SERVER_ERROR, error_codes::INTERNAL_ERROR)
            }
        };
        (status, Json(ApiError::new(code, err.to_string())))
    }
}

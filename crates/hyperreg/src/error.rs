//! Error types shared across the registry.

use uuid::Uuid;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors produced by registry operations.
///
/// Every variant that originates from a request carries a `request_id` so
/// API handlers and CLI commands can correlate an error back to the call
/// that produced it (see `api/middleware.rs` for how the id is generated).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// An entry failed schema or business-rule validation.
    #[error("validation failed for {field}: {reason} (request {request_id})")]
    Validation {
        /// Name of the offending field.
        field: String,
        /// Human-readable reason.
        reason: String,
        /// Correlation id of the request that triggered the error.
        request_id: Uuid,
    },

    /// The requested entry does not exist.
    #[error("entry not found: {id} (request {request_id})")]
    NotFound {
        /// The entry id that was not found.
        id: String,
        /// Correlation id of the request.
        request_id: Uuid,
    },

    /// An entry with the same (namespace, name, version) already exists.
    #[error("conflict: {namespace}/{name}@{version} already registered (request {request_id})")]
    Conflict {
        /// Namespace of the conflicting entry.
        namespace: String,
        /// Name of the conflicting entry.
        name: String,
        /// Version of the conflicting entry.
        version: String,
        /// Correlation id of the request.
        request_id: Uuid,
    },

    /// Deletion was refused because other entries still depend on this one.
    #[error("cannot delete {id}: {dependents} dependents still reference it (request {request_id})")]
    DependentsExist {
        /// Id of the entry that could not be deleted.
        id: String,
        /// Number of entries that still depend on it.
        dependents: usize,
        /// Correlation id of the request.
        request_id: Uuid,
    },

    /// A dependency or relationship graph traversal detected a cycle.
    #[error("dependency cycle detected: {path} (request {request_id})")]
    Cycle {
        /// Human-readable cycle path, e.g. `a -> b -> c -> a`.
        path: String,
        /// Correlation id of the request.
        request_id: Uuid,
    },

    /// The storage backend failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the underlying failure.
        message: String,
    },

    /// An operation exceeded its allotted time budget.
    #[error("operation timed out after {elapsed_ms}ms: {operation}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// Elapsed milliseconds before giving up.
        elapsed_ms: u64,
    },

    /// A circuit breaker is open and is refusing calls.
    #[error("circuit open for target {target}, retry after {retry_after_ms}ms")]
    CircuitOpen {
        /// Name of the protected target.
        target: String,
        /// Suggested backoff before the caller should retry.
        retry_after_ms: u64,
    },

    /// A hot-swap session was aborted and rolled back.
    #[error("hot-swap aborted for {entry_id}: {reason}")]
    HotSwapAborted {
        /// Entry id whose swap was aborted.
        entry_id: String,
        /// Why the swap was aborted.
        reason: String,
    },

    /// Encryption or decryption of a stream payload failed.
    #[error("encryption error: {message}")]
    Encryption {
        /// Description of the cryptographic failure.
        message: String,
    },

    /// A subscription or stream channel is full or closed.
    #[error("channel error: {message}")]
    Channel {
        /// Description of the channel failure.
        message: String,
    },

    /// JSON (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A semantic version string could not be parsed.
    #[error("invalid version: {0}")]
    InvalidVersion(#[from] semver::Error),
}

impl RegistryError {
    /// Build a [`RegistryError::Validation`] error.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>, request_id: Uuid) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
            request_id,
        }
    }

    /// Build a [`RegistryError::NotFound`] error.
    pub fn not_found(id: impl Into<String>, request_id: Uuid) -> Self {
        Self::NotFound {
            id: id.into(),
            request_id,
        }
    }

    /// Build a [`RegistryError::Storage`] error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Returns the error category this error maps to.
    ///
    /// Used both by the CLI (§6 exit codes: 0 ok, 2 validation, 3 conflict,
    /// 4 not found, 10 unexpected) and by the HTTP API (`api/middleware.rs`)
    /// to pick a status code.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::DependentsExist { .. } => ErrorCategory::Conflict,
            Self::Cycle { .. } => ErrorCategory::Validation,
            Self::Timeout { .. } => ErrorCategory::Unavailable,
            Self::CircuitOpen { .. } => ErrorCategory::Unavailable,
            Self::HotSwapAborted { .. } => ErrorCategory::Conflict,
            Self::Storage { .. }
            | Self::Encryption { .. }
            | Self::Channel { .. }
            | Self::Serialization(_)
            | Self::Io(_)
            | Self::InvalidVersion(_) => ErrorCategory::Internal,
        }
    }
}

/// Coarse error classification used to map errors onto CLI exit codes and
/// HTTP status codes without duplicating the match arms in every caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Input failed validation; maps to CLI exit code 2 / HTTP 400.
    Validation,
    /// Referenced entry does not exist; maps to CLI exit code 4 / HTTP 404.
    NotFound,
    /// State conflict (duplicate, dependents, aborted swap); CLI exit code 3 / HTTP 409.
    Conflict,
    /// Temporarily unavailable (timeout, open circuit); HTTP 503.
    Unavailable,
    /// Unexpected internal failure; CLI exit code 10 / HTTP 500.
    Internal,
}

impl ErrorCategory {
    /// The CLI exit code this category maps to, per the command surface.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Validation => 2,
            Self::Conflict => 3,
            Self::NotFound => 4,
            Self::Unavailable => 5,
            Self::Internal => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_maps_to_exit_code_two() {
        let err = RegistryError::validation("name", "must not be empty", Uuid::nil());
        assert_eq!(err.category().exit_code(), 2);
    }

    #[test]
    fn not_found_maps_to_exit_code_four() {
        let err = RegistryError::not_found("abc", Uuid::nil());
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert_eq!(err.category().exit_code(), 4);
    }

    #[test]
    fn display_includes_request_id() {
        let id = Uuid::nil();
        let err = RegistryError::not_found("abc", id);
        assert!(err.to_string().contains(&id.to_string()));
    }
}

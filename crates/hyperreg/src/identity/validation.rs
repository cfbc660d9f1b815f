//! Entry validation.
//!
//! `validate()` never short-circuits: it accumulates every violation it
//! finds so callers (and tests) see the complete picture in one pass,
//! rather than fixing one problem at a time across repeated calls.

use crate::identity::entry::Entry;

/// A single validation violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Field or invariant the issue concerns.
    pub field: String,
    /// Human-readable description.
    pub reason: String,
}

impl ValidationIssue {
    fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Validate an entry against every invariant in the data model. Returns an
/// empty vector iff the entry is fully valid.
pub fn validate(entry: &Entry) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if entry.id.0.trim().is_empty() {
        issues.push(ValidationIssue::new("id", "must not be empty"));
    }
    if entry.namespace.trim().is_empty() {
        issues.push(ValidationIssue::new("namespace", "must not be empty"));
    }
    if entry.name.trim().is_empty() {
        issues.push(ValidationIssue::new("name", "must not be empty"));
    }
    if entry.tenant_id.trim().is_empty() {
        issues.push(ValidationIssue::new("tenant_id", "must not be empty"));
    }

    if entry.updated_at < entry.created_at {
        issues.push(ValidationIssue::new(
            "updated_at",
            "must be greater than or equal to created_at",
        ));
    }

    if !entry.checksum_is_valid() {
        issues.push(ValidationIssue::new(
            "checksum",
            "does not match recomputation over canonical payload",
        ));
    }

    let overlap: Vec<_> = entry
        .dependencies
        .iter()
        .filter(|d| entry.conflicts.contains(d))
        .collect();
    if !overlap.is_empty() {
        issues.push(ValidationIssue::new(
            "dependencies",
            format!(
                "overlaps with conflicts: {}",
                overlap
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        ));
    }

    if !entry.gefs.is_valid() {
        issues.push(ValidationIssue::new(
            "gefs",
            "every component score must be in [0, 100]",
        ));
    }

    issues
}

//! The core unit of registration: [`Entry`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::identity::category::Category;
use crate::identity::gefs::Gefs;

/// Opaque key-value payload. Serialized via `serde_json::Value` so arbitrary
/// nested structures can be carried without the registry needing to
/// understand their shape.
pub type OpaqueMap = HashMap<String, serde_json::Value>;

/// Stable, globally-unique identifier for an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub String);

impl EntryId {
    /// Generate a new random entry id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EntryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle status of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Registered,
    Active,
    Inactive,
    Draining,
    Deprecated,
    Failed,
    Unloaded,
}

/// Kind of relationship between two entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    DependsOn,
    Extends,
    Replaces,
    References,
    Owns,
    /// Downstream recipient of this entry's own cascade propagation hops,
    /// distinct from the top-level targets a propagation session is
    /// launched with.
    PropagatesTo,
}

/// A directed link from an entry to another, with a kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// The entry this relationship points to.
    pub target_id: EntryId,
    /// What kind of relationship this is.
    pub kind: RelationshipKind,
}

/// A registry record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    // Identity
    pub id: EntryId,
    pub namespace: String,
    pub name: String,
    pub version: semver::Version,
    pub category: Category,
    #[serde(default = "default_tenant_id")]
    pub tenant_id: String,

    // Provenance & integrity
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub checksum: String,
    pub size_bytes: u64,

    // Payload
    #[serde(default)]
    pub data: OpaqueMap,
    #[serde(default)]
    pub metadata: OpaqueMap,
    #[serde(default)]
    pub specifications: OpaqueMap,
    #[serde(default)]
    pub config: OpaqueMap,
    #[serde(default)]
    pub tags: HashSet<String>,

    // Graph
    #[serde(default)]
    pub dependencies: Vec<EntryId>,
    #[serde(default)]
    pub conflicts: HashSet<EntryId>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,

    // Lifecycle
    pub status: Status,

    // Quality
    pub gefs: Gefs,

    // Streaming / propagation / hot-swap flags
    #[serde(default)]
    pub hotswap_enabled: bool,
    #[serde(default)]
    pub encrypt_payloads: bool,
}

fn default_tenant_id() -> String {
    "default".to_string()
}

impl Entry {
    /// Recursively sort an arbitrary JSON value's object keys so two
    /// semantically-equal values always serialize identically.
    fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => {
                let sorted: BTreeMap<String, serde_json::Value> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::canonicalize(v)))
                    .collect();
                let mut out = serde_json::Map::new();
                for (k, v) in sorted {
                    out.insert(k, v);
                }
                serde_json::Value::Object(out)
            }
            serde_json::Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Self::canonicalize).collect())
            }
            other => other.clone(),
        }
    }

    /// Canonical JSON serialization of this entry's payload
    /// (`data`, `metadata`, `specifications`, `config`), used as the input
    /// to [`Entry::compute_checksum`].
    pub fn canonical_payload(&self) -> String {
        let payload = serde_json::json!({
            "data": self.data,
            "metadata": self.metadata,
            "specifications": self.specifications,
            "config": self.config,
        });
        let canonical = Self::canonicalize(&payload);
        // serde_json's Map iterates in insertion order; canonicalize()
        // rebuilds it from a BTreeMap so keys come out sorted.
        serde_json::to_string(&canonical).unwrap_or_default()
    }

    /// SHA-256 over [`Entry::canonical_payload`], hex-encoded.
    pub fn compute_checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_payload().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Recompute and store the checksum and size.
    pub fn refresh_checksum(&mut self) {
        self.checksum = self.compute_checksum();
        self.size_bytes = self.canonical_payload().len() as u64;
    }

    /// Whether the stored checksum matches a fresh recomputation.
    pub fn checksum_is_valid(&self) -> bool {
        self.checksum == self.compute_checksum()
    }

    /// Facet rows derived from this entry's `config.facets`,
    /// `metadata.facets`, and any attached [`crate::identity::feature_layer::FeatureLayer`] facets.
    /// Returns `(key, value)` pairs with every combination expanded.
    pub fn derived_facets(&self) -> Vec<(String, String)> {
        let mut facets = Vec::new();
        for source in [&self.config, &self.metadata] {
            if let Some(serde_json::Value::Object(map)) = source.get("facets") {
                for (key, value) in map {
                    match value {
                        serde_json::Value::Array(values) => {
                            for v in values {
                                if let Some(s) = v.as_str() {
                                    facets.push((key.clone(), s.to_string()));
                                }
                            }
                        }
                        serde_json::Value::String(s) => facets.push((key.clone(), s.clone())),
                        _ => {}
                    }
                }
            }
        }
        facets.sort();
        facets.dedup();
        facets
    }
}

/// Allowed `(from, to)` status transitions. The transition graph is total:
/// any pair not listed here is rejected.
pub const ALLOWED_TRANSITIONS: &[(Status, Status)] = &[
    (Status::Registered, Status::Active),
    (Status::Active, Status::Draining),
    (Status::Active, Status::Inactive),
    (Status::Draining, Status::Active),
    (Status::Draining, Status::Inactive),
    (Status::Inactive, Status::Active),
    (Status::Active, Status::Failed),
    (Status::Draining, Status::Failed),
    (Status::Registered, Status::Failed),
    (Status::Failed, Status::Registered),
    (Status::Active, Status::Unloaded),
    (Status::Inactive, Status::Unloaded),
    (Status::Unloaded, Status::Registered),
    (Status::Registered, Status::Deprecated),
    (Status::Active, Status::Deprecated),
    (Status::Inactive, Status::Deprecated),
];

/// Whether a transition from `from` to `to` is permitted.
pub fn transition_allowed(from: Status, to: Status) -> bool {
    from == to || ALLOWED_TRANSITIONS.contains(&(from, to))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> Entry {
        let mut entry = Entry {
            id: EntryId::from("e1"),
            namespace: "nx.plugins".to_string(),
            name: "Vision".to_string(),
            version: semver::Version::parse("1.0.0").unwrap(),
            category: Category::Plugins,
            tenant_id: "default".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by: "test".to_string(),
            checksum: String::new(),
            size_bytes: 0,
            data: OpaqueMap::new(),
            metadata: OpaqueMap::new(),
            specifications: OpaqueMap::new(),
            config: OpaqueMap::new(),
            tags: HashSet::new(),
            dependencies: Vec::new(),
            conflicts: HashSet::new(),
            relationships: Vec::new(),
            status: Status::Registered,
            gefs: Gefs::default(),
            hotswap_enabled: false,
            encrypt_payloads: false,
        };
        entry.refresh_checksum();
        entry
    }

    #[test]
    fn checksum_matches_recomputation() {
        let entry = sample_entry();
        assert!(entry.checksum_is_valid());
    }

    #[test]
    fn checksum_changes_with_payload() {
        let mut entry = sample_entry();
        let before = entry.checksum.clone();
        entry
            .data
            .insert("foo".to_string(), serde_json::json!("bar"));
        entry.refresh_checksum();
        assert_ne!(before, entry.checksum);
    }

    #[test]
    fn canonical_payload_is_key_order_independent() {
        let mut a = sample_entry();
        a.data.insert("z".to_string(), serde_json::json!(1));
        a.data.insert("a".to_string(), serde_json::json!(2));

        let mut b = sample_entry();
        b.data.insert("a".to_string(), serde_json::json!(2));
        b.data.insert("z".to_string(), serde_json::json!(1));

        assert_eq!(a.canonical_payload(), b.canonical_payload());
    }

    #[test]
    fn registered_to_active_is_allowed() {
        assert!(transition_allowed(Status::Registered, Status::Active));
    }

    #[test]
    fn registered_to_draining_is_rejected() {
        assert!(!transition_allowed(Status::Registered, Status::Draining));
    }

    #[test]
    fn derived_facets_are_sorted_and_deduped() {
        let mut entry = sample_entry();
        entry.config.insert(
            "facets".to_string(),
            serde_json::json!({"domain": ["vision", "ml", "vision"]}),
        );
        assert_eq!(
            entry.derived_facets(),
            vec![
                ("domain".to_string(), "ml".to_string()),
                ("domain".to_string(), "vision".to_string()),
            ]
        );
    }
}

//! Feature layers: a composite classification that, once registered,
//! produces a registry entry and contributes rows to the facet index.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maturity of a [`FeatureFlag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Maturity {
    Alpha,
    Beta,
    Ga,
    Deprecated,
}

/// A single feature flag carried by a [`FeatureLayer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFlag {
    /// Stable id of the flag.
    pub id: String,
    /// Category this flag belongs to (free text, distinct from [`crate::identity::category::Category`]).
    pub category: String,
    /// Maturity of the flag.
    pub maturity: Maturity,
    /// Whether the flag is currently enabled.
    pub enabled: bool,
    /// Non-negative rollout weight.
    pub weight: f64,
    /// Free-form tags.
    pub tags: Vec<String>,
}

/// A composite classification. Registering a `FeatureLayer` produces a
/// registry entry whose `config.facets`/`metadata.facets` are seeded from
/// [`FeatureLayer::facets`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureLayer {
    /// Stable id, shared with the produced entry.
    pub id: String,
    /// Dot-separated namespace.
    pub namespace: String,
    /// Display name.
    pub name: String,
    /// SemVer version string.
    pub version: String,
    /// Flags carried by this layer.
    pub flags: Vec<FeatureFlag>,
    /// Facet key to candidate-value lists, merged into the facet index.
    pub facets: HashMap<String, Vec<String>>,
}

impl FeatureLayer {
    /// Validate the layer in isolation (flag weights, duplicate flag ids).
    /// Returns every violation found rather than failing fast, matching the
    /// accumulation style used by [`crate::identity::validation::validate`].
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.id.is_empty() {
            issues.push("feature layer id must not be empty".to_string());
        }
        if self.name.is_empty() {
            issues.push("feature layer name must not be empty".to_string());
        }
        if semver::Version::parse(&self.version).is_err() {
            issues.push(format!("feature layer version '{}' is not valid semver", self.version));
        }

        let mut seen_flag_ids = std::collections::HashSet::new();
        for flag in &self.flags {
            if !seen_flag_ids.insert(&flag.id) {
                issues.push(format!("duplicate feature flag id: {}", flag.id));
            }
            if flag.weight < 0.0 {
                issues.push(format!("feature flag {} has negative weight", flag.id));
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_layer() -> FeatureLayer {
        FeatureLayer {
            id: "fl-1".to_string(),
            namespace: "nx.features".to_string(),
            name: "vision-rollout".to_string(),
            version: "1.0.0".to_string(),
            flags: vec![FeatureFlag {
                id: "flag-1".to_string(),
                category: "rollout".to_string(),
                maturity: Maturity::Beta,
                enabled: true,
                weight: 1.0,
                tags: vec!["vision".to_string()],
            }],
            facets: HashMap::from([("domain".to_string(), vec!["vision".to_string()])]),
        }
    }

    #[test]
    fn valid_layer_has_no_issues() {
        assert!(sample_layer().validate().is_empty());
    }

    #[test]
    fn negative_weight_is_rejected() {
        let mut layer = sample_layer();
        layer.flags[0].weight = -1.0;
        assert!(!layer.validate().is_empty());
    }

    #[test]
    fn duplicate_flag_ids_are_rejected() {
        let mut layer = sample_layer();
        let dup = layer.flags[0].clone();
        layer.flags.push(dup);
        assert!(layer
            .validate()
            .iter()
            .any(|issue| issue.contains("duplicate")));
    }
}

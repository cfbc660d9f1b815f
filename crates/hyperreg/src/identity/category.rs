//! Closed classification taxonomy for registry entries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The fixed set of classifications an [`crate::identity::entry::Entry`] can
/// carry.
///
/// This is deliberately a flat, deduplicated enum: earlier iterations of the
/// source material split the taxonomy across a "Swarm" registry and a
/// "Universal" registry with overlapping names (`agents` in both, `models`
/// vs `model`, etc). Those duplicates are merged here rather than aliased,
/// per the taxonomy decision recorded in `DESIGN.md`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Agents,
    Services,
    Plugins,
    Engines,
    Prompts,
    Models,
    Embeddings,
    Skills,
    Memory,
    Apis,
    Webhooks,
    Integrations,
    Resources,
    Infrastructure,
    Components,
    Pipelines,
    Datasets,
    Knowledge,
    Search,
    EventSchemas,
    TaskSchemas,
    Templates,
    Workflows,
    Features,
    Incidents,
    Projects,
    Organizations,
    Users,
    Tenants,
    Widgets,
    Notifications,
    Communications,
    Modality,
    Multimodal,
    HotswapComponents,
    StreamingEndpoints,
    PropagationChains,
    FeatureLayer,
    Subregistry,
    ZshConfig,
    Palettes,
    Glyphs,
    Animations,
    /// Generic external service reconciled by the integration bridge when no
    /// more specific category applies.
    Service,
}

impl Category {
    /// All known categories, in declaration order. Used by validation to
    /// produce a helpful error message and by tests enumerating coverage.
    pub const ALL: &'static [Category] = &[
        Category::Agents,
        Category::Services,
        Category::Plugins,
        Category::Engines,
        Category::Prompts,
        Category::Models,
        Category::Embeddings,
        Category::Skills,
        Category::Memory,
        Category::Apis,
        Category::Webhooks,
        Category::Integrations,
        Category::Resources,
        Category::Infrastructure,
        Category::Components,
        Category::Pipelines,
        Category::Datasets,
        Category::Knowledge,
        Category::Search,
        Category::EventSchemas,
        Category::TaskSchemas,
        Category::Templates,
        Category::Workflows,
        Category::Features,
        Category::Incidents,
        Category::Projects,
        Category::Organizations,
        Category::Users,
        Category::Tenants,
        Category::Widgets,
        Category::Notifications,
        Category::Communications,
        Category::Modality,
        Category::Multimodal,
        Category::HotswapComponents,
        Category::StreamingEndpoints,
        Category::PropagationChains,
        Category::FeatureLayer,
        Category::Subregistry,
        Category::ZshConfig,
        Category::Palettes,
        Category::Glyphs,
        Category::Animations,
        Category::Service,
    ];

    fn as_snake_case(&self) -> &'static str {
        match self {
            Category::Agents => "agents",
            Category::Services => "services",
            Category::Plugins => "plugins",
            Category::Engines => "engines",
            Category::Prompts => "prompts",
            Category::Models => "models",
            Category::Embeddings => "embeddings",
            Category::Skills => "skills",
            Category::Memory => "memory",
            Category::Apis => "apis",
            Category::Webhooks => "webhooks",
            Category::Integrations => "integrations",
            Category::Resources => "resources",
            Category::Infrastructure => "infrastructure",
            Category::Components => "components",
            Category::Pipelines => "pipelines",
            Category::Datasets => "datasets",
            Category::Knowledge => "knowledge",
            Category::Search => "search",
            Category::EventSchemas => "event_schemas",
            Category::TaskSchemas => "task_schemas",
            Category::Templates => "templates",
            Category::Workflows => "workflows",
            Category::Features => "features",
            Category::Incidents => "incidents",
            Category::Projects => "projects",
            Category::Organizations => "organizations",
            Category::Users => "users",
            Category::Tenants => "tenants",
            Category::Widgets => "widgets",
            Category::Notifications => "notifications",
            Category::Communications => "communications",
            Category::Modality => "modality",
            Category::Multimodal => "multimodal",
            Category::HotswapComponents => "hotswap_components",
            Category::StreamingEndpoints => "streaming_endpoints",
            Category::PropagationChains => "propagation_chains",
            Category::FeatureLayer => "feature_layer",
            Category::Subregistry => "subregistry",
            Category::ZshConfig => "zsh_config",
            Category::Palettes => "palettes",
            Category::Glyphs => "glyphs",
            Category::Animations => "animations",
            Category::Service => "service",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_snake_case())
    }
}

/// Error returned when a string does not name a known category.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_snake_case() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_str() {
        for category in Category::ALL {
            let s = category.to_string();
            let parsed: Category = s.parse().unwrap();
            assert_eq!(parsed, *category);
        }
    }

    #[test]
    fn unknown_category_is_rejected() {
        assert!("not_a_real_category".parse::<Category>().is_err());
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&Category::EventSchemas).unwrap();
        assert_eq!(json, "\"event_schemas\"");
    }
}

//! `reg search` - search entries by namespace, category, status, or facet.

use std::collections::HashMap;

use anyhow::Context;
use clap::Args;
use hyperreg::{Category, RegistryConfig, SearchFilters, Status};

use crate::output::{create_table, OutputFormat};

/// Search entries by namespace, category, status, or facet
#[derive(Args)]
pub struct SearchArgs {
    /// Filter by exact namespace
    #[arg(long)]
    namespace: Option<String>,

    /// Filter by category
    #[arg(long)]
    category: Option<String>,

    /// Filter by status (registered, active, inactive, draining, deprecated, failed, unloaded)
    #[arg(long)]
    status: Option<String>,

    /// Facet filter as `key=value`; repeatable. Same key ORs, different keys AND.
    #[arg(long = "facet")]
    facets: Vec<String>,

    /// Output format
    #[arg(long, short = 'f', value_enum, default_value = "table")]
    format: OutputFormat,
}

fn parse_status(s: &str) -> anyhow::Result<Status> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .with_context(|| format!("unknown status: {s}"))
}

fn parse_facets(raw: &[String]) -> anyhow::Result<HashMap<String, Vec<String>>> {
    let mut facets: HashMap<String, Vec<String>> = HashMap::new();
    for pair in raw {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("facet filter must be key=value, got `{pair}`"))?;
        facets.entry(key.to_string()).or_default().push(value.to_string());
    }
    Ok(facets)
}

pub async fn run(args: SearchArgs, config: &RegistryConfig) -> anyhow::Result<()> {
    let registry = crate::store::open(config).await?;

    let filters = SearchFilters {
        namespace: args.namespace,
        category: args.category.as_deref().map(|c| c.parse::<Category>()).transpose()?,
        status: args.status.as_deref().map(parse_status).transpose()?,
        facets: parse_facets(&args.facets)?,
    };

    let entries = registry.search(&filters).await?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Table => {
            let mut table = create_table();
            table.set_header(vec!["ID", "NAMESPACE", "NAME", "VERSION", "CATEGORY", "STATUS"]);
            for entry in &entries {
                table.add_row(vec![
                    entry.id.to_string(),
                    entry.namespace.clone(),
                    entry.name.clone(),
                    entry.version.to_string(),
                    entry.category.to_string(),
                    format!("{:?}", entry.status),
                ]);
            }
            println!("{table}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_facets_groups_repeated_keys() {
        let facets = parse_facets(&["domain=vision".to_string(), "domain=ml".to_string()]).unwrap();
        assert_eq!(facets.get("domain").unwrap(), &vec!["vision".to_string(), "ml".to_string()]);
    }

    #[test]
    fn parse_facets_rejects_missing_equals() {
        assert!(parse_facets(&["not-a-pair".to_string()]).is_err());
    }

    #[tokio::test]
    async fn search_by_facet_finds_matching_entry() {
        use chrono::Utc;
        use hyperreg::{Entry, EntryId, Gefs};
        use std::collections::{HashMap as StdHashMap, HashSet};
        use tempfile::tempdir;

        let dir = tempdir().unwrap();
        let mut config = RegistryConfig::default();
        config.config_dir = dir.path().to_string_lossy().to_string();
        let registry = crate::store::open(&config).await.unwrap();

        let mut config_field = StdHashMap::new();
        config_field.insert(
            "facets".to_string(),
            serde_json::json!({"domain": ["vision"]}),
        );

        let mut entry = Entry {
            id: EntryId::from("e1"),
            namespace: "a".to_string(),
            name: "b".to_string(),
            version: semver::Version::parse("1.0.0").unwrap(),
            category: Category::Plugins,
            tenant_id: "default".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by: "cli-test".to_string(),
            checksum: String::new(),
            size_bytes: 0,
            data: StdHashMap::new(),
            metadata: StdHashMap::new(),
            specifications: StdHashMap::new(),
            config: config_field,
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
        registry.register(entry).await.unwrap();

        let found = registry
            .search(&SearchFilters {
                facets: parse_facets(&["domain=vision".to_string()]).unwrap(),
                ..SearchFilters::none()
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }
}

//! `reg add` - register a new entry from a JSON file or stdin.

use std::io::Read;

use anyhow::Context;
use clap::Args;
use hyperreg::{Entry, EntryId, RegistryConfig};

use crate::output::print_success;

/// Register a new entry from a JSON file
#[derive(Args)]
pub struct AddArgs {
    /// Path to a JSON entry file, or `-` to read from stdin
    #[arg(default_value = "-")]
    file: String,
}

pub async fn run(args: AddArgs, config: &RegistryConfig) -> anyhow::Result<()> {
    let registry = crate::store::open(config).await?;

    let raw = if args.file == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading entry from stdin")?;
        buf
    } else {
        std::fs::read_to_string(&args.file).with_context(|| format!("reading {}", args.file))?
    };

    let mut entry: Entry =
        serde_json::from_str(&raw).with_context(|| format!("parsing entry from {}", args.file))?;
    if entry.id.0.is_empty() {
        entry.id = EntryId::generate();
    }
    entry.refresh_checksum();

    let registered = registry.register(entry).await?;
    print_success(&format!("registered {}", registered.id));
    println!("{}", serde_json::to_string_pretty(&registered)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hyperreg::{Category, Gefs, SearchFilters, Status};
    use std::collections::{HashMap, HashSet};
    use tempfile::tempdir;

    fn sample_entry_json(id: &str) -> String {
        let entry = Entry {
            id: EntryId::from(id),
            namespace: "cli.tests".to_string(),
            name: "widget".to_string(),
            version: semver::Version::parse("1.0.0").unwrap(),
            category: Category::Components,
            tenant_id: "default".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by: "cli-test".to_string(),
            checksum: String::new(),
            size_bytes: 0,
            data: HashMap::new(),
            metadata: HashMap::new(),
            specifications: HashMap::new(),
            config: HashMap::new(),
            tags: HashSet::new(),
            dependencies: Vec::new(),
            conflicts: HashSet::new(),
            relationships: Vec::new(),
            status: Status::Registered,
            gefs: Gefs::default(),
            hotswap_enabled: false,
            encrypt_payloads: false,
        };
        serde_json::to_string(&entry).unwrap()
    }

    fn test_config(dir: &tempfile::TempDir) -> RegistryConfig {
        let mut config = RegistryConfig::default();
        config.config_dir = dir.path().to_string_lossy().to_string();
        config
    }

    #[tokio::test]
    async fn add_registers_entry_from_file() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);

        let entry_path = dir.path().join("entry.json");
        std::fs::write(&entry_path, sample_entry_json("")).unwrap();

        let args = AddArgs {
            file: entry_path.to_string_lossy().to_string(),
        };
        run(args, &config).await.unwrap();

        let registry = crate::store::open(&config).await.unwrap();
        let all = registry.search(&SearchFilters::none()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].namespace, "cli.tests");
    }

    #[tokio::test]
    async fn add_rejects_malformed_json() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);

        let entry_path = dir.path().join("entry.json");
        std::fs::write(&entry_path, "not json").unwrap();

        let args = AddArgs {
            file: entry_path.to_string_lossy().to_string(),
        };
        assert!(run(args, &config).await.is_err());
    }

    #[tokio::test]
    async fn add_rejects_duplicate_identity() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir);

        let entry_path = dir.path().join("entry.json");
        std::fs::write(&entry_path, sample_entry_json("e1")).unwrap();
        run(
            AddArgs {
                file: entry_path.to_string_lossy().to_string(),
            },
            &config,
        )
        .await
        .unwrap();

        let entry_path_2 = dir.path().join("entry2.json");
        std::fs::write(&entry_path_2, sample_entry_json("e2")).unwrap();
        let err = run(
            AddArgs {
                file: entry_path_2.to_string_lossy().to_string(),
            },
            &config,
        )
        .await
        .unwrap_err();

        let registry_err = err.downcast::<hyperreg::RegistryError>().unwrap();
        assert!(matches!(registry_err, hyperreg::RegistryError::Conflict { .. }));
    }
}

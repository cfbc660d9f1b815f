//! `reg hotswap` - replace a live entry with a verified new version.

use std::io::Read;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use hyperreg::{Entry, EntryId, HotSwapManager, RegistryConfig};

use crate::output::print_success;

/// Hot-swap an entry to a new version with verification
#[derive(Args)]
pub struct HotswapArgs {
    /// Id of the entry being replaced
    entry_id: String,

    /// Path to a JSON file describing the new entry, or `-` for stdin
    #[arg(default_value = "-")]
    file: String,

    /// Seconds to wait for the verify predicate before rolling back
    #[arg(long, default_value_t = 5)]
    verify_deadline_secs: u64,

    /// Seconds to let the outgoing version drain before cutover
    #[arg(long, default_value_t = 0)]
    drain_deadline_secs: u64,
}

pub async fn run(args: HotswapArgs, config: &RegistryConfig) -> anyhow::Result<()> {
    let (registry, bus) = crate::store::open_with_bus(config).await?;
    let manager = HotSwapManager::new(registry, bus);

    let raw = if args.file == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading new entry from stdin")?;
        buf
    } else {
        std::fs::read_to_string(&args.file).with_context(|| format!("reading {}", args.file))?
    };

    let mut new_entry: Entry =
        serde_json::from_str(&raw).with_context(|| format!("parsing entry from {}", args.file))?;
    if new_entry.id.0.is_empty() {
        new_entry.id = EntryId::generate();
    }
    new_entry.refresh_checksum();

    let entry_id = EntryId::from(args.entry_id);
    let transition_id = manager
        .swap(
            entry_id,
            new_entry,
            Box::new(|_entry| true),
            Duration::from_secs(args.verify_deadline_secs),
            Duration::from_secs(args.drain_deadline_secs),
        )
        .await?;

    print_success(&format!("hot-swap {transition_id} complete"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hyperreg::{Category, Gefs, Status};
    use std::collections::{HashMap, HashSet};
    use tempfile::tempdir;

    fn make_entry(id: &str, version: &str) -> Entry {
        let mut entry = Entry {
            id: EntryId::from(id),
            namespace: "cli.tests".to_string(),
            name: "widget".to_string(),
            version: semver::Version::parse(version).unwrap(),
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
            status: Status::Active,
            gefs: Gefs::default(),
            hotswap_enabled: true,
            encrypt_payloads: false,
        };
        entry.refresh_checksum();
        entry
    }

    #[tokio::test]
    async fn hotswap_replaces_entry_with_new_version() {
        let dir = tempdir().unwrap();
        let mut config = RegistryConfig::default();
        config.config_dir = dir.path().to_string_lossy().to_string();

        let registry = crate::store::open(&config).await.unwrap();
        registry.register(make_entry("svc", "1.0.0")).await.unwrap();

        let new_entry = make_entry("svc-v2", "2.0.0");
        let entry_path = dir.path().join("new.json");
        std::fs::write(&entry_path, serde_json::to_string(&new_entry).unwrap()).unwrap();

        run(
            HotswapArgs {
                entry_id: "svc".to_string(),
                file: entry_path.to_string_lossy().to_string(),
                verify_deadline_secs: 1,
                drain_deadline_secs: 0,
            },
            &config,
        )
        .await
        .unwrap();

        let swapped = registry.get(&EntryId::from("svc")).await.unwrap();
        assert_eq!(swapped.version, semver::Version::parse("2.0.0").unwrap());
    }
}

//! `reg propagate` - propagate an update from one entry to a set of targets.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Args;
use hyperreg::{EntryId, PropagationEngine, PropagationMode, RegistryConfig, Rule};

use crate::output::print_success;

/// Propagate an update from one entry to a set of targets
#[derive(Args)]
pub struct PropagateArgs {
    /// Id of the entry the update originates from
    source: String,

    /// Target entry id; repeatable
    #[arg(long = "target", required = true)]
    targets: Vec<String>,

    /// Distribution mode: immediate, eventual, cascade, consensus
    #[arg(long, default_value = "immediate")]
    mode: String,

    /// Update payload as a JSON value
    #[arg(long, default_value = "{}")]
    update: String,

    /// Required agreeing targets for consensus mode
    #[arg(long)]
    quorum: Option<usize>,

    /// Timeout in milliseconds for consensus mode
    #[arg(long, default_value_t = 5_000)]
    timeout_ms: u64,
}

fn parse_mode(s: &str) -> anyhow::Result<PropagationMode> {
    Ok(match s {
        "immediate" => PropagationMode::Immediate,
        "eventual" => PropagationMode::Eventual,
        "cascade" => PropagationMode::Cascade,
        "consensus" => PropagationMode::Consensus,
        other => bail!("unknown propagation mode: {other}"),
    })
}

pub async fn run(args: PropagateArgs, config: &RegistryConfig) -> anyhow::Result<()> {
    let registry = crate::store::open(config).await?;
    let engine = PropagationEngine::new(registry, config.max_inflight_propagation_sessions);

    let source = EntryId::from(args.source);
    let mode = parse_mode(&args.mode)?;
    let update: serde_json::Value =
        serde_json::from_str(&args.update).context("parsing --update as JSON")?;
    let targets: Vec<EntryId> = args.targets.into_iter().map(EntryId::from).collect();

    let mut rules: HashMap<EntryId, Rule> = HashMap::new();
    if mode == PropagationMode::Cascade {
        for target in &targets {
            rules.insert(
                target.clone(),
                Rule {
                    name: "cli-passthrough".to_string(),
                    when: Box::new(|_| true),
                    transform: None,
                    target_filter: None,
                },
            );
        }
    }

    let session_id = engine
        .propagate(
            &source,
            update,
            mode,
            targets,
            &rules,
            args.quorum,
            Duration::from_millis(args.timeout_ms),
        )
        .await?;

    print_success(&format!("propagation session {session_id} started"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mode_accepts_known_values() {
        assert_eq!(parse_mode("immediate").unwrap(), PropagationMode::Immediate);
        assert_eq!(parse_mode("cascade").unwrap(), PropagationMode::Cascade);
        assert!(parse_mode("bogus").is_err());
    }

    #[tokio::test]
    async fn propagate_immediate_reaches_registered_targets() {
        use chrono::Utc;
        use hyperreg::{Category, Entry, Gefs, Status};
        use std::collections::{HashMap as StdHashMap, HashSet};
        use tempfile::tempdir;

        let dir = tempdir().unwrap();
        let mut config = RegistryConfig::default();
        config.config_dir = dir.path().to_string_lossy().to_string();
        let registry = crate::store::open(&config).await.unwrap();

        for id in ["src", "dst"] {
            let mut entry = Entry {
                id: EntryId::from(id),
                namespace: "a".to_string(),
                name: id.to_string(),
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
                config: StdHashMap::new(),
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
        }

        run(
            PropagateArgs {
                source: "src".to_string(),
                targets: vec!["dst".to_string()],
                mode: "immediate".to_string(),
                update: "{}".to_string(),
                quorum: None,
                timeout_ms: 1_000,
            },
            &config,
        )
        .await
        .unwrap();
    }
}

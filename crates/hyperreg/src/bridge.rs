//! Integration Bridge: reconciles externally-discovered entities into
//! registry entries and aggregates a unified status view.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::identity::{Category, Entry, EntryId, Gefs, Status};
use crate::registry::Registry;
use crate::storage::SearchFilters;

/// An externally-discovered entity, produced by a discovery collaborator
/// (environment-variable scan, DNS, port scan, …) outside this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredService {
    /// Orchestrator-local id for this service.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Service type/kind.
    pub service_type: String,
    /// Reachable endpoint (host:port, URL, …).
    pub endpoint: String,
    /// Arbitrary discovery metadata.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl DiscoveredService {
    /// Stable key derived from `sha256(name + type + endpoint)`, used to
    /// find the registry entry this service maps to across discovery
    /// batches, independent of orchestrator-assigned ids.
    pub fn external_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        hasher.update(self.service_type.as_bytes());
        hasher.update(self.endpoint.as_bytes());
        hex::encode(hasher.finalize())
    }
}

struct TrackedService {
    registry_id: EntryId,
    last_seen: DateTime<Utc>,
}

/// Reconciles discovery batches into registry entries.
pub struct IntegrationBridge {
    registry: Arc<Registry>,
    orchestrator_map: DashMap<String, TrackedService>,
    ttl: Duration,
}

impl IntegrationBridge {
    /// Create a bridge over `registry`. Entries unseen in a discovery batch
    /// for longer than `ttl` (default 600s) are marked `Inactive`.
    pub fn new(registry: Arc<Registry>, ttl: Duration) -> Self {
        Self {
            registry,
            orchestrator_map: DashMap::new(),
            ttl,
        }
    }

    /// Default bridge with the spec's 600-second inactivity TTL.
    pub fn with_default_ttl(registry: Arc<Registry>) -> Self {
        Self::new(registry, Duration::from_secs(600))
    }

    /// Reconcile a discovery batch: register new services, update changed
    /// ones, and leave the rest untouched. Call [`IntegrationBridge::sweep_inactive`]
    /// afterward to retire services no longer seen.
    pub async fn reconcile(&self, discovered: &[DiscoveredService]) -> Result<()> {
        for service in discovered {
            let external_key = service.external_key();

            let existing = self
                .registry
                .search(&SearchFilters::none())
                .await?
                .into_iter()
                .find(|e| {
                    e.metadata
                        .get("external_key")
                        .and_then(|v| v.as_str())
                        .is_some_and(|k| k == external_key)
                });

            match existing {
                None => {
                    let entry = self.build_entry(service, &external_key);
                    let registered = self.registry.register(entry).await?;
                    self.orchestrator_map.insert(
                        service.id.clone(),
                        TrackedService {
                            registry_id: registered.id,
                            last_seen: Utc::now(),
                        },
                    );
                }
                Some(mut entry) => {
                    let metadata_changed = entry.metadata.get("endpoint")
                        != Some(&serde_json::Value::String(service.endpoint.clone()));
                    if metadata_changed {
                        entry
                            .metadata
                            .insert("endpoint".to_string(), serde_json::json!(service.endpoint));
                        entry.refresh_checksum();
                        self.registry.update(entry.clone(), false).await?;
                    }
                    self.orchestrator_map.insert(
                        service.id.clone(),
                        TrackedService {
                            registry_id: entry.id,
                            last_seen: Utc::now(),
                        },
                    );
                }
            }
        }

        Ok(())
    }

    fn build_entry(&self, service: &DiscoveredService, external_key: &str) -> Entry {
        let now = Utc::now();
        let mut metadata = service.metadata.clone();
        metadata.insert("external_key".to_string(), serde_json::json!(external_key));
        metadata.insert("endpoint".to_string(), serde_json::json!(service.endpoint));
        metadata.insert("owner_id".to_string(), serde_json::json!("orchestrator"));

        let mut entry = Entry {
            id: EntryId::generate(),
            namespace: "bridge.discovered".to_string(),
            name: service.name.clone(),
            version: semver::Version::new(1, 0, 0),
            category: Category::Service,
            tenant_id: "default".to_string(),
            created_at: now,
            updated_at: now,
            created_by: "orchestrator".to_string(),
            checksum: String::new(),
            size_bytes: 0,
            data: HashMap::new(),
            metadata,
            specifications: HashMap::new(),
            config: HashMap::new(),
            tags: HashSet::new(),
            dependencies: Vec::new(),
            conflicts: HashSet::new(),
            relationships: Vec::new(),
            status: Status::Active,
            gefs: Gefs::default(),
            hotswap_enabled: false,
            encrypt_payloads: false,
        };
        entry.refresh_checksum();
        entry
    }

    /// Transition any tracked service unseen for longer than `ttl` to
    /// `Inactive` (never deleted).
    pub async fn sweep_inactive(&self) -> Result<usize> {
        let now = Utc::now();
        let mut swept = 0;

        let stale: Vec<_> = self
            .orchestrator_map
            .iter()
            .filter(|entry| {
                now.signed_duration_since(entry.value().last_seen)
                    .to_std()
                    .unwrap_or_default()
                    >= self.ttl
            })
            .map(|entry| entry.value().registry_id.clone())
            .collect();

        for registry_id in stale {
            if let Ok(mut entry) = self.registry.get(&registry_id).await {
                if entry.status != Status::Inactive {
                    entry.status = Status::Inactive;
                    self.registry.update(entry, false).await?;
                    swept += 1;
                }
            }
        }

        Ok(swept)
    }

    /// Spawn a periodic background sweep.
    pub fn spawn_sweep_loop(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let bridge = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(err) = bridge.sweep_inactive().await {
                    tracing::warn!(error = %err, "integration bridge sweep failed");
                }
            }
        })
    }

    /// A read-only aggregate suitable for health endpoints.
    pub async fn get_unified_status(&self) -> Result<UnifiedStatus> {
        let all = self.registry.search(&SearchFilters::none()).await?;
        let categories: HashSet<String> = all.iter().map(|e| e.category.to_string()).collect();

        Ok(UnifiedStatus {
            bridge_synced_components: self.orchestrator_map.len(),
            orchestrator_services_discovered: self.orchestrator_map.len(),
            registry_total_entries: all.len(),
            registry_categories: categories.into_iter().collect(),
            timestamp: Utc::now(),
        })
    }
}

/// Unified status aggregate returned by [`IntegrationBridge::get_unified_status`].
#[derive(Debug, Clone, Serialize)]
pub struct UnifiedStatus {
    /// Number of services the bridge currently tracks as synced.
    pub bridge_synced_components: usize,
    /// Number of services seen in the most recent discovery batches.
    pub orchestrator_services_discovered: usize,
    /// Total entries across the registry.
    pub registry_total_entries: usize,
    /// Distinct categories present in the registry.
    pub registry_categories: Vec<String>,
    /// When this status was computed.
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Bus;
    use crate::storage::InMemoryStorage;

    async fn test_bridge() -> (Arc<Registry>, IntegrationBridge) {
        let storage: Arc<dyn crate::storage::StorageBackend> = Arc::new(InMemoryStorage::new());
        let bus = Arc::new(Bus::new(1024));
        let registry = Arc::new(Registry::new(storage, bus, 1000));
        let bridge = IntegrationBridge::new(registry.clone(), Duration::from_millis(5));
        (registry, bridge)
    }

    fn sample_service(id: &str) -> DiscoveredService {
        DiscoveredService {
            id: id.to_string(),
            name: "auth-svc".to_string(),
            service_type: "grpc".to_string(),
            endpoint: "10.0.0.1:8080".to_string(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn reconcile_registers_new_service() {
        let (registry, bridge) = test_bridge().await;
        bridge.reconcile(&[sample_service("svc-1")]).await.unwrap();

        let all = registry.search(&SearchFilters::none()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].category, Category::Service);
    }

    #[tokio::test]
    async fn reconcile_is_idempotent_for_same_external_key() {
        let (registry, bridge) = test_bridge().await;
        bridge.reconcile(&[sample_service("svc-1")]).await.unwrap();
        bridge.reconcile(&[sample_service("svc-1")]).await.unwrap();

        let all = registry.search(&SearchFilters::none()).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn sweep_marks_unseen_services_inactive() {
        let (registry, bridge) = test_bridge().await;
        bridge.reconcile(&[sample_service("svc-1")]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let swept = bridge.sweep_inactive().await.unwrap();
        assert_eq!(swept, 1);

        let all = registry.search(&SearchFilters::none()).await.unwrap();
        assert_eq!(all[0].status, Status::Inactive);
    }

    #[tokio::test]
    async fn unified_status_reports_counts() {
        let (_, bridge) = test_bridge().await;
        bridge.reconcile(&[sample_service("svc-1")]).await.unwrap();
        let status = bridge.get_unified_status().await.unwrap();
        assert_eq!(status.registry_total_entries, 1);
        assert_eq!(status.bridge_synced_components, 1);
    }
}

//! Registry Core: CRUD, dependency resolution, cache, hooks, stats.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::bus::{Bus, ChangeEvent, ChangeKind};
use crate::error::{RegistryError, Result};
use crate::identity::entry::transition_allowed;
use crate::identity::{validate, Entry, EntryId, Status};
use crate::storage::{SearchFilters, StorageBackend};

/// A hook function invoked at a named point in an operation's lifecycle.
pub type Hook = Arc<dyn Fn(&Entry) -> Result<()> + Send + Sync>;

/// The six named hook points. Hooks on `Before*` points run before the
/// mutation and may abort it by returning an error; hooks on `After*`
/// points run after and are logged-and-swallowed on error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    BeforeRegister,
    AfterRegister,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
}

#[derive(Default)]
struct Hooks {
    before_register: Vec<Hook>,
    after_register: Vec<Hook>,
    before_update: Vec<Hook>,
    after_update: Vec<Hook>,
    before_delete: Vec<Hook>,
    after_delete: Vec<Hook>,
}

/// Aggregate operational statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RegistryStats {
    /// Total successful registrations over the registry's lifetime.
    pub total_registered: u64,
    /// Entries currently in `Active` status.
    pub total_active: u64,
    /// Total `search`/`get` queries served.
    pub total_queries: u64,
    /// Running average query latency in milliseconds.
    pub avg_query_time_ms: f64,
    /// Cache hits.
    pub cache_hits: u64,
    /// Cache misses.
    pub cache_misses: u64,
}

struct StatsInner {
    total_registered: AtomicU64,
    total_queries: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    query_time_total_ms: Mutex<f64>,
}

impl Default for StatsInner {
    fn default() -> Self {
        Self {
            total_registered: AtomicU64::new(0),
            total_queries: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            query_time_total_ms: Mutex::new(0.0),
        }
    }
}

impl StatsInner {
    fn record_query(&self, elapsed_ms: f64) {
        let count = self.total_queries.fetch_add(1, Ordering::Relaxed) + 1;
        let mut total = self.query_time_total_ms.lock();
        *total += elapsed_ms;
        let _ = count;
    }

    fn snapshot(&self, total_active: u64) -> RegistryStats {
        let queries = self.total_queries.load(Ordering::Relaxed);
        let total_time = *self.query_time_total_ms.lock();
        RegistryStats {
            total_registered: self.total_registered.load(Ordering::Relaxed),
            total_active,
            total_queries: queries,
            avg_query_time_ms: if queries == 0 {
                0.0
            } else {
                total_time / queries as f64
            },
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }
}

/// The Registry Core: the single owner of every entry by id.
pub struct Registry {
    storage: Arc<dyn StorageBackend>,
    bus: Arc<Bus>,
    cache: RwLock<LruCache<EntryId, Entry>>,
    hooks: RwLock<Hooks>,
    stats: StatsInner,
}

impl Registry {
    /// Build a registry over `storage`, publishing change events on `bus`.
    /// `cache_capacity` bounds the read-through LRU cache
    /// (`RegistryConfig::max_cache_entries`).
    pub fn new(storage: Arc<dyn StorageBackend>, bus: Arc<Bus>, cache_capacity: usize) -> Self {
        let capacity = std::num::NonZeroUsize::new(cache_capacity.max(1)).unwrap();
        Self {
            storage,
            bus,
            cache: RwLock::new(LruCache::new(capacity)),
            hooks: RwLock::new(Hooks::default()),
            stats: StatsInner::default(),
        }
    }

    /// Register a hook at `point`. Hooks run in registration order.
    pub async fn add_hook(&self, point: HookPoint, hook: Hook) {
        let mut hooks = self.hooks.write().await;
        match point {
            HookPoint::BeforeRegister => hooks.before_register.push(hook),
            HookPoint::AfterRegister => hooks.after_register.push(hook),
            HookPoint::BeforeUpdate => hooks.before_update.push(hook),
            HookPoint::AfterUpdate => hooks.after_update.push(hook),
            HookPoint::BeforeDelete => hooks.before_delete.push(hook),
            HookPoint::AfterDelete => hooks.after_delete.push(hook),
        }
    }

    async fn run_before(&self, hooks: &[Hook], entry: &Entry) -> Result<()> {
        for hook in hooks {
            hook(entry)?;
        }
        Ok(())
    }

    async fn run_after(&self, hooks: &[Hook], entry: &Entry) {
        for hook in hooks {
            if let Err(err) = hook(entry) {
                tracing::warn!(error = %err, entry_id = %entry.id, "after-hook failed, continuing");
            }
        }
    }

    /// Register a new entry.
    ///
    /// Validates, checks the `dependencies ∩ conflicts = ∅` invariant, runs
    /// `before_register` hooks, persists, caches, runs `after_register`
    /// hooks, and publishes a `CREATED` change event.
    pub async fn register(&self, entry: Entry) -> Result<Entry> {
        let request_id = Uuid::new_v4();
        let issues = validate(&entry);
        if let Some(issue) = issues.first() {
            return Err(RegistryError::validation(
                issue.field.clone(),
                issue.reason.clone(),
                request_id,
            ));
        }

        let hooks = self.hooks.read().await;
        self.run_before(&hooks.before_register, &entry).await?;
        drop(hooks);

        self.storage.save(entry.clone()).await?;
        self.cache.write().await.put(entry.id.clone(), entry.clone());
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);

        let hooks = self.hooks.read().await;
        self.run_after(&hooks.after_register, &entry).await;
        drop(hooks);

        self.bus
            .publish(ChangeEvent::new(ChangeKind::Created, entry.clone()))
            .await;

        Ok(entry)
    }

    /// Cache-then-storage lookup.
    pub async fn get(&self, id: &EntryId) -> Result<Entry> {
        let started = std::time::Instant::now();

        if let Some(entry) = self.cache.write().await.get(id).cloned() {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            self.stats.record_query(started.elapsed().as_secs_f64() * 1000.0);
            return Ok(entry);
        }

        self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);
        let entry = self.storage.load(id).await?;
        self.cache.write().await.put(id.clone(), entry.clone());
        self.stats.record_query(started.elapsed().as_secs_f64() * 1000.0);
        Ok(entry)
    }

    /// Delegate to storage, returning materialized entries.
    pub async fn search(&self, filters: &SearchFilters) -> Result<Vec<Entry>> {
        let started = std::time::Instant::now();
        let results = self.storage.search(filters).await?;
        self.stats.record_query(started.elapsed().as_secs_f64() * 1000.0);
        Ok(results)
    }

    /// Update an existing entry.
    ///
    /// Rejects version downgrades unless `allow_downgrade` is set.
    pub async fn update(&self, mut entry: Entry, allow_downgrade: bool) -> Result<Entry> {
        let request_id = Uuid::new_v4();
        let existing = self.storage.load(&entry.id).await?;

        if !allow_downgrade && entry.version < existing.version {
            return Err(RegistryError::validation(
                "version",
                format!(
                    "downgrade from {} to {} requires allow_downgrade",
                    existing.version, entry.version
                ),
                request_id,
            ));
        }

        if !transition_allowed(existing.status, entry.status) {
            return Err(RegistryError::validation(
                "status",
                format!("transition {:?} -> {:?} is not allowed", existing.status, entry.status),
                request_id,
            ));
        }

        entry.created_at = existing.created_at;
        entry.updated_at = Utc::now();
        entry.refresh_checksum();

        let issues = validate(&entry);
        if let Some(issue) = issues.first() {
            return Err(RegistryError::validation(
                issue.field.clone(),
                issue.reason.clone(),
                request_id,
            ));
        }

        let hooks = self.hooks.read().await;
        self.run_before(&hooks.before_update, &entry).await?;
        drop(hooks);

        self.storage.save(entry.clone()).await?;
        self.cache.write().await.put(entry.id.clone(), entry.clone());

        let hooks = self.hooks.read().await;
        self.run_after(&hooks.after_update, &entry).await;
        drop(hooks);

        self.bus
            .publish(ChangeEvent::new(ChangeKind::Updated, entry.clone()))
            .await;

        Ok(entry)
    }

    /// Delete an entry. Fails with [`RegistryError::DependentsExist`] unless
    /// `force` is set and dependents exist.
    pub async fn delete(&self, id: &EntryId, force: bool) -> Result<()> {
        let request_id = Uuid::new_v4();
        let entry = self.storage.load(id).await?;

        if !force {
            let dependents = self.find_dependents(id).await?;
            if !dependents.is_empty() {
                return Err(RegistryError::DependentsExist {
                    id: id.to_string(),
                    dependents: dependents.len(),
                    request_id,
                });
            }
        }

        let hooks = self.hooks.read().await;
        self.run_before(&hooks.before_delete, &entry).await?;
        drop(hooks);

        self.storage.delete(id).await?;
        self.cache.write().await.pop(id);

        let hooks = self.hooks.read().await;
        self.run_after(&hooks.after_delete, &entry).await;
        drop(hooks);

        self.bus
            .publish(ChangeEvent::new(ChangeKind::Deleted, entry))
            .await;

        Ok(())
    }

    async fn find_dependents(&self, id: &EntryId) -> Result<Vec<EntryId>> {
        let all = self.storage.search(&SearchFilters::none()).await?;
        Ok(all
            .into_iter()
            .filter(|e| e.dependencies.contains(id))
            .map(|e| e.id)
            .collect())
    }

    /// Transitive closure of `dependencies`, depth-first, with cycle
    /// detection. Duplicates are deduped by id.
    pub async fn resolve_dependencies(&self, id: &EntryId) -> Result<Vec<EntryId>> {
        let request_id = Uuid::new_v4();
        let mut resolved = Vec::new();
        let mut seen = HashSet::new();
        let mut path = Vec::new();
        self.resolve_dependencies_inner(id, &mut resolved, &mut seen, &mut path, request_id)
            .await?;
        Ok(resolved)
    }

    fn resolve_dependencies_inner<'a>(
        &'a self,
        id: &'a EntryId,
        resolved: &'a mut Vec<EntryId>,
        seen: &'a mut HashSet<EntryId>,
        path: &'a mut Vec<EntryId>,
        request_id: Uuid,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if path.contains(id) {
                let mut cycle_path = path.clone();
                cycle_path.push(id.clone());
                return Err(RegistryError::Cycle {
                    path: cycle_path
                        .iter()
                        .map(|i| i.to_string())
                        .collect::<Vec<_>>()
                        .join(" -> "),
                    request_id,
                });
            }

            let entry = self.storage.load(id).await?;
            path.push(id.clone());

            for dep in &entry.dependencies {
                if seen.insert(dep.clone()) {
                    resolved.push(dep.clone());
                }
                self.resolve_dependencies_inner(dep, resolved, seen, path, request_id)
                    .await?;
            }

            path.pop();
            Ok(())
        })
    }

    /// Snapshot of operational statistics.
    pub async fn stats(&self) -> Result<RegistryStats> {
        let active = self
            .storage
            .count(&SearchFilters {
                status: Some(Status::Active),
                ..SearchFilters::none()
            })
            .await?;
        Ok(self.stats.snapshot(active as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Category, Gefs};
    use crate::storage::InMemoryStorage;
    use std::collections::{HashMap, HashSet as StdHashSet};

    fn make_entry(id: &str, namespace: &str, name: &str, version: &str) -> Entry {
        let mut entry = Entry {
            id: EntryId::from(id),
            namespace: namespace.to_string(),
            name: name.to_string(),
            version: semver::Version::parse(version).unwrap(),
            category: Category::Plugins,
            tenant_id: "default".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by: "test".to_string(),
            checksum: String::new(),
            size_bytes: 0,
            data: HashMap::new(),
            metadata: HashMap::new(),
            specifications: HashMap::new(),
            config: HashMap::new(),
            tags: StdHashSet::new(),
            dependencies: Vec::new(),
            conflicts: StdHashSet::new(),
            relationships: Vec::new(),
            status: Status::Registered,
            gefs: Gefs::default(),
            hotswap_enabled: false,
            encrypt_payloads: false,
        };
        entry.refresh_checksum();
        entry
    }

    fn test_registry() -> Registry {
        let storage: Arc<dyn StorageBackend> = Arc::new(InMemoryStorage::new());
        let bus = Arc::new(Bus::new(1024));
        Registry::new(storage, bus, 1000)
    }

    #[tokio::test]
    async fn register_then_get_round_trips() {
        let registry = test_registry();
        let entry = make_entry("e1", "a", "b", "1.0.0");
        registry.register(entry.clone()).await.unwrap();
        let fetched = registry.get(&entry.id).await.unwrap();
        assert_eq!(fetched.id, entry.id);
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let registry = test_registry();
        registry.register(make_entry("e1", "a", "b", "1.0.0")).await.unwrap();
        let err = registry
            .register(make_entry("e2", "a", "b", "1.0.0"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Conflict { .. }));
    }

    #[tokio::test]
    async fn delete_with_dependent_requires_force() {
        let registry = test_registry();
        let e1 = make_entry("e1", "a", "b", "1.0.0");
        registry.register(e1.clone()).await.unwrap();

        let mut e2 = make_entry("e2", "a", "c", "1.0.0");
        e2.dependencies.push(e1.id.clone());
        e2.refresh_checksum();
        registry.register(e2).await.unwrap();

        let err = registry.delete(&e1.id, false).await.unwrap_err();
        assert!(matches!(err, RegistryError::DependentsExist { .. }));

        registry.delete(&e1.id, true).await.unwrap();
        assert!(registry.get(&e1.id).await.is_err());
    }

    #[tokio::test]
    async fn cycle_detection_reports_path() {
        let registry = test_registry();
        let mut a = make_entry("a", "ns", "a", "1.0.0");
        let mut b = make_entry("b", "ns", "b", "1.0.0");
        let mut c = make_entry("c", "ns", "c", "1.0.0");
        a.dependencies.push(EntryId::from("b"));
        b.dependencies.push(EntryId::from("c"));
        c.dependencies.push(EntryId::from("a"));
        a.refresh_checksum();
        b.refresh_checksum();
        c.refresh_checksum();

        registry.register(a.clone()).await.unwrap();
        registry.register(b).await.unwrap();
        registry.register(c).await.unwrap();

        let err = registry.resolve_dependencies(&a.id).await.unwrap_err();
        assert!(matches!(err, RegistryError::Cycle { .. }));
    }

    #[tokio::test]
    async fn version_downgrade_is_rejected_without_flag() {
        let registry = test_registry();
        let entry = make_entry("e1", "a", "b", "2.0.0");
        registry.register(entry.clone()).await.unwrap();

        let mut downgraded = entry.clone();
        downgraded.version = semver::Version::parse("1.0.0").unwrap();
        downgraded.refresh_checksum();

        let err = registry.update(downgraded.clone(), false).await.unwrap_err();
        assert!(matches!(err, RegistryError::Validation { .. }));

        registry.update(downgraded, true).await.unwrap();
    }
}

//! Hot-Swap Manager: zero-downtime version replacement with rollback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use semver::Version;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::bus::{Bus, ChangeEvent, ChangeKind};
use crate::error::{RegistryError, Result};
use crate::identity::{Entry, EntryId, Status};
use crate::registry::Registry;

/// Phase of an in-flight hot-swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HotSwapPhase {
    Staging,
    Draining,
    Switching,
    Verifying,
    Done,
    RolledBack,
}

/// A tracked version transition for one entry.
#[derive(Debug, Clone, Serialize)]
pub struct HotSwapTransition {
    /// The (stable) alias entry id being transitioned.
    pub entry_id: EntryId,
    /// Version being replaced.
    pub from_version: Version,
    /// Version being promoted.
    pub to_version: Version,
    /// Current phase.
    pub phase: HotSwapPhase,
    /// When the swap started.
    pub started_at: DateTime<Utc>,
    /// When the swap reached a terminal phase, if it has.
    pub completed_at: Option<DateTime<Utc>>,
    /// Version the alias rolled back to, if rollback occurred.
    pub rollback_version: Option<Version>,
}

/// A health predicate evaluated during `VERIFYING`. Returns `true` if the
/// new entry is healthy and the swap should proceed to `DONE`.
pub type VerifyPredicate = Box<dyn Fn(&Entry) -> bool + Send + Sync>;

/// Manages hot-swaps, serializing concurrent swap requests per entry id.
pub struct HotSwapManager {
    registry: Arc<Registry>,
    bus: Arc<Bus>,
    locks: DashMap<EntryId, Arc<Mutex<()>>>,
    transitions: DashMap<Uuid, HotSwapTransition>,
    rollbacks_total: AtomicU64,
}

impl HotSwapManager {
    /// Create a manager operating over `registry`, publishing
    /// `HOTSWAP_ROLLBACK` events on `bus`.
    pub fn new(registry: Arc<Registry>, bus: Arc<Bus>) -> Self {
        Self {
            registry,
            bus,
            locks: DashMap::new(),
            transitions: DashMap::new(),
            rollbacks_total: AtomicU64::new(0),
        }
    }

    fn lock_for(&self, entry_id: &EntryId) -> Arc<Mutex<()>> {
        self.locks
            .entry(entry_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Total rollbacks across the manager's lifetime, surfaced in registry
    /// stats.
    pub fn rollbacks_total(&self) -> u64 {
        self.rollbacks_total.load(Ordering::Relaxed)
    }

    /// Execute a hot-swap of `entry_id` from its current version to
    /// `new_entry`'s version. Additional requests for the same `entry_id`
    /// queue behind the per-id lock.
    pub async fn swap(
        &self,
        entry_id: EntryId,
        new_entry: Entry,
        verify: VerifyPredicate,
        verify_deadline: Duration,
        drain_deadline: Duration,
    ) -> Result<Uuid> {
        let lock = self.lock_for(&entry_id);
        let _guard = lock.lock().await;

        let transition_id = Uuid::new_v4();
        let old_entry = self.registry.get(&entry_id).await?;

        let mut transition = HotSwapTransition {
            entry_id: entry_id.clone(),
            from_version: old_entry.version.clone(),
            to_version: new_entry.version.clone(),
            phase: HotSwapPhase::Staging,
            started_at: Utc::now(),
            completed_at: None,
            rollback_version: None,
        };

        // STAGING: persist the new entry as a sibling, validated.
        let mut staged = new_entry;
        staged.status = Status::Registered;
        let staged = self.registry.register(staged).await?;
        self.transitions.insert(transition_id, transition.clone());

        // DRAINING: old entry drains, subscribers notified, outstanding ops
        // given a deadline to complete.
        transition.phase = HotSwapPhase::Draining;
        self.transitions.insert(transition_id, transition.clone());
        let mut draining_old = old_entry.clone();
        draining_old.status = Status::Draining;
        self.registry.update(draining_old, false).await?;
        tokio::time::sleep(drain_deadline).await;

        // SWITCHING: atomic cutover. The alias is represented by the old
        // entry id now pointing at the new version's payload. `staged` is
        // retired first so its (namespace, name, version) identity key is
        // free for the alias to claim; the struct is kept in memory to
        // drive VERIFYING and, on rollback, to re-register as FAILED.
        transition.phase = HotSwapPhase::Switching;
        self.transitions.insert(transition_id, transition.clone());
        self.registry.delete(&staged.id, true).await?;
        let mut cutover = staged.clone();
        cutover.id = entry_id.clone();
        cutover.status = Status::Active;
        self.registry.update(cutover, true).await?;

        // VERIFYING: run the health predicate.
        transition.phase = HotSwapPhase::Verifying;
        self.transitions.insert(transition_id, transition.clone());
        let verified = tokio::time::timeout(verify_deadline, async { verify(&staged) })
            .await
            .unwrap_or(false);

        if verified {
            transition.phase = HotSwapPhase::Done;
            transition.completed_at = Some(Utc::now());
            self.transitions.insert(transition_id, transition.clone());
            self.locks.remove(&entry_id);
            return Ok(transition_id);
        }

        // ROLLED_BACK: alias reverts, new entry marked FAILED.
        let mut reverted = old_entry.clone();
        reverted.status = Status::Active;
        self.registry.update(reverted, true).await?;

        // `staged` was deleted in SWITCHING to free its identity key for
        // the cutover, so it's re-registered here rather than updated.
        let mut failed_new = staged.clone();
        failed_new.status = Status::Failed;
        self.registry.register(failed_new.clone()).await?;

        transition.phase = HotSwapPhase::RolledBack;
        transition.completed_at = Some(Utc::now());
        transition.rollback_version = Some(old_entry.version.clone());
        self.transitions.insert(transition_id, transition.clone());
        self.rollbacks_total.fetch_add(1, Ordering::Relaxed);

        self.bus
            .publish(ChangeEvent::new(ChangeKind::Updated, failed_new))
            .await;

        self.locks.remove(&entry_id);

        Err(RegistryError::HotSwapAborted {
            entry_id: entry_id.to_string(),
            reason: "verification failed within deadline".to_string(),
        })
    }

    /// Look up a transition by id.
    pub fn get_transition(&self, id: Uuid) -> Option<HotSwapTransition> {
        self.transitions.get(&id).map(|t| t.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Category, Gefs};
    use crate::storage::InMemoryStorage;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc as StdArc;

    fn make_entry(id: &str, version: &str, status: Status) -> Entry {
        let mut entry = Entry {
            id: EntryId::from(id),
            namespace: "nx".to_string(),
            name: "x".to_string(),
            version: Version::parse(version).unwrap(),
            category: Category::Components,
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
            tags: HashSet::new(),
            dependencies: Vec::new(),
            conflicts: HashSet::new(),
            relationships: Vec::new(),
            status,
            gefs: Gefs::default(),
            hotswap_enabled: true,
            encrypt_payloads: false,
        };
        entry.refresh_checksum();
        entry
    }

    async fn test_setup() -> (StdArc<Registry>, HotSwapManager) {
        let storage: StdArc<dyn crate::storage::StorageBackend> =
            StdArc::new(InMemoryStorage::new());
        let bus = StdArc::new(Bus::new(1024));
        let registry = StdArc::new(Registry::new(storage, bus.clone(), 1000));
        let manager = HotSwapManager::new(registry.clone(), bus);
        (registry, manager)
    }

    #[tokio::test]
    async fn successful_verify_completes_swap() {
        let (registry, manager) = test_setup().await;
        let old = make_entry("x", "1.0.0", Status::Active);
        registry.register(old.clone()).await.unwrap();

        let new_entry = make_entry("x-2", "2.0.0", Status::Registered);
        let transition_id = manager
            .swap(
                old.id.clone(),
                new_entry,
                Box::new(|_| true),
                Duration::from_millis(50),
                Duration::from_millis(0),
            )
            .await
            .unwrap();

        let transition = manager.get_transition(transition_id).unwrap();
        assert_eq!(transition.phase, HotSwapPhase::Done);

        let current = registry.get(&old.id).await.unwrap();
        assert_eq!(current.version, Version::parse("2.0.0").unwrap());
    }

    #[tokio::test]
    async fn cutover_releases_staged_and_old_version_identity_keys() {
        let (registry, manager) = test_setup().await;
        let old = make_entry("x", "1.0.0", Status::Active);
        registry.register(old.clone()).await.unwrap();

        let new_entry = make_entry("x-2", "2.0.0", Status::Registered);
        manager
            .swap(
                old.id.clone(),
                new_entry,
                Box::new(|_| true),
                Duration::from_millis(50),
                Duration::from_millis(0),
            )
            .await
            .unwrap();

        // the staged id no longer exists: its row was retired for cutover.
        assert!(registry.get(&EntryId::from("x-2")).await.is_err());

        // both the staged entry's (nx, x, 2.0.0) key and the alias's own
        // prior (nx, x, 1.0.0) key must be free, not squatted by "x".
        let reused_staged_identity = make_entry("x-3", "2.0.0", Status::Registered);
        registry.register(reused_staged_identity).await.unwrap();

        let reused_old_identity = make_entry("x-4", "1.0.0", Status::Registered);
        registry.register(reused_old_identity).await.unwrap();
    }

    #[tokio::test]
    async fn failing_verify_rolls_back_and_marks_failed() {
        let (registry, manager) = test_setup().await;
        let old = make_entry("x", "1.0.0", Status::Active);
        registry.register(old.clone()).await.unwrap();

        let new_entry = make_entry("x-2", "2.0.0", Status::Registered);
        let err = manager
            .swap(
                old.id.clone(),
                new_entry,
                Box::new(|_| false),
                Duration::from_millis(50),
                Duration::from_millis(0),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::HotSwapAborted { .. }));
        assert_eq!(manager.rollbacks_total(), 1);

        let current = registry.get(&old.id).await.unwrap();
        assert_eq!(current.version, Version::parse("1.0.0").unwrap());
        assert_eq!(current.status, Status::Active);

        let failed = registry.get(&EntryId::from("x-2")).await.unwrap();
        assert_eq!(failed.status, Status::Failed);
    }
}

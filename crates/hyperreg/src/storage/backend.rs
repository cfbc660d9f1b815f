//! The durable storage contract and its two shipped backends.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{RegistryError, Result};
use crate::identity::{Category, Entry, EntryId, Status};
use crate::storage::facets::{FacetIndex, FacetQuery};

/// Equality + facet filters accepted by [`StorageBackend::search`] and
/// [`StorageBackend::count`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Exact namespace match.
    pub namespace: Option<String>,
    /// Exact category match.
    pub category: Option<Category>,
    /// Exact status match.
    pub status: Option<Status>,
    /// Facet filters: AND across keys, OR within a key's value list.
    pub facets: FacetQuery,
}

impl SearchFilters {
    /// A filter set that matches every entry.
    pub fn none() -> Self {
        Self::default()
    }

    fn matches(&self, entry: &Entry) -> bool {
        if let Some(namespace) = &self.namespace {
            if &entry.namespace != namespace {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if entry.category != *category {
                return false;
            }
        }
        if let Some(status) = &self.status {
            if entry.status != *status {
                return false;
            }
        }
        true
    }
}

/// A point-in-time export of the whole store, written by
/// [`StorageBackend::export_json`].
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot format version.
    pub version: u32,
    /// When the snapshot was taken.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// All entries, by id.
    pub entries: HashMap<EntryId, Entry>,
    /// Facet rows, by entry id.
    pub facets: HashMap<EntryId, Vec<(String, String)>>,
}

/// Durable storage contract. Every mutating call is atomic with respect to
/// the facet index: a `save` rewrites facet rows for that entry in the same
/// critical section, never leaving the index stale mid-call.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Upsert an entry by id. Fails with [`RegistryError::Conflict`] if a
    /// *different* id already occupies the same `(namespace, name, version)`.
    async fn save(&self, entry: Entry) -> Result<()>;

    /// Load an entry by id, or [`RegistryError::NotFound`].
    async fn load(&self, id: &EntryId) -> Result<Entry>;

    /// Search entries by equality and facet filters. Results are returned
    /// in insertion order.
    async fn search(&self, filters: &SearchFilters) -> Result<Vec<Entry>>;

    /// Delete an entry and cascade-delete its facet rows.
    async fn delete(&self, id: &EntryId) -> Result<()>;

    /// Count entries matching `filters` without materializing them.
    async fn count(&self, filters: &SearchFilters) -> Result<usize>;

    /// Write an atomic snapshot of the whole store to `path`.
    async fn export_json(&self, path: &Path) -> Result<()>;
}

struct Inner {
    entries: HashMap<EntryId, Entry>,
    by_identity: HashMap<(String, String, String), EntryId>,
    facets: FacetIndex,
    insertion_order: Vec<EntryId>,
}

impl Inner {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            by_identity: HashMap::new(),
            facets: FacetIndex::new(),
            insertion_order: Vec::new(),
        }
    }

    fn identity_key(entry: &Entry) -> (String, String, String) {
        (
            entry.namespace.clone(),
            entry.name.clone(),
            entry.version.to_string(),
        )
    }

    fn insert(&mut self, entry: Entry) -> Result<()> {
        let key = Self::identity_key(&entry);
        if let Some(existing_id) = self.by_identity.get(&key) {
            if existing_id != &entry.id {
                return Err(RegistryError::Conflict {
                    namespace: entry.namespace.clone(),
                    name: entry.name.clone(),
                    version: entry.version.to_string(),
                    request_id: Uuid::new_v4(),
                });
            }
        }

        // An id that changes (namespace, name, version) — e.g. a version
        // bump in place — must release its previous identity-key row, or
        // that triple stays permanently squatted by this id.
        if let Some(previous) = self.entries.get(&entry.id) {
            let previous_key = Self::identity_key(previous);
            if previous_key != key {
                self.by_identity.remove(&previous_key);
            }
        }

        if !self.entries.contains_key(&entry.id) {
            self.insertion_order.push(entry.id.clone());
        }

        self.by_identity.insert(key, entry.id.clone());
        self.facets.rewrite(&entry.id, &entry.derived_facets());
        self.entries.insert(entry.id.clone(), entry);
        Ok(())
    }

    fn remove(&mut self, id: &EntryId) -> Result<()> {
        let entry = self
            .entries
            .remove(id)
            .ok_or_else(|| RegistryError::not_found(id.to_string(), Uuid::new_v4()))?;
        self.by_identity.remove(&Self::identity_key(&entry));
        self.facets.remove_entry(id);
        self.insertion_order.retain(|existing| existing != id);
        Ok(())
    }

    fn search(&self, filters: &SearchFilters) -> Vec<Entry> {
        let facet_matches = if filters.facets.is_empty() {
            None
        } else {
            Some(self.facets.query(&filters.facets))
        };

        self.insertion_order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .filter(|entry| filters.matches(entry))
            .filter(|entry| match &facet_matches {
                Some(ids) => ids.contains(&entry.id),
                None => true,
            })
            .cloned()
            .collect()
    }
}

/// In-memory storage backend. Used for tests and single-node deployments.
pub struct InMemoryStorage {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::new())),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn save(&self, entry: Entry) -> Result<()> {
        self.inner.write().await.insert(entry)
    }

    async fn load(&self, id: &EntryId) -> Result<Entry> {
        self.inner
            .read()
            .await
            .entries
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::not_found(id.to_string(), Uuid::new_v4()))
    }

    async fn search(&self, filters: &SearchFilters) -> Result<Vec<Entry>> {
        Ok(self.inner.read().await.search(filters))
    }

    async fn delete(&self, id: &EntryId) -> Result<()> {
        self.inner.write().await.remove(id)
    }

    async fn count(&self, filters: &SearchFilters) -> Result<usize> {
        Ok(self.inner.read().await.search(filters).len())
    }

    async fn export_json(&self, path: &Path) -> Result<()> {
        let inner = self.inner.read().await;
        let snapshot = Snapshot {
            version: 1,
            timestamp: chrono::Utc::now(),
            entries: inner.entries.clone(),
            facets: inner.facets.snapshot(),
        };
        write_snapshot_atomically(path, &snapshot).await
    }
}

/// Filesystem-backed storage: one JSON file per entry under
/// `{base_dir}/entries/`, with the facet index held in memory and rebuilt
/// from disk at construction time.
pub struct FilesystemStorage {
    base_dir: PathBuf,
    inner: Arc<RwLock<Inner>>,
}

impl FilesystemStorage {
    /// Open (or create) a filesystem store rooted at `base_dir`.
    pub async fn open(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        let entries_dir = base_dir.join("entries");
        tokio::fs::create_dir_all(&entries_dir).await?;

        let mut inner = Inner::new();
        let mut read_dir = tokio::fs::read_dir(&entries_dir).await?;
        while let Some(file) = read_dir.next_entry().await? {
            if file.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(file.path()).await?;
            let entry: Entry = serde_json::from_slice(&bytes)?;
            inner.insert(entry)?;
        }

        Ok(Self {
            base_dir,
            inner: Arc::new(RwLock::new(inner)),
        })
    }

    fn entry_path(&self, id: &EntryId) -> PathBuf {
        self.base_dir.join("entries").join(format!("{}.json", id.0))
    }

    async fn write_entry_file(&self, entry: &Entry) -> Result<()> {
        let path = self.entry_path(&entry.id);
        write_atomically(&path, &serde_json::to_vec_pretty(entry)?).await
    }
}

#[async_trait]
impl StorageBackend for FilesystemStorage {
    async fn save(&self, entry: Entry) -> Result<()> {
        self.write_entry_file(&entry).await?;
        self.inner.write().await.insert(entry)
    }

    async fn load(&self, id: &EntryId) -> Result<Entry> {
        self.inner
            .read()
            .await
            .entries
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::not_found(id.to_string(), Uuid::new_v4()))
    }

    async fn search(&self, filters: &SearchFilters) -> Result<Vec<Entry>> {
        Ok(self.inner.read().await.search(filters))
    }

    async fn delete(&self, id: &EntryId) -> Result<()> {
        self.inner.write().await.remove(id)?;
        let path = self.entry_path(id);
        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }

    async fn count(&self, filters: &SearchFilters) -> Result<usize> {
        Ok(self.inner.read().await.search(filters).len())
    }

    async fn export_json(&self, path: &Path) -> Result<()> {
        let inner = self.inner.read().await;
        let snapshot = Snapshot {
            version: 1,
            timestamp: chrono::Utc::now(),
            entries: inner.entries.clone(),
            facets: inner.facets.snapshot(),
        };
        write_snapshot_atomically(path, &snapshot).await
    }
}

async fn write_snapshot_atomically(path: &Path, snapshot: &Snapshot) -> Result<()> {
    write_atomically(path, &serde_json::to_vec_pretty(snapshot)?).await
}

/// Write `bytes` to `path` via a temp file, `fsync`, then rename, so readers
/// never observe a partially-written file.
async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp_path).await?;
    use tokio::io::AsyncWriteExt;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Gefs, Status};
    use chrono::Utc;
    use std::collections::{HashMap as StdHashMap, HashSet};

    fn sample_entry(id: &str, namespace: &str, name: &str, version: &str) -> Entry {
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
        entry
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let storage = InMemoryStorage::new();
        let entry = sample_entry("e1", "a", "b", "1.0.0");
        storage.save(entry.clone()).await.unwrap();
        let loaded = storage.load(&entry.id).await.unwrap();
        assert_eq!(loaded.id, entry.id);
    }

    #[tokio::test]
    async fn duplicate_identity_with_different_id_conflicts() {
        let storage = InMemoryStorage::new();
        storage.save(sample_entry("e1", "a", "b", "1.0.0")).await.unwrap();
        let err = storage
            .save(sample_entry("e2", "a", "b", "1.0.0"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Conflict { .. }));
    }

    #[tokio::test]
    async fn delete_removes_entry_and_facets() {
        let storage = InMemoryStorage::new();
        let entry = sample_entry("e1", "a", "b", "1.0.0");
        storage.save(entry.clone()).await.unwrap();
        storage.delete(&entry.id).await.unwrap();
        assert!(storage.load(&entry.id).await.is_err());
    }

    #[tokio::test]
    async fn search_is_subset_of_unfiltered_search() {
        let storage = InMemoryStorage::new();
        storage.save(sample_entry("e1", "a", "b", "1.0.0")).await.unwrap();
        storage.save(sample_entry("e2", "c", "d", "1.0.0")).await.unwrap();

        let filtered = storage
            .search(&SearchFilters {
                namespace: Some("a".to_string()),
                ..SearchFilters::none()
            })
            .await
            .unwrap();
        let all = storage.search(&SearchFilters::none()).await.unwrap();

        assert!(filtered.iter().all(|e| all.iter().any(|a| a.id == e.id)));
        assert_eq!(
            storage
                .count(&SearchFilters {
                    namespace: Some("a".to_string()),
                    ..SearchFilters::none()
                })
                .await
                .unwrap(),
            filtered.len()
        );
    }

    #[tokio::test]
    async fn filesystem_storage_roundtrips_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::open(dir.path()).await.unwrap();
        let entry = sample_entry("e1", "a", "b", "1.0.0");
        storage.save(entry.clone()).await.unwrap();

        let reopened = FilesystemStorage::open(dir.path()).await.unwrap();
        let loaded = reopened.load(&entry.id).await.unwrap();
        assert_eq!(loaded.id, entry.id);
    }

    #[tokio::test]
    async fn export_json_writes_atomically() {
        let storage = InMemoryStorage::new();
        storage.save(sample_entry("e1", "a", "b", "1.0.0")).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        storage.export_json(&path).await.unwrap();

        let bytes = tokio::fs::read(&path).await.unwrap();
        let snapshot: Snapshot = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(snapshot.entries.len(), 1);
    }
}

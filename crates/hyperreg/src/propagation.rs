//! Propagation Engine: rule-driven updates across entries.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RegistryError, Result};
use crate::identity::{Category, Entry, EntryId, RelationshipKind};
use crate::registry::Registry;

/// How a propagation session distributes an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationMode {
    Immediate,
    Eventual,
    Cascade,
    Consensus,
}

/// Status of a propagation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Done,
    Failed,
    RolledBack,
}

/// A single rule evaluated at each cascade hop. `when` is evaluated against
/// the incoming JSON payload; rules are side-effect-free and deterministic.
pub struct Rule {
    /// Human-readable name, used in logs and the rule's `Debug` output.
    pub name: String,
    /// Predicate over the payload; returning `false` drops this hop's own
    /// downstream propagation (the hop itself is still visited).
    pub when: Box<dyn Fn(&serde_json::Value) -> bool + Send + Sync>,
    /// Optional transform applied to the payload before forwarding.
    pub transform: Option<Box<dyn Fn(serde_json::Value) -> serde_json::Value + Send + Sync>>,
    /// Restricts this hop's downstream recipients by category/facet,
    /// independent of the payload-driven `when` gate.
    pub target_filter: Option<TargetFilter>,
}

/// Restricts which of a hop's downstream targets a rule forwards to.
#[derive(Debug, Clone, Default)]
pub struct TargetFilter {
    /// Only forward to downstream targets in this category.
    pub category: Option<Category>,
    /// Only forward to downstream targets matching every facet key (OR
    /// within a key's value list), same semantics as `storage::FacetQuery`.
    pub facets: HashMap<String, Vec<String>>,
}

impl TargetFilter {
    /// Whether `entry` qualifies as a downstream recipient under this filter.
    pub fn matches(&self, entry: &Entry) -> bool {
        if let Some(category) = self.category {
            if entry.category != category {
                return false;
            }
        }
        if self.facets.is_empty() {
            return true;
        }
        let derived = entry.derived_facets();
        self.facets.iter().all(|(key, values)| {
            values
                .iter()
                .any(|value| derived.contains(&(key.clone(), value.clone())))
        })
    }
}

/// Conflict resolution policy for concurrent updates to the same entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Fail with a conflict error; caller inspects both versions.
    Manual,
    /// The later write always wins.
    LastWriterWins,
    /// Scalars replaced, lists union-deduped, nested maps recursed.
    MergeByField,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        ConflictPolicy::Manual
    }
}

/// Resolve a conflict between the version an update was based on (`parent`)
/// and the version currently in the store (`store`), given the caller's
/// proposed `ours` update and `theirs` (the concurrent store value).
pub fn resolve_conflict(
    policy: ConflictPolicy,
    parent_updated_at: DateTime<Utc>,
    store_updated_at: DateTime<Utc>,
    ours: &HashMap<String, serde_json::Value>,
    theirs: &HashMap<String, serde_json::Value>,
) -> Result<HashMap<String, serde_json::Value>> {
    if parent_updated_at == store_updated_at {
        return Ok(ours.clone());
    }

    match policy {
        ConflictPolicy::Manual => Err(RegistryError::Conflict {
            namespace: String::new(),
            name: String::new(),
            version: String::new(),
            request_id: Uuid::new_v4(),
        }),
        ConflictPolicy::LastWriterWins => {
            if store_updated_at > parent_updated_at {
                Ok(theirs.clone())
            } else {
                Ok(ours.clone())
            }
        }
        ConflictPolicy::MergeByField => Ok(merge_by_field(theirs, ours)),
    }
}

fn merge_by_field(
    base: &HashMap<String, serde_json::Value>,
    overlay: &HashMap<String, serde_json::Value>,
) -> HashMap<String, serde_json::Value> {
    let mut merged = base.clone();
    for (key, overlay_value) in overlay {
        match merged.get(key) {
            Some(serde_json::Value::Array(base_arr)) => {
                if let serde_json::Value::Array(overlay_arr) = overlay_value {
                    let mut combined = base_arr.clone();
                    for item in overlay_arr {
                        if !combined.contains(item) {
                            combined.push(item.clone());
                        }
                    }
                    merged.insert(key.clone(), serde_json::Value::Array(combined));
                } else {
                    merged.insert(key.clone(), overlay_value.clone());
                }
            }
            Some(serde_json::Value::Object(base_obj)) => {
                if let serde_json::Value::Object(overlay_obj) = overlay_value {
                    let base_map: HashMap<String, serde_json::Value> =
                        base_obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                    let overlay_map: HashMap<String, serde_json::Value> =
                        overlay_obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                    let nested = merge_by_field(&base_map, &overlay_map);
                    merged.insert(
                        key.clone(),
                        serde_json::Value::Object(nested.into_iter().collect()),
                    );
                } else {
                    merged.insert(key.clone(), overlay_value.clone());
                }
            }
            _ => {
                merged.insert(key.clone(), overlay_value.clone());
            }
        }
    }
    merged
}

/// A tracked execution of a propagation plan.
#[derive(Debug, Clone, Serialize)]
pub struct PropagationSession {
    /// Stable session id.
    pub session_id: Uuid,
    /// Entry the propagation originated from.
    pub source_entry_id: EntryId,
    /// Distribution mode used.
    pub mode: PropagationMode,
    /// Entries visited, in traversal order.
    pub path: Vec<EntryId>,
    /// Current status.
    pub status: SessionStatus,
    /// Fraction of the plan completed, in `[0, 1]`.
    pub progress: f64,
    /// When the session started.
    pub created_at: DateTime<Utc>,
}

/// Computes and executes propagation plans across the entry graph.
pub struct PropagationEngine {
    registry: Arc<Registry>,
    sessions: DashMap<Uuid, PropagationSession>,
    max_inflight_sessions: usize,
    inflight: AtomicU64,
}

impl PropagationEngine {
    /// Create an engine operating over `registry`, bounded by
    /// `max_inflight_sessions` (`RegistryConfig::max_inflight_propagation_sessions`).
    pub fn new(registry: Arc<Registry>, max_inflight_sessions: usize) -> Self {
        Self {
            registry,
            sessions: DashMap::new(),
            max_inflight_sessions,
            inflight: AtomicU64::new(0),
        }
    }

    /// Propagate `update` from `source` according to `mode`.
    pub async fn propagate(
        &self,
        source: &EntryId,
        update: serde_json::Value,
        mode: PropagationMode,
        targets: Vec<EntryId>,
        rules: &HashMap<EntryId, Rule>,
        quorum: Option<usize>,
        timeout: Duration,
    ) -> Result<Uuid> {
        if self.inflight.load(Ordering::Relaxed) as usize >= self.max_inflight_sessions {
            return Err(RegistryError::Validation {
                field: "propagation".to_string(),
                reason: "max_inflight_propagation_sessions exceeded".to_string(),
                request_id: Uuid::new_v4(),
            });
        }
        self.inflight.fetch_add(1, Ordering::Relaxed);

        let session_id = Uuid::new_v4();
        let mut session = PropagationSession {
            session_id,
            source_entry_id: source.clone(),
            mode,
            path: Vec::new(),
            status: SessionStatus::Running,
            progress: 0.0,
            created_at: Utc::now(),
        };

        let result = match mode {
            PropagationMode::Immediate => self.run_immediate(source, &targets, &mut session).await,
            PropagationMode::Eventual => {
                session.status = SessionStatus::Done;
                session.progress = 1.0;
                Ok(())
            }
            PropagationMode::Cascade => {
                self.run_cascade(source, &targets, &update, rules, &mut session)
                    .await
            }
            PropagationMode::Consensus => {
                self.run_consensus(source, &targets, quorum, timeout, &mut session)
                    .await
            }
        };

        if let Err(err) = result {
            session.status = SessionStatus::Failed;
            self.sessions.insert(session_id, session);
            self.inflight.fetch_sub(1, Ordering::Relaxed);
            return Err(err);
        }

        self.sessions.insert(session_id, session);
        self.inflight.fetch_sub(1, Ordering::Relaxed);
        Ok(session_id)
    }

    async fn run_immediate(
        &self,
        source: &EntryId,
        targets: &[EntryId],
        session: &mut PropagationSession,
    ) -> Result<()> {
        session.path.push(source.clone());
        for (i, target) in targets.iter().enumerate() {
            self.registry.get(target).await?;
            session.path.push(target.clone());
            session.progress = (i + 1) as f64 / targets.len().max(1) as f64;
        }
        session.status = SessionStatus::Done;
        Ok(())
    }

    /// A hop's own downstream recipients: the session's top-level targets
    /// for the source entry itself, or `entry.relationships` tagged
    /// `PropagatesTo` for every later hop (so branches like `T1 -> T3`
    /// that aren't in the top-level target list are still reachable).
    async fn downstream_of(
        &self,
        current: &EntryId,
        source: &EntryId,
        top_level_targets: &[EntryId],
    ) -> Result<Vec<EntryId>> {
        if current == source {
            return Ok(top_level_targets.to_vec());
        }
        let entry = self.registry.get(current).await?;
        Ok(entry
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::PropagatesTo)
            .map(|r| r.target_id.clone())
            .collect())
    }

    async fn run_cascade(
        &self,
        source: &EntryId,
        targets: &[EntryId],
        payload: &serde_json::Value,
        rules: &HashMap<EntryId, Rule>,
        session: &mut PropagationSession,
    ) -> Result<()> {
        let mut visited = HashSet::new();
        let mut stack: Vec<(EntryId, serde_json::Value)> =
            vec![(source.clone(), payload.clone())];

        while let Some((current, current_payload)) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            session.path.push(current.clone());

            if current != *source {
                if let Some(rule) = rules.get(&current) {
                    if !(rule.when)(&current_payload) {
                        continue;
                    }
                }
            }

            let next_payload = rules
                .get(&current)
                .and_then(|r| r.transform.as_ref())
                .map(|t| t(current_payload.clone()))
                .unwrap_or(current_payload);

            let target_filter = rules.get(&current).and_then(|r| r.target_filter.as_ref());
            for target in self.downstream_of(&current, source, targets).await? {
                if visited.contains(&target) {
                    continue;
                }
                if let Some(filter) = target_filter {
                    let candidate = self.registry.get(&target).await?;
                    if !filter.matches(&candidate) {
                        continue;
                    }
                }
                stack.push((target, next_payload.clone()));
            }
        }

        session.progress = 1.0;
        session.status = SessionStatus::Done;
        Ok(())
    }

    async fn run_consensus(
        &self,
        source: &EntryId,
        targets: &[EntryId],
        quorum: Option<usize>,
        timeout: Duration,
        session: &mut PropagationSession,
    ) -> Result<()> {
        let quorum = quorum.ok_or_else(|| RegistryError::Validation {
            field: "quorum".to_string(),
            reason: "CONSENSUS mode requires an explicit quorum".to_string(),
            request_id: Uuid::new_v4(),
        })?;
        if quorum == 0 || quorum > targets.len() {
            return Err(RegistryError::Validation {
                field: "quorum".to_string(),
                reason: format!("quorum must be in [1, {}]", targets.len()),
                request_id: Uuid::new_v4(),
            });
        }

        session.path.push(source.clone());

        let acks = futures::future::join_all(targets.iter().map(|target| {
            let registry = self.registry.clone();
            let target = target.clone();
            async move { tokio::time::timeout(timeout, registry.get(&target)).await }
        }))
        .await;

        let successes = acks.iter().filter(|a| matches!(a, Ok(Ok(_)))).count();
        session.path.extend(targets.iter().cloned());

        if successes >= quorum {
            session.status = SessionStatus::Done;
            session.progress = 1.0;
            Ok(())
        } else {
            session.status = SessionStatus::RolledBack;
            Err(RegistryError::Timeout {
                operation: "consensus propagation".to_string(),
                elapsed_ms: timeout.as_millis() as u64,
            })
        }
    }

    /// Look up a session by id.
    pub fn get_session(&self, id: Uuid) -> Option<PropagationSession> {
        self.sessions.get(&id).map(|s| s.clone())
    }
}

/// Apply a resolved update's fields onto `entry`, bumping `updated_at`.
pub fn apply_update(mut entry: Entry, update: &HashMap<String, serde_json::Value>) -> Entry {
    for (key, value) in update {
        entry.data.insert(key.clone(), value.clone());
    }
    entry.updated_at = Utc::now();
    entry.refresh_checksum();
    entry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_by_field_union_dedupes_lists() {
        let base = HashMap::from([(
            "tags".to_string(),
            serde_json::json!(["a", "b"]),
        )]);
        let overlay = HashMap::from([(
            "tags".to_string(),
            serde_json::json!(["b", "c"]),
        )]);
        let merged = merge_by_field(&base, &overlay);
        assert_eq!(merged["tags"], serde_json::json!(["a", "b", "c"]));
    }

    #[test]
    fn manual_policy_conflicts_on_divergent_parent() {
        let now = Utc::now();
        let earlier = now - chrono::Duration::seconds(10);
        let result = resolve_conflict(
            ConflictPolicy::Manual,
            earlier,
            now,
            &HashMap::new(),
            &HashMap::new(),
        );
        assert!(matches!(result, Err(RegistryError::Conflict { .. })));
    }

    #[test]
    fn last_writer_wins_prefers_newer_store_value() {
        let now = Utc::now();
        let earlier = now - chrono::Duration::seconds(10);
        let ours = HashMap::from([("x".to_string(), serde_json::json!(1))]);
        let theirs = HashMap::from([("x".to_string(), serde_json::json!(2))]);
        let result = resolve_conflict(ConflictPolicy::LastWriterWins, earlier, now, &ours, &theirs)
            .unwrap();
        assert_eq!(result["x"], serde_json::json!(2));
    }

    #[test]
    fn matching_parent_and_store_timestamps_skip_conflict_logic() {
        let now = Utc::now();
        let ours = HashMap::from([("x".to_string(), serde_json::json!(1))]);
        let result = resolve_conflict(ConflictPolicy::Manual, now, now, &ours, &HashMap::new())
            .unwrap();
        assert_eq!(result["x"], serde_json::json!(1));
    }
}

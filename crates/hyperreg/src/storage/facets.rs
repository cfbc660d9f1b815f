//! The facet index: a separate `(entry_id, key, value)` relation kept
//! consistent with its owning entry on every save.

use std::collections::{HashMap, HashSet};

use crate::identity::EntryId;

/// Requested facet filters: `key -> candidate values`. An entry matches iff
/// it has at least one row per requested key whose value is in that key's
/// list (AND across keys, OR within a key).
pub type FacetQuery = HashMap<String, Vec<String>>;

/// In-memory facet index, keyed by `(key, value) -> entry ids`.
#[derive(Debug, Default)]
pub struct FacetIndex {
    rows: HashMap<(String, String), HashSet<EntryId>>,
    by_entry: HashMap<EntryId, Vec<(String, String)>>,
}

impl FacetIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all facet rows for `entry_id` with `facets`, atomically from
    /// the caller's perspective (no intermediate state is observable since
    /// this type is only ever accessed behind a single lock).
    pub fn rewrite(&mut self, entry_id: &EntryId, facets: &[(String, String)]) {
        self.remove_entry(entry_id);
        for (key, value) in facets {
            self.rows
                .entry((key.clone(), value.clone()))
                .or_default()
                .insert(entry_id.clone());
        }
        self.by_entry
            .insert(entry_id.clone(), facets.to_vec());
    }

    /// Remove every row for an entry (used by `delete`).
    pub fn remove_entry(&mut self, entry_id: &EntryId) {
        if let Some(existing) = self.by_entry.remove(entry_id) {
            for (key, value) in existing {
                if let Some(set) = self.rows.get_mut(&(key.clone(), value.clone())) {
                    set.remove(entry_id);
                    if set.is_empty() {
                        self.rows.remove(&(key, value));
                    }
                }
            }
        }
    }

    /// Evaluate a facet query against the index, returning entry ids that
    /// satisfy every requested key (AND across keys, OR within a key's
    /// value list).
    pub fn query(&self, query: &FacetQuery) -> HashSet<EntryId> {
        let mut result: Option<HashSet<EntryId>> = None;

        for (key, values) in query {
            let mut matches_for_key: HashSet<EntryId> = HashSet::new();
            for value in values {
                if let Some(ids) = self.rows.get(&(key.clone(), value.clone())) {
                    matches_for_key.extend(ids.iter().cloned());
                }
            }
            result = Some(match result {
                None => matches_for_key,
                Some(acc) => acc.intersection(&matches_for_key).cloned().collect(),
            });
        }

        result.unwrap_or_default()
    }

    /// Snapshot the index as `entry_id -> [(key, value)]`, for
    /// `export_json`.
    pub fn snapshot(&self) -> HashMap<EntryId, Vec<(String, String)>> {
        self.by_entry.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_combines_and_across_keys_or_within_key() {
        let mut index = FacetIndex::new();
        let e1 = EntryId::from("e1");
        index.rewrite(
            &e1,
            &[
                ("domain".to_string(), "vision".to_string()),
                ("domain".to_string(), "ml".to_string()),
                ("stage".to_string(), "beta".to_string()),
            ],
        );

        let e2 = EntryId::from("e2");
        index.rewrite(&e2, &[("domain".to_string(), "audio".to_string())]);

        let matches = index.query(&FacetQuery::from([(
            "domain".to_string(),
            vec!["vision".to_string()],
        )]));
        assert_eq!(matches, HashSet::from([e1.clone()]));

        let no_matches = index.query(&FacetQuery::from([(
            "domain".to_string(),
            vec!["audio".to_string()],
        )]));
        assert_eq!(no_matches, HashSet::from([e2.clone()]));

        let combined = index.query(&FacetQuery::from([
            ("domain".to_string(), vec!["ml".to_string()]),
            ("stage".to_string(), vec!["beta".to_string()]),
        ]));
        assert_eq!(combined, HashSet::from([e1]));
    }

    #[test]
    fn rewrite_replaces_previous_rows() {
        let mut index = FacetIndex::new();
        let e1 = EntryId::from("e1");
        index.rewrite(&e1, &[("domain".to_string(), "vision".to_string())]);
        index.rewrite(&e1, &[("domain".to_string(), "audio".to_string())]);

        let stale = index.query(&FacetQuery::from([(
            "domain".to_string(),
            vec!["vision".to_string()],
        )]));
        assert!(stale.is_empty());

        let fresh = index.query(&FacetQuery::from([(
            "domain".to_string(),
            vec!["audio".to_string()],
        )]));
        assert_eq!(fresh, HashSet::from([e1]));
    }

    #[test]
    fn remove_entry_clears_all_its_rows() {
        let mut index = FacetIndex::new();
        let e1 = EntryId::from("e1");
        index.rewrite(&e1, &[("domain".to_string(), "vision".to_string())]);
        index.remove_entry(&e1);
        assert!(index.snapshot().is_empty());
    }
}

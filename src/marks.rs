use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::db::KeyValueStore;

pub const SAVED_KEY: &str = "savedJobIds";
pub const APPLIED_KEY: &str = "appliedJobIds";

pub type IdSet = BTreeSet<String>;

/// Reads an id set. Absent, unreadable or malformed values all yield an empty set.
pub fn load(store: &dyn KeyValueStore, key: &str) -> IdSet {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return IdSet::new(),
        Err(e) => {
            warn!(key, error = %e, "failed to read persisted ids, starting empty");
            return IdSet::new();
        }
    };

    match serde_json::from_str::<Vec<String>>(&raw) {
        Ok(ids) => ids.into_iter().collect(),
        Err(e) => {
            debug!(key, error = %e, "discarding malformed persisted ids");
            IdSet::new()
        }
    }
}

/// Best-effort write; failures are logged and otherwise ignored.
pub fn save(store: &dyn KeyValueStore, key: &str, ids: &IdSet) {
    let serialized = match serde_json::to_string(&ids.iter().collect::<Vec<_>>()) {
        Ok(s) => s,
        Err(e) => {
            warn!(key, error = %e, "failed to serialize ids");
            return;
        }
    };
    if let Err(e) = store.set(key, &serialized) {
        warn!(key, error = %e, "failed to persist ids");
    }
}

pub fn toggle(ids: &IdSet, id: &str) -> IdSet {
    let mut next = ids.clone();
    if !next.remove(id) {
        next.insert(id.to_string());
    }
    next
}

/// Saved and applied job ids, written through to the store on every change.
pub struct Marks<S: KeyValueStore> {
    store: S,
    saved: IdSet,
    applied: IdSet,
}

impl<S: KeyValueStore> Marks<S> {
    pub fn load(store: S) -> Self {
        let saved = load(&store, SAVED_KEY);
        let applied = load(&store, APPLIED_KEY);
        debug!(saved = saved.len(), applied = applied.len(), "loaded job marks");
        Self {
            store,
            saved,
            applied,
        }
    }

    pub fn saved(&self) -> &IdSet {
        &self.saved
    }

    pub fn applied(&self) -> &IdSet {
        &self.applied
    }

    pub fn is_saved(&self, id: &str) -> bool {
        self.saved.contains(id)
    }

    pub fn is_applied(&self, id: &str) -> bool {
        self.applied.contains(id)
    }

    /// Returns whether the id is saved after the toggle.
    pub fn toggle_saved(&mut self, id: &str) -> bool {
        self.saved = toggle(&self.saved, id);
        save(&self.store, SAVED_KEY, &self.saved);
        self.saved.contains(id)
    }

    /// Returns whether the id is applied after the toggle.
    pub fn toggle_applied(&mut self, id: &str) -> bool {
        self.applied = toggle(&self.applied, id);
        save(&self.store, APPLIED_KEY, &self.applied);
        self.applied.contains(id)
    }

    #[cfg(test)]
    pub fn into_store(self) -> S {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use anyhow::anyhow;

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
            Err(anyhow!("disk on fire"))
        }

        fn set(&self, _key: &str, _value: &str) -> anyhow::Result<()> {
            Err(anyhow!("read-only filesystem"))
        }
    }

    fn ids(values: &[&str]) -> IdSet {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_toggle_adds_then_removes() {
        let start = ids(&["job-1"]);
        let added = toggle(&start, "job-2");
        assert_eq!(added, ids(&["job-1", "job-2"]));
        assert_eq!(toggle(&added, "job-2"), start);
    }

    #[test]
    fn test_toggle_twice_is_identity() {
        for start in [ids(&[]), ids(&["a"]), ids(&["a", "b", "c"])] {
            for id in ["a", "z", ""] {
                assert_eq!(toggle(&toggle(&start, id), id), start);
            }
        }
    }

    #[test]
    fn test_load_missing_key_is_empty() {
        let db = Database::open_in_memory().unwrap();
        assert!(load(&db, SAVED_KEY).is_empty());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let set = ids(&["job-3", "job-1", "職缺-9"]);
        save(&db, APPLIED_KEY, &set);
        assert_eq!(load(&db, APPLIED_KEY), set);
    }

    #[test]
    fn test_malformed_values_load_empty() {
        let db = Database::open_in_memory().unwrap();
        for raw in ["not json", "{\"a\": 1}", "[1, 2]", "[\"ok\", null]", "\"job-1\""] {
            db.set(SAVED_KEY, raw).unwrap();
            assert!(load(&db, SAVED_KEY).is_empty(), "expected empty for {raw}");
        }
    }

    #[test]
    fn test_unreadable_store_loads_empty_and_writes_silently() {
        let mut marks = Marks::load(BrokenStore);
        assert!(marks.saved().is_empty());
        assert!(marks.toggle_saved("job-1"));
        assert!(marks.is_saved("job-1"));
    }

    #[test]
    fn test_marks_persist_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobhub.db");

        {
            let mut marks = Marks::load(Database::open(&path).unwrap());
            marks.toggle_saved("job-3");
            marks.toggle_applied("job-7");
            marks.toggle_applied("job-8");
            marks.toggle_applied("job-8");
        }

        let marks = Marks::load(Database::open(&path).unwrap());
        assert_eq!(marks.saved(), &ids(&["job-3"]));
        assert_eq!(marks.applied(), &ids(&["job-7"]));
    }

    #[test]
    fn test_saved_and_applied_are_independent() {
        let mut marks = Marks::load(Database::open_in_memory().unwrap());
        assert!(marks.toggle_saved("job-1"));
        assert!(marks.toggle_applied("job-1"));
        assert!(marks.is_saved("job-1"));
        assert!(!marks.toggle_saved("job-1"));
        assert!(marks.is_applied("job-1"));

        let store = marks.into_store();
        assert_eq!(store.get(SAVED_KEY).unwrap().as_deref(), Some("[]"));
        assert_eq!(store.get(APPLIED_KEY).unwrap().as_deref(), Some("[\"job-1\"]"));
    }
}

//! Versioned recipe document store.
//!
//! One document per active recipe, shared by every voice session and chat
//! request in the process. The store has no locks visible to callers and
//! never raises a conflict: concurrent writers race through
//! [`RecipeStore::apply_if_newer`] and stale snapshots are silently ignored.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use super::{RecipeSnapshot, next_version};

/// Process-wide store of live recipe documents, keyed by recipe id.
#[derive(Debug, Default)]
pub struct RecipeStore {
    docs: DashMap<String, RecipeSnapshot>,
}

impl RecipeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditionally overwrite the document, used when a fresh recipe is
    /// loaded into a session.
    pub fn replace(&self, snapshot: RecipeSnapshot) {
        debug!(
            recipe_id = %snapshot.id,
            last_updated = snapshot.last_updated,
            "Replacing recipe document"
        );
        self.docs.insert(snapshot.id.clone(), snapshot);
    }

    /// Apply a snapshot only if it is strictly newer than the held document.
    ///
    /// Returns `true` when the write was applied. A stale or equal-version
    /// snapshot leaves the store unchanged and returns `false`.
    pub fn apply_if_newer(&self, snapshot: RecipeSnapshot) -> bool {
        match self.docs.entry(snapshot.id.clone()) {
            Entry::Occupied(mut held) => {
                if snapshot.last_updated > held.get().last_updated {
                    held.insert(snapshot);
                    true
                } else {
                    debug!(
                        recipe_id = %snapshot.id,
                        incoming = snapshot.last_updated,
                        held = held.get().last_updated,
                        "Discarding stale recipe snapshot"
                    );
                    false
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(snapshot);
                true
            }
        }
    }

    /// Fetch a copy of the current document for a recipe, if any.
    pub fn get(&self, id: &str) -> Option<RecipeSnapshot> {
        self.docs.get(id).map(|doc| doc.value().clone())
    }

    /// Produce a version stamp strictly newer than the held document for
    /// `id` (and never behind wall-clock time).
    pub fn next_version_for(&self, id: &str) -> u64 {
        next_version(self.docs.get(id).map(|doc| doc.last_updated))
    }

    /// Number of live recipe documents.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::recipe::{Ingredient, Step};

    fn snapshot(id: &str, title: &str, last_updated: u64) -> RecipeSnapshot {
        RecipeSnapshot {
            id: id.to_string(),
            title: title.to_string(),
            servings: None,
            ingredients: vec![Ingredient {
                text: "pasta".to_string(),
            }],
            steps: vec![Step {
                title: "Step 1".to_string(),
                description: "boil".to_string(),
            }],
            last_updated,
        }
    }

    #[test]
    fn test_apply_if_newer_first_write_always_lands() {
        let store = RecipeStore::new();
        assert!(store.apply_if_newer(snapshot("r1", "a", 5)));
        assert_eq!(store.get("r1").expect("stored").title, "a");
    }

    #[test]
    fn test_apply_if_newer_rejects_stale_and_equal() {
        let store = RecipeStore::new();
        store.replace(snapshot("r1", "current", 10));

        assert!(!store.apply_if_newer(snapshot("r1", "older", 9)));
        assert!(!store.apply_if_newer(snapshot("r1", "same", 10)));
        assert_eq!(store.get("r1").expect("stored").title, "current");
    }

    #[test]
    fn test_apply_if_newer_applies_newer_wholesale() {
        let store = RecipeStore::new();
        store.replace(snapshot("r1", "old", 10));

        let newer = snapshot("r1", "new", 11);
        assert!(store.apply_if_newer(newer.clone()));
        assert_eq!(store.get("r1").expect("stored"), newer);
    }

    #[test]
    fn test_replace_overwrites_regardless_of_version() {
        let store = RecipeStore::new();
        store.replace(snapshot("r1", "newer", 100));
        store.replace(snapshot("r1", "forced", 1));
        assert_eq!(store.get("r1").expect("stored").last_updated, 1);
    }

    #[test]
    fn test_documents_are_independent_per_id() {
        let store = RecipeStore::new();
        store.replace(snapshot("r1", "one", 50));
        assert!(store.apply_if_newer(snapshot("r2", "two", 1)));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_next_version_for_outruns_held_document() {
        let store = RecipeStore::new();
        let future = crate::core::recipe::now_ms() + 60_000;
        store.replace(snapshot("r1", "future", future));
        assert_eq!(store.next_version_for("r1"), future + 1);
    }
}

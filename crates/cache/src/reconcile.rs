//! Snapshot reconciliation.
//!
//! The single diff-and-apply pass shared by every backend: given the
//! complete (or scoped) external state as a sequence of snapshot records,
//! create entities for unseen keys, merge records into resident entities in
//! place, and optionally remove entities whose keys the snapshot no longer
//! contains. Identity is preserved across passes; structural events are
//! published after the store lock is released.

use crate::entity::Entity;
use crate::events::ChangeEvent;
use crate::store::EntityStore;
use std::collections::HashSet;
use std::collections::hash_map::Entry;
use std::sync::Arc;

/// Counts of the actions a reconciliation pass applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Entities created for previously unseen keys.
    pub added: usize,
    /// Entities removed and marked deleted.
    pub removed: usize,
    /// Field-level changes merged into resident entities.
    pub changed: usize,
}

impl ReconcileOutcome {
    /// Whether the pass applied no action at all.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.changed == 0
    }
}

impl<E: Entity> EntityStore<E> {
    /// Reconcile the store against a freshly fetched snapshot set.
    ///
    /// When `remove_missing` is true the snapshot set is authoritative for
    /// the whole collection: resident keys it does not contain are removed
    /// and their entities marked deleted. When false (a scoped or filtered
    /// fetch), absence does not imply deletion and stale entries are left in
    /// place.
    ///
    /// A record whose resident entry is already deleted replaces it with a
    /// fresh entity and fires `Added`; deleted entities are never
    /// resurrected. Two concurrent passes over the same store serialize on
    /// the store lock; the later-completing snapshot wins.
    pub fn reconcile<I>(&self, snapshots: I, remove_missing: bool) -> ReconcileOutcome
    where
        I: IntoIterator<Item = E::Snapshot>,
    {
        let snapshots: Vec<E::Snapshot> = snapshots.into_iter().collect();
        let mut queued: Vec<ChangeEvent<E>> = Vec::new();
        let mut outcome = ReconcileOutcome::default();

        {
            let mut map = self.map();
            let mut seen: HashSet<E::Key> = HashSet::with_capacity(snapshots.len());

            for snapshot in &snapshots {
                let key = E::snapshot_key(snapshot);
                seen.insert(key.clone());
                match map.entry(key) {
                    Entry::Occupied(mut entry) => {
                        if entry.get().lifetime().is_deleted() {
                            let fresh = Arc::new(E::from_snapshot(snapshot));
                            entry.insert(Arc::clone(&fresh));
                            queued.push(ChangeEvent::Added(fresh));
                            outcome.added += 1;
                        } else {
                            let existing = Arc::clone(entry.get());
                            for field in existing.apply_snapshot(snapshot) {
                                queued.push(ChangeEvent::Changed {
                                    entity: Arc::clone(&existing),
                                    field,
                                });
                                outcome.changed += 1;
                            }
                        }
                    }
                    Entry::Vacant(entry) => {
                        let fresh = Arc::new(E::from_snapshot(snapshot));
                        entry.insert(Arc::clone(&fresh));
                        queued.push(ChangeEvent::Added(fresh));
                        outcome.added += 1;
                    }
                }
            }

            if remove_missing {
                let stale: Vec<E::Key> = map
                    .keys()
                    .filter(|key| !seen.contains(*key))
                    .cloned()
                    .collect();
                for key in stale {
                    if let Some(entity) = map.remove(&key) {
                        entity.lifetime().mark_deleted();
                        queued.push(ChangeEvent::Removed(entity));
                        outcome.removed += 1;
                    }
                }
            }
        }

        tracing::debug!(
            added = outcome.added,
            removed = outcome.removed,
            changed = outcome.changed,
            remove_missing,
            "reconciled snapshot set"
        );
        self.publish_batch(queued);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestEntity, TestSnapshot};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn snap(key: &str) -> TestSnapshot {
        TestSnapshot::new(key, "v1")
    }

    #[tokio::test]
    async fn full_refresh_scenario() {
        let store = EntityStore::<TestEntity>::new();
        let mut rx = store.subscribe();

        // Empty cache, two-record snapshot: two Added.
        let outcome = store.reconcile([snap("main"), snap("dev")], true);
        assert_eq!(outcome.added, 2);
        assert_eq!(store.len(), 2);
        assert!(matches!(rx.try_recv(), Some(ChangeEvent::Added(_))));
        assert!(matches!(rx.try_recv(), Some(ChangeEvent::Added(_))));
        assert!(rx.try_recv().is_none());

        let main = store.get(&"main".to_string()).expect("main resident");

        // "dev" gone from the authoritative snapshot: one Removed.
        let outcome = store.reconcile([snap("main")], true);
        assert_eq!(outcome.removed, 1);
        assert_eq!(store.len(), 1);
        match rx.try_recv() {
            Some(ChangeEvent::Removed(entity)) => {
                assert_eq!(entity.key(), "dev");
                assert!(entity.lifetime().is_deleted());
            }
            other => panic!("expected Removed, got {other:?}"),
        }

        // Identity of the surviving entity is preserved.
        let main_after = store.get(&"main".to_string()).expect("main resident");
        assert!(Arc::ptr_eq(&main, &main_after));
    }

    #[test]
    fn update_merges_in_place() {
        let store = EntityStore::<TestEntity>::new();
        store.reconcile([TestSnapshot::new("main", "aaa").with_note("first")], true);
        let entity = store.get(&"main".to_string()).expect("resident");

        let outcome = store.reconcile([TestSnapshot::new("main", "bbb")], true);
        assert_eq!(outcome.added, 0);
        assert_eq!(outcome.changed, 1);
        assert_eq!(entity.value(), "bbb");
        // Sparse record: the absent field keeps its value.
        assert_eq!(entity.note().as_deref(), Some("first"));
    }

    #[test]
    fn idempotent_second_pass() {
        let store = EntityStore::<TestEntity>::new();
        store.reconcile([snap("main"), snap("dev")], true);
        let before = store.entities();

        let outcome = store.reconcile([snap("main"), snap("dev")], true);
        assert!(outcome.is_noop());

        for entity in before {
            let after = store.get(&entity.key()).expect("still resident");
            assert!(Arc::ptr_eq(&entity, &after));
        }
    }

    #[tokio::test]
    async fn idempotent_second_pass_publishes_nothing() {
        let store = EntityStore::<TestEntity>::new();
        store.reconcile([snap("main")], true);
        let mut rx = store.subscribe();
        store.reconcile([snap("main")], true);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn empty_snapshot_clears_the_collection() {
        let store = EntityStore::<TestEntity>::new();
        store.reconcile([snap("a"), snap("b"), snap("c")], true);

        let outcome = store.reconcile(Vec::new(), true);
        assert_eq!(outcome.removed, 3);
        assert!(store.is_empty());
    }

    #[test]
    fn scoped_refresh_never_removes() {
        let store = EntityStore::<TestEntity>::new();
        store.reconcile([snap("main"), snap("origin/main")], true);

        // Scoped fetch covering only one key must not touch the other.
        let outcome = store.reconcile([snap("origin/main")], false);
        assert_eq!(outcome.removed, 0);
        assert_eq!(store.len(), 2);
        assert!(store.contains_key(&"main".to_string()));
    }

    #[tokio::test]
    async fn deleted_entities_are_never_resurrected() {
        let store = EntityStore::<TestEntity>::new();
        store.reconcile([snap("main")], true);
        let original = store.get(&"main".to_string()).expect("resident");

        // External deletion observed out of band.
        original.lifetime().mark_deleted();

        let mut rx = store.subscribe();
        let outcome = store.reconcile([snap("main")], true);
        assert_eq!(outcome.added, 1);

        let replacement = store.get(&"main".to_string()).expect("resident");
        assert!(!Arc::ptr_eq(&original, &replacement));
        assert!(original.lifetime().is_deleted());
        assert!(!replacement.lifetime().is_deleted());
        assert!(matches!(rx.try_recv(), Some(ChangeEvent::Added(_))));
    }

    #[tokio::test]
    async fn events_fire_in_stable_order() {
        let store = EntityStore::<TestEntity>::new();
        store.reconcile([snap("keep"), snap("drop")], true);
        let mut rx = store.subscribe();

        store.reconcile([snap("keep"), snap("new")], true);

        let mut kinds = Vec::new();
        while let Some(event) = rx.try_recv() {
            kinds.push(match event {
                ChangeEvent::Added(e) => format!("added:{}", e.key()),
                ChangeEvent::Removed(e) => format!("removed:{}", e.key()),
                other => panic!("unexpected event: {other:?}"),
            });
        }
        // Creations queue during the snapshot walk, removals after it.
        assert_eq!(kinds, vec!["added:new", "removed:drop"]);
    }

    #[test]
    fn concurrent_passes_serialize() {
        let store = Arc::new(EntityStore::<TestEntity>::new());
        let mut handles = Vec::new();
        for round in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                let snaps: Vec<TestSnapshot> = (0..16)
                    .map(|i| TestSnapshot::new(format!("k{i}"), format!("r{round}")))
                    .collect();
                store.reconcile(snaps, true);
            }));
        }
        for handle in handles {
            handle.join().expect("reconcile thread");
        }

        // Whichever pass completed last, the store holds a coherent snapshot:
        // all sixteen keys, all carrying the same round's value.
        assert_eq!(store.len(), 16);
        let values: BTreeSet<String> = store.entities().iter().map(|e| e.value()).collect();
        assert_eq!(values.len(), 1);
    }

    proptest! {
        // With remove_missing, the key set after reconciliation equals the
        // snapshot key set exactly, from any prior state.
        #[test]
        fn key_set_matches_snapshot_set(
            first in proptest::collection::btree_set("[a-e][0-9]", 0..12),
            second in proptest::collection::btree_set("[a-e][0-9]", 0..12),
        ) {
            let store = EntityStore::<TestEntity>::new();
            store.reconcile(first.iter().map(|k| snap(k)), true);
            store.reconcile(second.iter().map(|k| snap(k)), true);

            let resident: BTreeSet<String> = store.keys().into_iter().collect();
            prop_assert_eq!(resident, second);
        }

        // Without remove_missing, reconciliation only ever grows the key set.
        #[test]
        fn scoped_pass_preserves_out_of_scope_keys(
            full in proptest::collection::btree_set("[a-e][0-9]", 1..12),
            scoped in proptest::collection::btree_set("[a-e][0-9]", 0..12),
        ) {
            let store = EntityStore::<TestEntity>::new();
            store.reconcile(full.iter().map(|k| snap(k)), true);
            store.reconcile(scoped.iter().map(|k| snap(k)), false);

            let resident: BTreeSet<String> = store.keys().into_iter().collect();
            let expected: BTreeSet<String> = full.union(&scoped).cloned().collect();
            prop_assert_eq!(resident, expected);
        }
    }
}

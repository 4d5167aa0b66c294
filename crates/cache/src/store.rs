//! Keyed entity store.
//!
//! An [`EntityStore`] owns the `Key -> Arc<Entity>` mapping for exactly one
//! entity type within one context (a repository, a server connection). One
//! mutex guards the mapping; enumeration clones the handle set under the
//! lock and iterates outside it, and change events are published only after
//! the lock has been released. Callers must never hold one store's lock
//! while calling into another store.

use crate::entity::Entity;
use crate::events::{ChangeBus, ChangeEvent, ChangeReceiver};
use crate::suppress::SuppressState;
use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Recover the guard from a poisoned mutex; the protected state is a plain
/// map with no invariants that a panicking holder could have broken.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Thread-safe mapping from external key to long-lived entity.
pub struct EntityStore<E: Entity> {
    inner: Mutex<HashMap<E::Key, Arc<E>>>,
    bus: ChangeBus<E>,
    pub(crate) suppress: Mutex<SuppressState>,
}

impl<E: Entity> EntityStore<E> {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            bus: ChangeBus::new(),
            suppress: Mutex::new(SuppressState::default()),
        }
    }

    /// Create an empty store with a specific event channel capacity.
    #[must_use]
    pub fn with_bus_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            bus: ChangeBus::with_capacity(capacity),
            suppress: Mutex::new(SuppressState::default()),
        }
    }

    pub(crate) fn map(&self) -> MutexGuard<'_, HashMap<E::Key, Arc<E>>> {
        lock(&self.inner)
    }

    /// Fetch the entity for `snapshot`'s key, creating or updating it.
    ///
    /// If the key is resident, the existing entity's fields are merged from
    /// the snapshot (identity preserved) and field-level `Changed` events are
    /// published. Otherwise a fresh entity is constructed and inserted. No
    /// `Added`/`Removed` events fire from this primitive; callers that want
    /// structural semantics use [`reconcile`](EntityStore::reconcile).
    ///
    /// A resident entry that is already deleted is replaced by a fresh
    /// entity rather than resurrected.
    pub fn lookup_or_create(&self, snapshot: &E::Snapshot) -> Arc<E> {
        let key = E::snapshot_key(snapshot);
        let mut changed = Vec::new();
        let entity = {
            let mut map = self.map();
            match map.get(&key) {
                Some(existing) if !existing.lifetime().is_deleted() => {
                    let existing = Arc::clone(existing);
                    for field in existing.apply_snapshot(snapshot) {
                        changed.push(ChangeEvent::Changed {
                            entity: Arc::clone(&existing),
                            field,
                        });
                    }
                    existing
                }
                _ => {
                    let fresh = Arc::new(E::from_snapshot(snapshot));
                    map.insert(key, Arc::clone(&fresh));
                    fresh
                }
            }
        };
        self.publish_batch(changed);
        entity
    }

    /// Indexed lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] if the key is absent; use
    /// [`try_get`](EntityStore::try_get) for a non-failing lookup.
    pub fn get(&self, key: &E::Key) -> Result<Arc<E>> {
        self.try_get(key).ok_or_else(|| Error::key_not_found(key))
    }

    /// Lookup returning `None` on a miss.
    #[must_use]
    pub fn try_get(&self, key: &E::Key) -> Option<Arc<E>> {
        self.map().get(key).map(Arc::clone)
    }

    /// Whether `key` is resident.
    #[must_use]
    pub fn contains_key(&self, key: &E::Key) -> bool {
        self.map().contains_key(key)
    }

    /// Erase `key` from the mapping, returning the entity if present.
    ///
    /// Does not mark the entity deleted; some callers re-home detached
    /// entities, so that decision stays with them.
    pub fn remove(&self, key: &E::Key) -> Option<Arc<E>> {
        self.map().remove(key)
    }

    /// Erase `entity` from the mapping by its key.
    pub fn remove_entity(&self, entity: &E) -> Option<Arc<E>> {
        self.remove(&entity.key())
    }

    /// Snapshot of the current entity handles.
    #[must_use]
    pub fn entities(&self) -> Vec<Arc<E>> {
        self.map().values().map(Arc::clone).collect()
    }

    /// Snapshot of the current key set.
    #[must_use]
    pub fn keys(&self) -> Vec<E::Key> {
        self.map().keys().cloned().collect()
    }

    /// Number of resident entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }

    /// Subscribe to this store's change events.
    #[must_use]
    pub fn subscribe(&self) -> ChangeReceiver<E> {
        self.bus.subscribe()
    }

    /// Number of active event subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.bus.subscriber_count()
    }

    /// Publish a batch of queued events, honoring any live suppression
    /// scope. Must be called without the map lock held.
    pub(crate) fn publish_batch(&self, events: Vec<ChangeEvent<E>>) {
        if events.is_empty() {
            return;
        }
        {
            let mut state = lock(&self.suppress);
            if state.depth > 0 {
                state.pending = true;
                return;
            }
        }
        for event in events {
            self.bus.publish(event);
        }
    }

    /// Publish one event directly to the bus, bypassing suppression.
    pub(crate) fn publish_direct(&self, event: ChangeEvent<E>) {
        self.bus.publish(event);
    }
}

impl<E: Entity> Default for EntityStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> fmt::Debug for EntityStore<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityStore")
            .field("len", &self.len())
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

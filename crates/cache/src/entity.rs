//! Entity trait and lifetime tracking.
//!
//! Every cached object is a long-lived [`Entity`] shared as an `Arc`:
//! refreshes update its fields in place instead of replacing it, so
//! references held by subscribers stay valid across refreshes. The paired
//! [`Lifetime`] tracks the one-way live-to-deleted transition and tears
//! down the entity's event wiring when the external object disappears.

use crate::{Error, Result};
use std::fmt;
use std::hash::Hash;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cached domain object with stable identity across refreshes.
///
/// Implementations own their mutable fields behind interior mutability;
/// [`apply_snapshot`](Entity::apply_snapshot) is the only sanctioned write
/// path during reconciliation and runs under the owning store's lock.
pub trait Entity: Send + Sync + 'static {
    /// Stable external key identifying the entity within one store.
    type Key: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync;

    /// Parsed, point-in-time read of the external object's fields.
    type Snapshot: Send + Sync + 'static;

    /// The entity's key.
    fn key(&self) -> Self::Key;

    /// The key a snapshot record reconciles against.
    fn snapshot_key(snapshot: &Self::Snapshot) -> Self::Key;

    /// Lifetime state (deleted flag and detach hooks).
    fn lifetime(&self) -> &Lifetime;

    /// Construct a fresh entity from a snapshot record.
    fn from_snapshot(snapshot: &Self::Snapshot) -> Self;

    /// Merge a snapshot record into the existing entity.
    ///
    /// Returns the names of fields whose values actually changed, which the
    /// reconciler turns into field-level change events. The merge is sparse:
    /// a field the record does not carry keeps its current value.
    fn apply_snapshot(&self, snapshot: &Self::Snapshot) -> Vec<&'static str>;
}

type DetachHook = Box<dyn FnOnce() + Send>;

/// One-way live-to-deleted lifetime state.
///
/// Embedded in every entity. Subscription teardown registered via
/// [`on_deleted`](Lifetime::on_deleted) runs exactly once, on the first
/// [`mark_deleted`](Lifetime::mark_deleted) call.
#[derive(Default)]
pub struct Lifetime {
    deleted: AtomicBool,
    detach: Mutex<Vec<DetachHook>>,
}

impl Lifetime {
    /// Create a live lifetime.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the entity has been deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    /// Mark the entity deleted and run its detach hooks.
    ///
    /// Idempotent: the transition happens once, and repeated calls are
    /// no-ops. After this returns, mutating operations on the entity fail
    /// with [`Error::InvalidState`].
    pub fn mark_deleted(&self) {
        let first = self
            .deleted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !first {
            return;
        }
        let hooks = match self.detach.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for hook in hooks {
            hook();
        }
    }

    /// Register a hook that runs when the entity is marked deleted.
    ///
    /// If the entity is already deleted the hook runs immediately.
    pub fn on_deleted(&self, hook: impl FnOnce() + Send + 'static) {
        if self.is_deleted() {
            hook();
            return;
        }
        let mut guard = match self.detach.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // The flag may have flipped while we waited for the hook list lock.
        if self.deleted.load(Ordering::Acquire) {
            drop(guard);
            hook();
        } else {
            guard.push(Box::new(hook));
        }
    }

    /// Precondition check for operations on behalf of the entity.
    ///
    /// Deleted entities must fail loudly rather than silently no-op, so that
    /// stale references surface as bugs instead of corrupting cache state.
    pub fn ensure_live(&self, key: impl fmt::Display) -> Result<()> {
        if self.is_deleted() {
            return Err(Error::invalid_state(key));
        }
        Ok(())
    }
}

impl fmt::Debug for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifetime")
            .field("deleted", &self.is_deleted())
            .finish_non_exhaustive()
    }
}

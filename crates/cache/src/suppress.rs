//! Notification suppression scopes.
//!
//! A multi-step operation (adding a submodule touches both the worktree and
//! the submodule collection) would otherwise fire a fine-grained event per
//! intermediate step. Holding a [`NotificationBlock`] coalesces everything
//! published against the store for the block's duration; when the outermost
//! block drops, a single consolidated [`ChangeEvent::Refreshed`] is emitted
//! if anything was swallowed. Release happens in `Drop`, so the deferred
//! notification fires on every exit path, panics included.

use crate::entity::Entity;
use crate::events::ChangeEvent;
use crate::store::{EntityStore, lock};

/// Per-store suppression state: nesting depth plus a flag recording whether
/// any publication was swallowed while suppressed.
#[derive(Debug, Default)]
pub(crate) struct SuppressState {
    pub(crate) depth: usize,
    pub(crate) pending: bool,
}

/// Object-safe handle letting suppression scopes span stores of different
/// entity types.
pub trait NotificationGate: Send + Sync {
    /// Enter a suppression scope on this store.
    fn suppress_enter(&self);
    /// Leave a suppression scope; the outermost exit publishes the
    /// consolidated notification if anything was swallowed.
    fn suppress_exit(&self);
}

impl<E: Entity> NotificationGate for EntityStore<E> {
    fn suppress_enter(&self) {
        lock(&self.suppress).depth += 1;
    }

    fn suppress_exit(&self) {
        let fire = {
            let mut state = lock(&self.suppress);
            state.depth = state.depth.saturating_sub(1);
            if state.depth == 0 && state.pending {
                state.pending = false;
                true
            } else {
                false
            }
        };
        if fire {
            self.publish_direct(ChangeEvent::Refreshed);
        }
    }
}

impl<E: Entity> EntityStore<E> {
    /// Suppress this store's notifications until the returned block drops.
    ///
    /// Blocks nest; the consolidated `Refreshed` event fires when the
    /// outermost block is released, and only if events were swallowed.
    #[must_use]
    pub fn block_notifications(&self) -> NotificationBlock<'_> {
        NotificationBlock::new(self)
    }
}

/// Scoped suppression handle for one store.
#[must_use = "notifications stay suppressed only while the block is held"]
pub struct NotificationBlock<'a> {
    gate: &'a dyn NotificationGate,
}

impl<'a> NotificationBlock<'a> {
    fn new(gate: &'a dyn NotificationGate) -> Self {
        gate.suppress_enter();
        Self { gate }
    }
}

impl Drop for NotificationBlock<'_> {
    fn drop(&mut self) {
        self.gate.suppress_exit();
    }
}

/// Suppression scope spanning several stores at once.
///
/// Acquired at the start of a multi-collection operation; each store fires
/// at most one consolidated notification when the scope is released.
#[must_use = "notifications stay suppressed only while the scope is held"]
pub struct SuppressionScope<'a> {
    blocks: Vec<NotificationBlock<'a>>,
}

impl SuppressionScope<'_> {
    /// Number of stores covered by this scope.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the scope covers no stores.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Suppress notifications on all given stores until the scope drops.
pub fn suppress_all<'a, I>(gates: I) -> SuppressionScope<'a>
where
    I: IntoIterator<Item = &'a dyn NotificationGate>,
{
    SuppressionScope {
        blocks: gates.into_iter().map(NotificationBlock::new).collect(),
    }
}

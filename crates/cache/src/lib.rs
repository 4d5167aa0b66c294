//! Identity-preserving entity cache with snapshot reconciliation
//!
//! This crate is the engine forgeview's backends share: it mirrors an
//! external, independently-mutating object graph (Git references, remotes,
//! submodules, CI builds, issues) into long-lived in-process entities and
//! keeps them synchronized via periodic snapshot refreshes.
//!
//! # Overview
//!
//! - [`Entity`] / [`Lifetime`]: long-lived cached objects with stable
//!   identity and a one-way live-to-deleted transition
//! - [`EntityStore`]: thread-safe `Key -> Arc<Entity>` mapping, one lock per
//!   store
//! - [`EntityStore::reconcile`]: the create/update/remove diff-and-apply
//!   pass merging a snapshot set into a store
//! - [`Collection`] / [`Segment`]: refreshable collections and filtered,
//!   storage-free views with scoped fetchers
//! - [`ChangeBus`]: broadcast fan-out of `Added`/`Removed`/`Changed` events,
//!   published only after the store lock is released
//! - [`NotificationBlock`] / [`suppress_all`]: scoped suppression batching
//!   the events of a multi-step operation into one consolidated notification
//!
//! # Identity
//!
//! A refresh never replaces a resident entity: fields are merged in place,
//! so references held by subscribers (UI bindings, event handlers) stay
//! valid and observe the latest data. Once an entity's key disappears from
//! an authoritative snapshot it is marked deleted and removed; deleted
//! entities are never resurrected, and operations against them fail with
//! [`Error::InvalidState`].

mod entity;
mod error;
mod events;
mod reconcile;
mod refresh;
mod store;
mod suppress;

#[cfg(test)]
pub(crate) mod testing;

// Re-export error types at crate root
pub use error::{Error, FetchError, Result};

// Re-export main types
pub use entity::{Entity, Lifetime};
pub use events::{ChangeBus, ChangeEvent, ChangeReceiver};
pub use reconcile::ReconcileOutcome;
pub use refresh::{
    Collection, FetchFn, NullProgress, Progress, ProgressSink, RefreshStage, Segment,
    SnapshotFetch,
};
pub use store::EntityStore;
pub use suppress::{NotificationBlock, NotificationGate, SuppressionScope, suppress_all};

//! Change events and the per-store broadcast bus.
//!
//! Subscribers receive structural changes (`Added`/`Removed`), field-level
//! `Changed` events, consolidated `Refreshed` notifications, and
//! `FetchFailed` signals. Events are published strictly after the owning
//! store's lock has been released, so handlers may re-enter the store.

use crate::entity::Entity;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default capacity of a store's broadcast channel.
const DEFAULT_BUS_CAPACITY: usize = 1024;

/// A change observed during reconciliation or refresh.
pub enum ChangeEvent<E: Entity> {
    /// A previously unseen key appeared in a snapshot set.
    Added(Arc<E>),
    /// A key disappeared from an authoritative snapshot set; the entity has
    /// already been marked deleted.
    Removed(Arc<E>),
    /// A field of an existing entity changed value during a merge.
    Changed {
        /// The entity whose field changed.
        entity: Arc<E>,
        /// Name of the changed field.
        field: &'static str,
    },
    /// Consolidated notification emitted when a suppression scope ends
    /// after swallowing one or more fine-grained events.
    Refreshed,
    /// A refresh's snapshot fetch failed; the store was left untouched.
    FetchFailed {
        /// Human-readable failure description for bound UI.
        message: String,
    },
}

impl<E: Entity> ChangeEvent<E> {
    /// The key of the affected entity, if the event concerns one.
    #[must_use]
    pub fn key(&self) -> Option<E::Key> {
        match self {
            Self::Added(e) | Self::Removed(e) => Some(e.key()),
            Self::Changed { entity, .. } => Some(entity.key()),
            Self::Refreshed | Self::FetchFailed { .. } => None,
        }
    }
}

impl<E: Entity> Clone for ChangeEvent<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Added(e) => Self::Added(Arc::clone(e)),
            Self::Removed(e) => Self::Removed(Arc::clone(e)),
            Self::Changed { entity, field } => Self::Changed {
                entity: Arc::clone(entity),
                field,
            },
            Self::Refreshed => Self::Refreshed,
            Self::FetchFailed { message } => Self::FetchFailed {
                message: message.clone(),
            },
        }
    }
}

impl<E: Entity> fmt::Debug for ChangeEvent<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added(e) => f.debug_tuple("Added").field(&e.key()).finish(),
            Self::Removed(e) => f.debug_tuple("Removed").field(&e.key()).finish(),
            Self::Changed { entity, field } => f
                .debug_struct("Changed")
                .field("key", &entity.key())
                .field("field", field)
                .finish(),
            Self::Refreshed => f.write_str("Refreshed"),
            Self::FetchFailed { message } => f
                .debug_struct("FetchFailed")
                .field("message", message)
                .finish(),
        }
    }
}

/// Fan-out bus delivering [`ChangeEvent`]s to all subscribers of a store.
///
/// Uses tokio's broadcast channel; publishing with no subscribers is a
/// silent no-op.
pub struct ChangeBus<E: Entity> {
    tx: broadcast::Sender<ChangeEvent<E>>,
}

impl<E: Entity> ChangeBus<E> {
    /// Create a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    /// Create a bus with a specific broadcast capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: ChangeEvent<E>) {
        // Send errors only mean there are no subscribers.
        let _ = self.tx.send(event);
    }

    /// Subscribe to events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> ChangeReceiver<E> {
        ChangeReceiver {
            inner: self.tx.subscribe(),
        }
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<E: Entity> Default for ChangeBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> fmt::Debug for ChangeBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeBus")
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

/// Receiver handle for a store's change events.
#[derive(Debug)]
pub struct ChangeReceiver<E: Entity> {
    inner: broadcast::Receiver<ChangeEvent<E>>,
}

impl<E: Entity> ChangeReceiver<E> {
    /// Receive the next event.
    ///
    /// Returns `None` once the owning store has been dropped. May skip
    /// events if the receiver falls behind.
    pub async fn recv(&mut self) -> Option<ChangeEvent<E>> {
        loop {
            match self.inner.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "change receiver lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive an event without waiting.
    ///
    /// Returns `None` if no event is immediately available or the owning
    /// store has been dropped.
    pub fn try_recv(&mut self) -> Option<ChangeEvent<E>> {
        loop {
            match self.inner.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "change receiver lagged, skipped events");
                }
                Err(
                    broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
                ) => {
                    return None;
                }
            }
        }
    }
}

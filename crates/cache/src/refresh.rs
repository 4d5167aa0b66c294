//! Refresh orchestration.
//!
//! A [`Collection`] pairs an [`EntityStore`] with the snapshot fetcher for
//! its scope and drives reconciliation either synchronously or as an async
//! refresh with progress reporting and cancellation. A [`Segment`] is a
//! storage-free filtered view over a parent store whose refresh issues a
//! scoped fetch and feeds the parent, never removing out-of-scope entries.
//!
//! Fetchers are synchronous by contract (process invocation, blocking HTTP
//! read); async refreshes host them on a blocking task and race the join
//! handle against a cancellation token, so a cancelled refresh applies no
//! reconciliation at all.

use crate::entity::Entity;
use crate::error::FetchError;
use crate::events::{ChangeEvent, ChangeReceiver};
use crate::reconcile::ReconcileOutcome;
use crate::store::EntityStore;
use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Fetches the current external state of one collection's scope.
///
/// Implemented by the transport layer (CLI invocation, HTTP client) outside
/// this crate; [`FetchFn`] adapts a plain closure.
pub trait SnapshotFetch<E: Entity>: Send + Sync {
    /// Read the complete (or scoped) current state as snapshot records.
    fn fetch(&self) -> std::result::Result<Vec<E::Snapshot>, FetchError>;
}

/// Adapter turning a closure into a [`SnapshotFetch`] implementation.
pub struct FetchFn<F>(F);

impl<F> FetchFn<F> {
    /// Wrap a closure returning a snapshot vector.
    #[must_use]
    pub fn new(fetch: F) -> Self {
        Self(fetch)
    }
}

impl<E, F> SnapshotFetch<E> for FetchFn<F>
where
    E: Entity,
    F: Fn() -> std::result::Result<Vec<E::Snapshot>, FetchError> + Send + Sync,
{
    fn fetch(&self) -> std::result::Result<Vec<E::Snapshot>, FetchError> {
        (self.0)()
    }
}

/// Refresh phases, in monotone order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RefreshStage {
    /// Waiting on the external fetch.
    Fetching,
    /// Applying the snapshot set to the store.
    Reconciling,
    /// The refresh finished.
    Done,
}

/// A progress report delivered to a [`ProgressSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Current refresh phase.
    pub stage: RefreshStage,
    /// Terminal report flag; set exactly once, with [`RefreshStage::Done`].
    pub completed: bool,
}

/// Consumer of refresh progress reports.
pub trait ProgressSink: Send + Sync {
    /// Accept a monotonically advancing progress report.
    fn report(&self, progress: Progress);
}

/// Sink that discards all reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _progress: Progress) {}
}

async fn run_refresh<E: Entity>(
    store: &EntityStore<E>,
    fetch: Arc<dyn SnapshotFetch<E>>,
    remove_missing: bool,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<ReconcileOutcome> {
    progress.report(Progress {
        stage: RefreshStage::Fetching,
        completed: false,
    });

    let handle = tokio::task::spawn_blocking(move || fetch.fetch());
    let joined = tokio::select! {
        () = cancel.cancelled() => {
            // The blocking fetch keeps running detached; its result is
            // dropped and no reconciliation is applied.
            tracing::debug!("refresh cancelled before fetch completed");
            return Err(Error::Cancelled);
        }
        joined = handle => joined,
    };

    let snapshots = match joined {
        Ok(Ok(snapshots)) => snapshots,
        Ok(Err(err)) => return Err(fetch_failed(store, err)),
        Err(join_err) => {
            // A panicking fetcher is a programming error; re-raise it.
            if join_err.is_panic() {
                std::panic::resume_unwind(join_err.into_panic());
            }
            return Err(Error::Cancelled);
        }
    };

    progress.report(Progress {
        stage: RefreshStage::Reconciling,
        completed: false,
    });
    let outcome = store.reconcile(snapshots, remove_missing);
    progress.report(Progress {
        stage: RefreshStage::Done,
        completed: true,
    });
    Ok(outcome)
}

fn fetch_failed<E: Entity>(store: &EntityStore<E>, err: FetchError) -> Error {
    tracing::warn!(error = %err, "snapshot fetch failed, store left unchanged");
    store.publish_batch(vec![ChangeEvent::FetchFailed {
        message: err.to_string(),
    }]);
    Error::fetch_failed(err)
}

/// One refreshable collection: an entity store plus its snapshot fetcher.
pub struct Collection<E: Entity> {
    store: Arc<EntityStore<E>>,
    fetch: Arc<dyn SnapshotFetch<E>>,
    remove_missing: bool,
}

impl<E: Entity> Collection<E> {
    /// Create a collection whose fetcher is authoritative for the whole
    /// scope (missing keys are removed on refresh).
    #[must_use]
    pub fn new(fetch: Arc<dyn SnapshotFetch<E>>) -> Self {
        Self {
            store: Arc::new(EntityStore::new()),
            fetch,
            remove_missing: true,
        }
    }

    /// Create a collection over an existing store with an explicit
    /// remove-missing policy.
    #[must_use]
    pub fn with_store(
        store: Arc<EntityStore<E>>,
        fetch: Arc<dyn SnapshotFetch<E>>,
        remove_missing: bool,
    ) -> Self {
        Self {
            store,
            fetch,
            remove_missing,
        }
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<EntityStore<E>> {
        &self.store
    }

    /// Indexed lookup; fails with [`Error::KeyNotFound`] on a miss.
    pub fn get(&self, key: &E::Key) -> Result<Arc<E>> {
        self.store.get(key)
    }

    /// Lookup returning `None` on a miss.
    #[must_use]
    pub fn try_get(&self, key: &E::Key) -> Option<Arc<E>> {
        self.store.try_get(key)
    }

    /// Snapshot of the current entity handles.
    #[must_use]
    pub fn entities(&self) -> Vec<Arc<E>> {
        self.store.entities()
    }

    /// Number of resident entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Subscribe to the collection's change events.
    #[must_use]
    pub fn subscribe(&self) -> ChangeReceiver<E> {
        self.store.subscribe()
    }

    /// Blocking refresh: fetch, then reconcile.
    ///
    /// On fetch failure the store is left in its last-known-good state, a
    /// [`ChangeEvent::FetchFailed`] is published for bound UI, and the
    /// error is returned.
    pub fn refresh(&self) -> Result<ReconcileOutcome> {
        match self.fetch.fetch() {
            Ok(snapshots) => Ok(self.store.reconcile(snapshots, self.remove_missing)),
            Err(err) => Err(fetch_failed(&self.store, err)),
        }
    }

    /// Async refresh with progress reporting and cancellation.
    ///
    /// Cancellation aborts before reconciliation: either the full snapshot
    /// set is applied or none of it.
    pub async fn refresh_async(
        &self,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome> {
        run_refresh(
            &self.store,
            Arc::clone(&self.fetch),
            self.remove_missing,
            progress,
            cancel,
        )
        .await
    }

    /// Derive a filtered, storage-free view with its own scoped fetcher.
    #[must_use]
    pub fn segment(
        &self,
        predicate: impl Fn(&E) -> bool + Send + Sync + 'static,
        fetch: Arc<dyn SnapshotFetch<E>>,
    ) -> Segment<E> {
        Segment {
            parent: Arc::clone(&self.store),
            predicate: Arc::new(predicate),
            fetch,
        }
    }
}

impl<E: Entity> fmt::Debug for Collection<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("len", &self.len())
            .field("remove_missing", &self.remove_missing)
            .finish_non_exhaustive()
    }
}

/// Read-only filtered view over a parent store.
///
/// Owns no storage: membership is evaluated live against the parent, so the
/// view can never diverge from it. Refreshing issues the scoped fetch and
/// reconciles into the parent with `remove_missing = false` — a scoped
/// fetch is never authoritative for the whole parent collection.
pub struct Segment<E: Entity> {
    parent: Arc<EntityStore<E>>,
    predicate: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    fetch: Arc<dyn SnapshotFetch<E>>,
}

impl<E: Entity> Segment<E> {
    /// Entities of the parent currently matching the segment predicate.
    #[must_use]
    pub fn entities(&self) -> Vec<Arc<E>> {
        self.parent
            .entities()
            .into_iter()
            .filter(|entity| (self.predicate)(entity))
            .collect()
    }

    /// Lookup within the segment; keys outside the predicate miss.
    #[must_use]
    pub fn try_get(&self, key: &E::Key) -> Option<Arc<E>> {
        self.parent
            .try_get(key)
            .filter(|entity| (self.predicate)(entity))
    }

    /// Number of parent entities matching the predicate.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities().len()
    }

    /// Whether no parent entity matches the predicate.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities().is_empty()
    }

    /// Blocking scoped refresh into the parent store.
    pub fn refresh(&self) -> Result<ReconcileOutcome> {
        match self.fetch.fetch() {
            Ok(snapshots) => Ok(self.parent.reconcile(snapshots, false)),
            Err(err) => Err(fetch_failed(&self.parent, err)),
        }
    }

    /// Async scoped refresh into the parent store.
    pub async fn refresh_async(
        &self,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome> {
        run_refresh(&self.parent, Arc::clone(&self.fetch), false, progress, cancel).await
    }
}

impl<E: Entity> fmt::Debug for Segment<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("parent_len", &self.parent.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestEntity, TestSnapshot};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingProgress {
        reports: Mutex<Vec<Progress>>,
    }

    impl ProgressSink for RecordingProgress {
        fn report(&self, progress: Progress) {
            self.reports.lock().expect("reports lock").push(progress);
        }
    }

    type FetchResult = std::result::Result<Vec<TestSnapshot>, FetchError>;

    fn fetcher(snaps: Vec<TestSnapshot>) -> Arc<dyn SnapshotFetch<TestEntity>> {
        Arc::new(FetchFn::new(move || -> FetchResult { Ok(snaps.clone()) }))
    }

    fn failing_fetcher(message: &str) -> Arc<dyn SnapshotFetch<TestEntity>> {
        let message = message.to_string();
        Arc::new(FetchFn::new(move || -> FetchResult {
            Err(FetchError::message(message.clone()))
        }))
    }

    #[test]
    fn blocking_refresh_reconciles() {
        let collection = Collection::new(fetcher(vec![
            TestSnapshot::new("main", "v1"),
            TestSnapshot::new("dev", "v1"),
        ]));
        let outcome = collection.refresh().expect("refresh");
        assert_eq!(outcome.added, 2);
        assert_eq!(collection.len(), 2);
    }

    #[tokio::test]
    async fn fetch_failure_preserves_state_and_notifies() {
        let collection = Collection::new(fetcher(vec![TestSnapshot::new("main", "v1")]));
        collection.refresh().expect("initial refresh");
        let before = collection.entities();

        let broken = Collection::with_store(
            Arc::clone(collection.store()),
            failing_fetcher("connection refused"),
            true,
        );
        let mut rx = broken.subscribe();

        let err = broken.refresh().unwrap_err();
        assert!(matches!(err, Error::FetchFailed { .. }));

        // Last-known-good state preserved, UI notified.
        assert_eq!(collection.len(), 1);
        assert!(Arc::ptr_eq(&before[0], &collection.entities()[0]));
        match rx.try_recv() {
            Some(ChangeEvent::FetchFailed { message }) => {
                assert_eq!(message, "connection refused");
            }
            other => panic!("expected FetchFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn async_refresh_reports_monotone_progress() {
        let collection = Collection::new(fetcher(vec![TestSnapshot::new("main", "v1")]));
        let progress = RecordingProgress::default();
        let cancel = CancellationToken::new();

        let outcome = collection
            .refresh_async(&progress, &cancel)
            .await
            .expect("refresh");
        assert_eq!(outcome.added, 1);

        let reports = progress.reports.lock().expect("reports lock");
        let stages: Vec<RefreshStage> = reports.iter().map(|r| r.stage).collect();
        assert_eq!(
            stages,
            vec![
                RefreshStage::Fetching,
                RefreshStage::Reconciling,
                RefreshStage::Done
            ]
        );
        assert!(reports.windows(2).all(|w| w[0].stage <= w[1].stage));
        assert!(reports.last().expect("terminal report").completed);
        assert!(reports.iter().filter(|r| r.completed).count() == 1);
    }

    #[tokio::test]
    async fn cancellation_applies_nothing() {
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let slow: Arc<dyn SnapshotFetch<TestEntity>> =
            Arc::new(FetchFn::new(move || -> FetchResult {
                // Block until the test releases us, past the cancellation.
                let _ = release_rx.lock().expect("release lock").recv();
                Ok(vec![TestSnapshot::new("late", "v1")])
            }));

        let collection = Collection::new(slow);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = collection
            .refresh_async(&NullProgress, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(collection.is_empty());

        // Even after the fetch completes, its result was discarded.
        release_tx.send(()).ok();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(collection.is_empty());
    }

    #[tokio::test]
    async fn async_fetch_failure_surfaces() {
        let collection = Collection::<TestEntity>::new(failing_fetcher("boom"));
        let cancel = CancellationToken::new();
        let err = collection
            .refresh_async(&NullProgress, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FetchFailed { .. }));
    }

    #[test]
    fn segment_filters_live_and_never_removes() {
        let collection = Collection::new(fetcher(vec![
            TestSnapshot::new("origin/main", "v1"),
            TestSnapshot::new("origin/dev", "v1"),
            TestSnapshot::new("upstream/main", "v1"),
        ]));
        collection.refresh().expect("refresh");

        let origin = collection.segment(
            |entity: &TestEntity| entity.key().starts_with("origin/"),
            fetcher(vec![TestSnapshot::new("origin/main", "v2")]),
        );
        assert_eq!(origin.len(), 2);
        assert!(origin.try_get(&"upstream/main".to_string()).is_none());

        // Scoped refresh updates in place but removes nothing, not even
        // in-scope keys absent from the scoped snapshot.
        let outcome = origin.refresh().expect("scoped refresh");
        assert_eq!(outcome.removed, 0);
        assert_eq!(collection.len(), 3);
        assert_eq!(origin.len(), 2);
        let main = origin
            .try_get(&"origin/main".to_string())
            .expect("in scope");
        assert_eq!(main.value(), "v2");
    }

    #[test]
    fn segment_membership_tracks_parent() {
        let collection = Collection::new(fetcher(vec![TestSnapshot::new("origin/main", "v1")]));
        collection.refresh().expect("refresh");

        let origin = collection.segment(
            |entity: &TestEntity| entity.key().starts_with("origin/"),
            fetcher(Vec::new()),
        );
        assert_eq!(origin.len(), 1);

        // Parent-side removal is immediately visible through the view.
        collection.store().reconcile(Vec::new(), true);
        assert!(origin.is_empty());
    }
}

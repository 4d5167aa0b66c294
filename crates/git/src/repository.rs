//! Repository context.
//!
//! A [`Repository`] bundles one refreshable collection per reference kind
//! for a single working copy. It is an explicitly constructed, explicitly
//! owned context: callers inject the snapshot fetchers (the CLI transport
//! lives outside this crate) and pass the repository by reference to
//! whatever binds to it. Collections refresh independently; each owns its
//! lock, and no operation holds one collection's lock while touching
//! another.

use crate::branch::Branch;
use crate::refs::RefKind;
use crate::remote::Remote;
use crate::submodule::Submodule;
use crate::tag::Tag;
use forgeview_cache::{
    Collection, NotificationGate, Result, Segment, SnapshotFetch, SuppressionScope, suppress_all,
};
use std::sync::Arc;

/// Snapshot fetchers for every collection a repository mirrors.
pub struct RepositoryFetchers {
    /// Fetches all local and remote-tracking branches.
    pub branches: Arc<dyn SnapshotFetch<Branch>>,
    /// Fetches all tags.
    pub tags: Arc<dyn SnapshotFetch<Tag>>,
    /// Fetches the configured remotes.
    pub remotes: Arc<dyn SnapshotFetch<Remote>>,
    /// Fetches the registered submodules.
    pub submodules: Arc<dyn SnapshotFetch<Submodule>>,
}

/// In-process mirror of one Git repository.
pub struct Repository {
    branches: Collection<Branch>,
    tags: Collection<Tag>,
    remotes: Collection<Remote>,
    submodules: Collection<Submodule>,
}

impl Repository {
    /// Create a repository mirror over the given fetchers.
    #[must_use]
    pub fn new(fetchers: RepositoryFetchers) -> Self {
        Self {
            branches: Collection::new(fetchers.branches),
            tags: Collection::new(fetchers.tags),
            remotes: Collection::new(fetchers.remotes),
            submodules: Collection::new(fetchers.submodules),
        }
    }

    /// The branch collection (local and remote-tracking).
    #[must_use]
    pub fn branches(&self) -> &Collection<Branch> {
        &self.branches
    }

    /// The tag collection.
    #[must_use]
    pub fn tags(&self) -> &Collection<Tag> {
        &self.tags
    }

    /// The remote collection.
    #[must_use]
    pub fn remotes(&self) -> &Collection<Remote> {
        &self.remotes
    }

    /// The submodule collection.
    #[must_use]
    pub fn submodules(&self) -> &Collection<Submodule> {
        &self.submodules
    }

    /// Refresh every collection from its fetcher.
    ///
    /// All collections are attempted even if one fails; the first error is
    /// returned afterwards.
    pub fn refresh_all(&self) -> Result<()> {
        tracing::debug!("refreshing repository mirror");
        let results = [
            self.branches.refresh().map(drop),
            self.tags.refresh().map(drop),
            self.remotes.refresh().map(drop),
            self.submodules.refresh().map(drop),
        ];
        results.into_iter().collect()
    }

    /// Filtered view of the tracking branches of one remote.
    ///
    /// The scoped fetcher (e.g. `for-each-ref refs/remotes/<remote>`) feeds
    /// the shared branch store without ever removing branches outside the
    /// remote's scope.
    #[must_use]
    pub fn remote_branches(
        &self,
        remote: &str,
        fetch: Arc<dyn SnapshotFetch<Branch>>,
    ) -> Segment<Branch> {
        let prefix = format!("{remote}/");
        self.branches.segment(
            move |branch: &Branch| {
                branch.kind() == RefKind::RemoteBranch && branch.name().starts_with(&prefix)
            },
            fetch,
        )
    }

    /// Suppress notifications across the collections a submodule change
    /// touches, for the duration of a multi-step operation.
    ///
    /// Adding or removing a submodule mutates both the submodule collection
    /// and the branch state of the worktree; holding this scope collapses
    /// the intermediate events into one consolidated notification per
    /// collection when it drops, on every exit path.
    #[must_use]
    pub fn submodule_change_scope(&self) -> SuppressionScope<'_> {
        suppress_all([
            self.submodules.store().as_ref() as &dyn NotificationGate,
            self.branches.store().as_ref() as &dyn NotificationGate,
        ])
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("branches", &self.branches.len())
            .field("tags", &self.tags.len())
            .field("remotes", &self.remotes.len())
            .field("submodules", &self.submodules.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::BranchSnapshot;
    use crate::refs::RefKey;
    use crate::remote::RemoteSnapshot;
    use crate::submodule::{SubmoduleSnapshot, SubmoduleState};
    use crate::tag::TagSnapshot;
    use forgeview_cache::{ChangeEvent, Entity, FetchError};
    use std::sync::Mutex;

    /// Fetcher whose snapshot set the test swaps between refreshes.
    struct ScriptedFetch<S> {
        snapshots: Mutex<Vec<S>>,
    }

    impl<S: Clone> ScriptedFetch<S> {
        fn new(snapshots: Vec<S>) -> Arc<Self> {
            Arc::new(Self {
                snapshots: Mutex::new(snapshots),
            })
        }

        fn set(&self, snapshots: Vec<S>) {
            *self.snapshots.lock().expect("snapshots lock") = snapshots;
        }
    }

    impl<E> SnapshotFetch<E> for ScriptedFetch<E::Snapshot>
    where
        E: Entity,
        E::Snapshot: Clone,
    {
        fn fetch(&self) -> std::result::Result<Vec<E::Snapshot>, FetchError> {
            Ok(self.snapshots.lock().expect("snapshots lock").clone())
        }
    }

    fn scripted_repository() -> (
        Repository,
        Arc<ScriptedFetch<BranchSnapshot>>,
        Arc<ScriptedFetch<SubmoduleSnapshot>>,
    ) {
        let branches = ScriptedFetch::new(vec![
            BranchSnapshot::local("main", "aaa111"),
            BranchSnapshot::remote("origin/main", "aaa111"),
            BranchSnapshot::remote("origin/dev", "bbb222"),
            BranchSnapshot::remote("upstream/main", "ccc333"),
        ]);
        let submodules = ScriptedFetch::new(vec![SubmoduleSnapshot::new(
            "vendor/lib",
            "ddd444",
            SubmoduleState::Current,
        )]);
        let repository = Repository::new(RepositoryFetchers {
            branches: branches.clone(),
            tags: ScriptedFetch::new(vec![TagSnapshot::new("v1.0", "aaa111")]),
            remotes: ScriptedFetch::new(vec![
                RemoteSnapshot::new("origin", "https://example.com/repo.git"),
                RemoteSnapshot::new("upstream", "https://example.com/upstream.git"),
            ]),
            submodules: submodules.clone(),
        });
        (repository, branches, submodules)
    }

    #[test]
    fn refresh_all_populates_every_collection() {
        let (repository, _, _) = scripted_repository();
        repository.refresh_all().expect("refresh");

        assert_eq!(repository.branches().len(), 4);
        assert_eq!(repository.tags().len(), 1);
        assert_eq!(repository.remotes().len(), 2);
        assert_eq!(repository.submodules().len(), 1);
    }

    #[test]
    fn branch_identity_survives_refresh_all() {
        let (repository, branches, _) = scripted_repository();
        repository.refresh_all().expect("refresh");

        let main = repository
            .branches()
            .get(&RefKey::local_branch("main"))
            .expect("main resident");

        branches.set(vec![
            BranchSnapshot::local("main", "eee555"),
            BranchSnapshot::remote("origin/main", "eee555"),
        ]);
        repository.refresh_all().expect("refresh");

        let main_after = repository
            .branches()
            .get(&RefKey::local_branch("main"))
            .expect("main resident");
        assert!(Arc::ptr_eq(&main, &main_after));
        assert_eq!(main.target(), "eee555");
        // origin/dev and upstream/main were authoritatively removed.
        assert_eq!(repository.branches().len(), 2);
    }

    #[test]
    fn remote_branches_segment_is_scoped() {
        let (repository, _, _) = scripted_repository();
        repository.refresh_all().expect("refresh");

        let scoped: Arc<dyn SnapshotFetch<Branch>> =
            ScriptedFetch::new(vec![BranchSnapshot::remote("origin/main", "fff666")]);
        let origin = repository.remote_branches("origin", scoped);

        assert_eq!(origin.len(), 2);
        assert!(
            origin
                .try_get(&RefKey::remote_branch("upstream/main"))
                .is_none()
        );

        // The scoped refresh updates origin/main but deletes nothing, not
        // even origin/dev, which the scoped snapshot does not cover.
        origin.refresh().expect("scoped refresh");
        assert_eq!(repository.branches().len(), 4);
        assert_eq!(origin.len(), 2);
        let main = origin
            .try_get(&RefKey::remote_branch("origin/main"))
            .expect("in scope");
        assert_eq!(main.target(), "fff666");
    }

    #[tokio::test]
    async fn submodule_change_scope_consolidates_events() {
        let (repository, branches, submodules) = scripted_repository();
        repository.refresh_all().expect("refresh");

        let mut submodule_rx = repository.submodules().subscribe();
        let mut branch_rx = repository.branches().subscribe();

        {
            let _scope = repository.submodule_change_scope();
            // Step 1: the new submodule appears.
            submodules.set(vec![
                SubmoduleSnapshot::new("vendor/lib", "ddd444", SubmoduleState::Current),
                SubmoduleSnapshot::new("vendor/new", "abc123", SubmoduleState::Uninitialized),
            ]);
            repository.submodules().refresh().expect("refresh");
            // Step 2: the worktree change moves the current branch.
            branches.set(vec![
                BranchSnapshot::local("main", "fff666"),
                BranchSnapshot::remote("origin/main", "aaa111"),
                BranchSnapshot::remote("origin/dev", "bbb222"),
                BranchSnapshot::remote("upstream/main", "ccc333"),
            ]);
            repository.branches().refresh().expect("refresh");

            assert!(submodule_rx.try_recv().is_none());
            assert!(branch_rx.try_recv().is_none());
        }

        assert!(matches!(
            submodule_rx.try_recv(),
            Some(ChangeEvent::Refreshed)
        ));
        assert!(submodule_rx.try_recv().is_none());
        assert!(matches!(branch_rx.try_recv(), Some(ChangeEvent::Refreshed)));
        assert!(branch_rx.try_recv().is_none());
        assert_eq!(repository.submodules().len(), 2);
    }

    #[tokio::test]
    async fn deleted_branch_operations_fail() {
        let (repository, branches, _) = scripted_repository();
        repository.refresh_all().expect("refresh");

        let dev = repository
            .branches()
            .get(&RefKey::remote_branch("origin/dev"))
            .expect("resident");

        branches.set(vec![BranchSnapshot::local("main", "aaa111")]);
        repository.branches().refresh().expect("refresh");

        assert!(dev.lifetime().is_deleted());
        assert!(dev.clear_upstream().is_err());
    }
}

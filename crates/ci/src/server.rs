//! Server connection context.
//!
//! A [`Server`] bundles the collections mirrored from one CI server and
//! issue tracker connection. Snapshot fetchers (the HTTP transport and its
//! response parsing) are injected by the caller; build-type-scoped build
//! lists are exposed as segments over the shared build store so a "builds
//! of this configuration" view never duplicates storage.

use crate::build::Build;
use crate::build_type::BuildType;
use crate::issue::Issue;
use forgeview_cache::{Collection, Result, Segment, SnapshotFetch};
use std::sync::Arc;

/// Snapshot fetchers for every collection a server connection mirrors.
pub struct ServerFetchers {
    /// Fetches all build types visible to the connection.
    pub build_types: Arc<dyn SnapshotFetch<BuildType>>,
    /// Fetches the server-wide build list (the authoritative scope).
    pub builds: Arc<dyn SnapshotFetch<Build>>,
    /// Fetches the issues of the connected tracker project.
    pub issues: Arc<dyn SnapshotFetch<Issue>>,
}

/// In-process mirror of one CI server / issue tracker connection.
pub struct Server {
    build_types: Collection<BuildType>,
    builds: Collection<Build>,
    issues: Collection<Issue>,
}

impl Server {
    /// Create a server mirror over the given fetchers.
    #[must_use]
    pub fn new(fetchers: ServerFetchers) -> Self {
        Self {
            build_types: Collection::new(fetchers.build_types),
            builds: Collection::new(fetchers.builds),
            issues: Collection::new(fetchers.issues),
        }
    }

    /// The build type collection.
    #[must_use]
    pub fn build_types(&self) -> &Collection<BuildType> {
        &self.build_types
    }

    /// The build collection.
    #[must_use]
    pub fn builds(&self) -> &Collection<Build> {
        &self.builds
    }

    /// The issue collection.
    #[must_use]
    pub fn issues(&self) -> &Collection<Issue> {
        &self.issues
    }

    /// Refresh every collection from its fetcher.
    ///
    /// All collections are attempted even if one fails; the first error is
    /// returned afterwards.
    pub fn refresh_all(&self) -> Result<()> {
        tracing::debug!("refreshing server mirror");
        let results = [
            self.build_types.refresh().map(drop),
            self.builds.refresh().map(drop),
            self.issues.refresh().map(drop),
        ];
        results.into_iter().collect()
    }

    /// Filtered view of the builds of one build type.
    ///
    /// The scoped fetcher queries the server for that build type only and
    /// feeds the shared build store; being non-authoritative, it never
    /// removes builds of other build types.
    #[must_use]
    pub fn builds_of(
        &self,
        build_type_id: &str,
        fetch: Arc<dyn SnapshotFetch<Build>>,
    ) -> Segment<Build> {
        let build_type_id = build_type_id.to_string();
        self.builds.segment(
            move |build: &Build| build.build_type_id() == build_type_id,
            fetch,
        )
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("build_types", &self.build_types.len())
            .field("builds", &self.builds.len())
            .field("issues", &self.issues.len())
            .finish()
    }
}

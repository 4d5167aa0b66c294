//! Git repository mirror for forgeview
//!
//! Long-lived, identity-stable mirrors of a repository's branches, tags,
//! remotes and submodules, kept in sync through snapshot reconciliation.
//! The transport that produces snapshot records (a `git` CLI invocation and
//! its output parser) lives outside this crate; callers inject it as
//! [`SnapshotFetch`](forgeview_cache::SnapshotFetch) implementations when
//! constructing a [`Repository`].

pub mod branch;
pub mod refs;
pub mod remote;
pub mod repository;
pub mod submodule;
pub mod tag;

pub use branch::{Branch, BranchSnapshot};
pub use refs::{RefKey, RefKind};
pub use remote::{Remote, RemoteSnapshot};
pub use repository::{Repository, RepositoryFetchers};
pub use submodule::{Submodule, SubmoduleSnapshot, SubmoduleState};
pub use tag::{Tag, TagSnapshot};

//! CI server and issue tracker mirror for forgeview
//!
//! Long-lived, identity-stable mirrors of a CI server's build types and
//! builds and an issue tracker's issues, kept in sync through snapshot
//! reconciliation. The HTTP transport and response parsing live outside
//! this crate; callers inject them as
//! [`SnapshotFetch`](forgeview_cache::SnapshotFetch) implementations when
//! constructing a [`Server`].

pub mod build;
pub mod build_type;
pub mod issue;
pub mod server;

pub use build::{Build, BuildSnapshot, BuildStatus};
pub use build_type::{BuildType, BuildTypeSnapshot};
pub use issue::{Issue, IssueSnapshot, IssueState};
pub use server::{Server, ServerFetchers};

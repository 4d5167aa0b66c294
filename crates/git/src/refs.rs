//! Reference keys.
//!
//! Git references are identified by a composite of short name and namespace
//! kind, so `heads/main` and `tags/main` are distinct cache keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    /// `refs/heads/*`
    LocalBranch,
    /// `refs/remotes/*`
    RemoteBranch,
    /// `refs/tags/*`
    Tag,
}

impl RefKind {
    /// Namespace segment as it appears under `refs/`.
    #[must_use]
    pub const fn namespace(self) -> &'static str {
        match self {
            Self::LocalBranch => "heads",
            Self::RemoteBranch => "remotes",
            Self::Tag => "tags",
        }
    }
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.namespace())
    }
}

/// Composite key for a Git reference: short name plus namespace kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefKey {
    /// Short reference name (e.g. `main`, `origin/main`, `v1.0`).
    pub name: String,
    /// Reference namespace.
    pub kind: RefKind,
}

impl RefKey {
    /// Create a key from a short name and kind.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: RefKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Key for a local branch.
    #[must_use]
    pub fn local_branch(name: impl Into<String>) -> Self {
        Self::new(name, RefKind::LocalBranch)
    }

    /// Key for a remote-tracking branch (`remote/branch`).
    #[must_use]
    pub fn remote_branch(name: impl Into<String>) -> Self {
        Self::new(name, RefKind::RemoteBranch)
    }

    /// Key for a tag.
    #[must_use]
    pub fn tag(name: impl Into<String>) -> Self {
        Self::new(name, RefKind::Tag)
    }

    /// Full reference path under `refs/`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("refs/{}/{}", self.kind.namespace(), self.name)
    }
}

impl fmt::Display for RefKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

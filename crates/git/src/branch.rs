//! Branch entities.

use crate::refs::{RefKey, RefKind};
use forgeview_cache::{Entity, Lifetime, Result};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Parsed read of one branch from a `for-each-ref` style listing.
///
/// `upstream`, `ahead` and `behind` are sparse: a plain listing omits
/// tracking data, and the merge must not regress it to defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchSnapshot {
    /// Short branch name (`main`, `origin/main`).
    pub name: String,
    /// Local or remote-tracking.
    pub kind: RefKind,
    /// Commit id the branch points at.
    pub target: String,
    /// Upstream branch name, when the listing included tracking data.
    #[serde(default)]
    pub upstream: Option<String>,
    /// Commits ahead of upstream, when known.
    #[serde(default)]
    pub ahead: Option<u32>,
    /// Commits behind upstream, when known.
    #[serde(default)]
    pub behind: Option<u32>,
}

impl BranchSnapshot {
    /// Snapshot of a local branch with no tracking data.
    #[must_use]
    pub fn local(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RefKind::LocalBranch,
            target: target.into(),
            upstream: None,
            ahead: None,
            behind: None,
        }
    }

    /// Snapshot of a remote-tracking branch.
    #[must_use]
    pub fn remote(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RefKind::RemoteBranch,
            target: target.into(),
            upstream: None,
            ahead: None,
            behind: None,
        }
    }

    /// Attach tracking data to the snapshot.
    #[must_use]
    pub fn with_tracking(mut self, upstream: impl Into<String>, ahead: u32, behind: u32) -> Self {
        self.upstream = Some(upstream.into());
        self.ahead = Some(ahead);
        self.behind = Some(behind);
        self
    }
}

#[derive(Debug)]
struct BranchFields {
    target: String,
    upstream: Option<String>,
    ahead: Option<u32>,
    behind: Option<u32>,
}

/// A long-lived branch mirror with stable identity across refreshes.
#[derive(Debug)]
pub struct Branch {
    key: RefKey,
    lifetime: Lifetime,
    fields: RwLock<BranchFields>,
}

impl Branch {
    fn read(&self) -> std::sync::RwLockReadGuard<'_, BranchFields> {
        self.fields
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Short branch name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.key.name
    }

    /// Local or remote-tracking.
    #[must_use]
    pub fn kind(&self) -> RefKind {
        self.key.kind
    }

    /// Commit id the branch currently points at.
    #[must_use]
    pub fn target(&self) -> String {
        self.read().target.clone()
    }

    /// Upstream branch name, if tracking data has been observed.
    #[must_use]
    pub fn upstream(&self) -> Option<String> {
        self.read().upstream.clone()
    }

    /// Ahead/behind counts relative to upstream, if known.
    #[must_use]
    pub fn tracking(&self) -> Option<(u32, u32)> {
        let fields = self.read();
        fields.ahead.zip(fields.behind)
    }

    /// Record that the configured upstream no longer exists.
    ///
    /// Fails with `InvalidState` once the branch itself has been deleted.
    pub fn clear_upstream(&self) -> Result<()> {
        self.lifetime.ensure_live(&self.key)?;
        let mut fields = self
            .fields
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        fields.upstream = None;
        fields.ahead = None;
        fields.behind = None;
        Ok(())
    }
}

impl Entity for Branch {
    type Key = RefKey;
    type Snapshot = BranchSnapshot;

    fn key(&self) -> RefKey {
        self.key.clone()
    }

    fn snapshot_key(snapshot: &BranchSnapshot) -> RefKey {
        RefKey::new(snapshot.name.clone(), snapshot.kind)
    }

    fn lifetime(&self) -> &Lifetime {
        &self.lifetime
    }

    fn from_snapshot(snapshot: &BranchSnapshot) -> Self {
        Self {
            key: Self::snapshot_key(snapshot),
            lifetime: Lifetime::new(),
            fields: RwLock::new(BranchFields {
                target: snapshot.target.clone(),
                upstream: snapshot.upstream.clone(),
                ahead: snapshot.ahead,
                behind: snapshot.behind,
            }),
        }
    }

    fn apply_snapshot(&self, snapshot: &BranchSnapshot) -> Vec<&'static str> {
        let mut fields = self
            .fields
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut changed = Vec::new();
        if fields.target != snapshot.target {
            fields.target = snapshot.target.clone();
            changed.push("target");
        }
        if let Some(upstream) = &snapshot.upstream
            && fields.upstream.as_ref() != Some(upstream)
        {
            fields.upstream = Some(upstream.clone());
            changed.push("upstream");
        }
        if let Some(ahead) = snapshot.ahead
            && fields.ahead != Some(ahead)
        {
            fields.ahead = Some(ahead);
            changed.push("ahead");
        }
        if let Some(behind) = snapshot.behind
            && fields.behind != Some(behind)
        {
            fields.behind = Some(behind);
            changed.push("behind");
        }
        changed
    }
}

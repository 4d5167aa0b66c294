//! Issue tracker entities.

use chrono::{DateTime, Utc};
use forgeview_cache::{Entity, Lifetime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::RwLock;

/// Workflow state of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    /// Open and unresolved.
    Open,
    /// Resolved, awaiting verification.
    Resolved,
    /// Closed.
    Closed,
}

impl fmt::Display for IssueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Parsed read of one issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueSnapshot {
    /// Tracker-assigned issue id (e.g. `PRJ-17`).
    pub id: String,
    /// One-line summary.
    pub summary: String,
    /// Workflow state.
    pub state: IssueState,
    /// Assignee login, when assigned.
    #[serde(default)]
    pub assignee: Option<String>,
    /// Last modification time on the tracker, when reported.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl IssueSnapshot {
    /// Snapshot of an unassigned issue.
    #[must_use]
    pub fn new(id: impl Into<String>, summary: impl Into<String>, state: IssueState) -> Self {
        Self {
            id: id.into(),
            summary: summary.into(),
            state,
            assignee: None,
            updated_at: None,
        }
    }
}

#[derive(Debug)]
struct IssueFields {
    summary: String,
    state: IssueState,
    assignee: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

/// A long-lived issue mirror.
#[derive(Debug)]
pub struct Issue {
    id: String,
    lifetime: Lifetime,
    fields: RwLock<IssueFields>,
}

impl Issue {
    fn read(&self) -> std::sync::RwLockReadGuard<'_, IssueFields> {
        self.fields
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Tracker-assigned issue id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// One-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        self.read().summary.clone()
    }

    /// Workflow state.
    #[must_use]
    pub fn state(&self) -> IssueState {
        self.read().state
    }

    /// Assignee login, when assigned.
    #[must_use]
    pub fn assignee(&self) -> Option<String> {
        self.read().assignee.clone()
    }

    /// Last modification time, when known.
    #[must_use]
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.read().updated_at
    }
}

impl Entity for Issue {
    type Key = String;
    type Snapshot = IssueSnapshot;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn snapshot_key(snapshot: &IssueSnapshot) -> String {
        snapshot.id.clone()
    }

    fn lifetime(&self) -> &Lifetime {
        &self.lifetime
    }

    fn from_snapshot(snapshot: &IssueSnapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            lifetime: Lifetime::new(),
            fields: RwLock::new(IssueFields {
                summary: snapshot.summary.clone(),
                state: snapshot.state,
                assignee: snapshot.assignee.clone(),
                updated_at: snapshot.updated_at,
            }),
        }
    }

    fn apply_snapshot(&self, snapshot: &IssueSnapshot) -> Vec<&'static str> {
        let mut fields = self
            .fields
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut changed = Vec::new();
        if fields.summary != snapshot.summary {
            fields.summary = snapshot.summary.clone();
            changed.push("summary");
        }
        if fields.state != snapshot.state {
            fields.state = snapshot.state;
            changed.push("state");
        }
        if let Some(assignee) = &snapshot.assignee
            && fields.assignee.as_ref() != Some(assignee)
        {
            fields.assignee = Some(assignee.clone());
            changed.push("assignee");
        }
        if let Some(updated_at) = snapshot.updated_at
            && fields.updated_at != Some(updated_at)
        {
            fields.updated_at = Some(updated_at);
            changed.push("updated_at");
        }
        changed
    }
}

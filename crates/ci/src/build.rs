//! Build entities.

use chrono::{DateTime, Utc};
use forgeview_cache::{Entity, Lifetime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::RwLock;

/// Lifecycle state of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    /// Waiting for an agent.
    Queued,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Success,
    /// Finished with a failure.
    Failed,
    /// Stopped before finishing.
    Canceled,
}

impl BuildStatus {
    /// Whether the build has reached a terminal state.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Canceled)
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// Parsed read of one build from the CI server's build list.
///
/// Timestamps and the web URL are sparse: a queued-builds poll carries
/// neither, and a running-builds poll has no finish time yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSnapshot {
    /// Server-assigned build id.
    pub id: String,
    /// Id of the build type (configuration) that produced the build.
    pub build_type_id: String,
    /// Build number within its build type.
    pub number: u64,
    /// Current lifecycle state.
    pub status: BuildStatus,
    /// Branch the build ran against, when reported.
    #[serde(default)]
    pub branch: Option<String>,
    /// Start time, when the build has started.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// Finish time, when the build has finished.
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Link to the build's page on the server.
    #[serde(default)]
    pub web_url: Option<String>,
}

impl BuildSnapshot {
    /// Minimal snapshot as a queued-builds poll would report it.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        build_type_id: impl Into<String>,
        number: u64,
        status: BuildStatus,
    ) -> Self {
        Self {
            id: id.into(),
            build_type_id: build_type_id.into(),
            number,
            status,
            branch: None,
            started_at: None,
            finished_at: None,
            web_url: None,
        }
    }

    /// Attach the branch the build ran against.
    #[must_use]
    pub fn on_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }
}

#[derive(Debug)]
struct BuildFields {
    number: u64,
    status: BuildStatus,
    branch: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    web_url: Option<String>,
}

/// A long-lived build mirror with stable identity across polls.
#[derive(Debug)]
pub struct Build {
    id: String,
    build_type_id: String,
    lifetime: Lifetime,
    fields: RwLock<BuildFields>,
}

impl Build {
    fn read(&self) -> std::sync::RwLockReadGuard<'_, BuildFields> {
        self.fields
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Server-assigned build id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Id of the owning build type.
    #[must_use]
    pub fn build_type_id(&self) -> &str {
        &self.build_type_id
    }

    /// Build number within its build type.
    #[must_use]
    pub fn number(&self) -> u64 {
        self.read().number
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> BuildStatus {
        self.read().status
    }

    /// Branch the build ran against, when known.
    #[must_use]
    pub fn branch(&self) -> Option<String> {
        self.read().branch.clone()
    }

    /// Wall-clock duration, once both timestamps are known.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        let fields = self.read();
        match (fields.started_at, fields.finished_at) {
            (Some(start), Some(finish)) => Some(finish - start),
            _ => None,
        }
    }

    /// Link to the build's page, when known.
    #[must_use]
    pub fn web_url(&self) -> Option<String> {
        self.read().web_url.clone()
    }
}

impl Entity for Build {
    type Key = String;
    type Snapshot = BuildSnapshot;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn snapshot_key(snapshot: &BuildSnapshot) -> String {
        snapshot.id.clone()
    }

    fn lifetime(&self) -> &Lifetime {
        &self.lifetime
    }

    fn from_snapshot(snapshot: &BuildSnapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            build_type_id: snapshot.build_type_id.clone(),
            lifetime: Lifetime::new(),
            fields: RwLock::new(BuildFields {
                number: snapshot.number,
                status: snapshot.status,
                branch: snapshot.branch.clone(),
                started_at: snapshot.started_at,
                finished_at: snapshot.finished_at,
                web_url: snapshot.web_url.clone(),
            }),
        }
    }

    fn apply_snapshot(&self, snapshot: &BuildSnapshot) -> Vec<&'static str> {
        let mut fields = self
            .fields
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut changed = Vec::new();
        if fields.number != snapshot.number {
            fields.number = snapshot.number;
            changed.push("number");
        }
        if fields.status != snapshot.status {
            fields.status = snapshot.status;
            changed.push("status");
        }
        if let Some(branch) = &snapshot.branch
            && fields.branch.as_ref() != Some(branch)
        {
            fields.branch = Some(branch.clone());
            changed.push("branch");
        }
        if let Some(started_at) = snapshot.started_at
            && fields.started_at != Some(started_at)
        {
            fields.started_at = Some(started_at);
            changed.push("started_at");
        }
        if let Some(finished_at) = snapshot.finished_at
            && fields.finished_at != Some(finished_at)
        {
            fields.finished_at = Some(finished_at);
            changed.push("finished_at");
        }
        if let Some(web_url) = &snapshot.web_url
            && fields.web_url.as_ref() != Some(web_url)
        {
            fields.web_url = Some(web_url.clone());
            changed.push("web_url");
        }
        changed
    }
}

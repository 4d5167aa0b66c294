//! Build type (build configuration) entities.

use forgeview_cache::{Entity, Lifetime};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Parsed read of one build type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildTypeSnapshot {
    /// Server-wide build type id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Project the build type belongs to.
    pub project: String,
    /// Whether triggering is paused.
    #[serde(default)]
    pub paused: bool,
}

impl BuildTypeSnapshot {
    /// Snapshot of an active build type.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        project: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            project: project.into(),
            paused: false,
        }
    }
}

#[derive(Debug)]
struct BuildTypeFields {
    name: String,
    project: String,
    paused: bool,
}

/// A long-lived build type mirror.
#[derive(Debug)]
pub struct BuildType {
    id: String,
    lifetime: Lifetime,
    fields: RwLock<BuildTypeFields>,
}

impl BuildType {
    fn read(&self) -> std::sync::RwLockReadGuard<'_, BuildTypeFields> {
        self.fields
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Server-wide build type id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> String {
        self.read().name.clone()
    }

    /// Owning project.
    #[must_use]
    pub fn project(&self) -> String {
        self.read().project.clone()
    }

    /// Whether triggering is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.read().paused
    }
}

impl Entity for BuildType {
    type Key = String;
    type Snapshot = BuildTypeSnapshot;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn snapshot_key(snapshot: &BuildTypeSnapshot) -> String {
        snapshot.id.clone()
    }

    fn lifetime(&self) -> &Lifetime {
        &self.lifetime
    }

    fn from_snapshot(snapshot: &BuildTypeSnapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            lifetime: Lifetime::new(),
            fields: RwLock::new(BuildTypeFields {
                name: snapshot.name.clone(),
                project: snapshot.project.clone(),
                paused: snapshot.paused,
            }),
        }
    }

    fn apply_snapshot(&self, snapshot: &BuildTypeSnapshot) -> Vec<&'static str> {
        let mut fields = self
            .fields
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut changed = Vec::new();
        if fields.name != snapshot.name {
            fields.name = snapshot.name.clone();
            changed.push("name");
        }
        if fields.project != snapshot.project {
            fields.project = snapshot.project.clone();
            changed.push("project");
        }
        if fields.paused != snapshot.paused {
            fields.paused = snapshot.paused;
            changed.push("paused");
        }
        changed
    }
}

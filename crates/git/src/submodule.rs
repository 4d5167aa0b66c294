//! Submodule entities.

use forgeview_cache::{Entity, Lifetime, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::RwLock;

/// Working-tree state of a submodule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmoduleState {
    /// Checked out at the commit the superproject records.
    Current,
    /// Checked out at a different commit.
    Modified,
    /// Registered but not initialized.
    Uninitialized,
    /// Has merge conflicts.
    Conflicted,
}

impl fmt::Display for SubmoduleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Current => "current",
            Self::Modified => "modified",
            Self::Uninitialized => "uninitialized",
            Self::Conflicted => "conflicted",
        };
        f.write_str(s)
    }
}

/// Parsed read of one submodule from `submodule status` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmoduleSnapshot {
    /// Path of the submodule within the superproject.
    pub path: String,
    /// Commit the superproject records for the submodule.
    pub head_id: String,
    /// Clone URL, when the listing included configuration.
    #[serde(default)]
    pub url: Option<String>,
    /// Working-tree state.
    pub state: SubmoduleState,
}

impl SubmoduleSnapshot {
    /// Snapshot without configuration data.
    #[must_use]
    pub fn new(path: impl Into<String>, head_id: impl Into<String>, state: SubmoduleState) -> Self {
        Self {
            path: path.into(),
            head_id: head_id.into(),
            url: None,
            state,
        }
    }
}

#[derive(Debug)]
struct SubmoduleFields {
    head_id: String,
    url: Option<String>,
    state: SubmoduleState,
}

/// A long-lived submodule mirror, keyed by its path in the superproject.
#[derive(Debug)]
pub struct Submodule {
    path: String,
    lifetime: Lifetime,
    fields: RwLock<SubmoduleFields>,
}

impl Submodule {
    fn read(&self) -> std::sync::RwLockReadGuard<'_, SubmoduleFields> {
        self.fields
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Path within the superproject.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Commit the superproject records.
    #[must_use]
    pub fn head_id(&self) -> String {
        self.read().head_id.clone()
    }

    /// Clone URL, if configuration has been observed.
    #[must_use]
    pub fn url(&self) -> Option<String> {
        self.read().url.clone()
    }

    /// Current working-tree state.
    #[must_use]
    pub fn state(&self) -> SubmoduleState {
        self.read().state
    }

    /// Record a locally observed state change (e.g. after an update ran).
    ///
    /// Fails with `InvalidState` once the submodule has been deregistered.
    pub fn set_state(&self, state: SubmoduleState) -> Result<()> {
        self.lifetime.ensure_live(&self.path)?;
        self.fields
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .state = state;
        Ok(())
    }
}

impl Entity for Submodule {
    type Key = String;
    type Snapshot = SubmoduleSnapshot;

    fn key(&self) -> String {
        self.path.clone()
    }

    fn snapshot_key(snapshot: &SubmoduleSnapshot) -> String {
        snapshot.path.clone()
    }

    fn lifetime(&self) -> &Lifetime {
        &self.lifetime
    }

    fn from_snapshot(snapshot: &SubmoduleSnapshot) -> Self {
        Self {
            path: snapshot.path.clone(),
            lifetime: Lifetime::new(),
            fields: RwLock::new(SubmoduleFields {
                head_id: snapshot.head_id.clone(),
                url: snapshot.url.clone(),
                state: snapshot.state,
            }),
        }
    }

    fn apply_snapshot(&self, snapshot: &SubmoduleSnapshot) -> Vec<&'static str> {
        let mut fields = self
            .fields
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut changed = Vec::new();
        if fields.head_id != snapshot.head_id {
            fields.head_id = snapshot.head_id.clone();
            changed.push("head_id");
        }
        if let Some(url) = &snapshot.url
            && fields.url.as_ref() != Some(url)
        {
            fields.url = Some(url.clone());
            changed.push("url");
        }
        if fields.state != snapshot.state {
            fields.state = snapshot.state;
            changed.push("state");
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_state_respects_lifetime() {
        let submodule = Submodule::from_snapshot(&SubmoduleSnapshot::new(
            "vendor/lib",
            "aaa111",
            SubmoduleState::Current,
        ));
        submodule
            .set_state(SubmoduleState::Modified)
            .expect("live submodule");
        assert_eq!(submodule.state(), SubmoduleState::Modified);

        submodule.lifetime().mark_deleted();
        assert!(submodule.set_state(SubmoduleState::Current).is_err());
        assert_eq!(submodule.state(), SubmoduleState::Modified);
    }

    #[test]
    fn url_is_sparse() {
        let submodule = Submodule::from_snapshot(&SubmoduleSnapshot {
            path: "vendor/lib".into(),
            head_id: "aaa111".into(),
            url: Some("https://example.com/lib.git".into()),
            state: SubmoduleState::Current,
        });

        let changed = submodule.apply_snapshot(&SubmoduleSnapshot::new(
            "vendor/lib",
            "bbb222",
            SubmoduleState::Current,
        ));
        assert_eq!(changed, vec!["head_id"]);
        assert_eq!(
            submodule.url().as_deref(),
            Some("https://example.com/lib.git")
        );
    }
}

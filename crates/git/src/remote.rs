//! Remote entities.

use forgeview_cache::{Entity, Lifetime};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Parsed read of one configured remote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    /// Remote name (`origin`, `upstream`).
    pub name: String,
    /// Fetch URL.
    pub fetch_url: String,
    /// Push URL, when it differs from the fetch URL.
    #[serde(default)]
    pub push_url: Option<String>,
}

impl RemoteSnapshot {
    /// Snapshot with matching fetch and push URLs.
    #[must_use]
    pub fn new(name: impl Into<String>, fetch_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fetch_url: fetch_url.into(),
            push_url: None,
        }
    }
}

#[derive(Debug)]
struct RemoteFields {
    fetch_url: String,
    push_url: Option<String>,
}

/// A long-lived remote mirror.
#[derive(Debug)]
pub struct Remote {
    name: String,
    lifetime: Lifetime,
    fields: RwLock<RemoteFields>,
}

impl Remote {
    fn read(&self) -> std::sync::RwLockReadGuard<'_, RemoteFields> {
        self.fields
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Remote name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fetch URL.
    #[must_use]
    pub fn fetch_url(&self) -> String {
        self.read().fetch_url.clone()
    }

    /// Effective push URL (falls back to the fetch URL).
    #[must_use]
    pub fn push_url(&self) -> String {
        let fields = self.read();
        fields
            .push_url
            .clone()
            .unwrap_or_else(|| fields.fetch_url.clone())
    }
}

impl Entity for Remote {
    type Key = String;
    type Snapshot = RemoteSnapshot;

    fn key(&self) -> String {
        self.name.clone()
    }

    fn snapshot_key(snapshot: &RemoteSnapshot) -> String {
        snapshot.name.clone()
    }

    fn lifetime(&self) -> &Lifetime {
        &self.lifetime
    }

    fn from_snapshot(snapshot: &RemoteSnapshot) -> Self {
        Self {
            name: snapshot.name.clone(),
            lifetime: Lifetime::new(),
            fields: RwLock::new(RemoteFields {
                fetch_url: snapshot.fetch_url.clone(),
                push_url: snapshot.push_url.clone(),
            }),
        }
    }

    fn apply_snapshot(&self, snapshot: &RemoteSnapshot) -> Vec<&'static str> {
        let mut fields = self
            .fields
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut changed = Vec::new();
        if fields.fetch_url != snapshot.fetch_url {
            fields.fetch_url = snapshot.fetch_url.clone();
            changed.push("fetch_url");
        }
        if let Some(push_url) = &snapshot.push_url
            && fields.push_url.as_ref() != Some(push_url)
        {
            fields.push_url = Some(push_url.clone());
            changed.push("push_url");
        }
        changed
    }
}

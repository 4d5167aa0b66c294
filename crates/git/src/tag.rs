//! Tag entities.

use crate::refs::RefKey;
use forgeview_cache::{Entity, Lifetime};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Parsed read of one tag.
///
/// Peel data and the annotation subject are sparse: lightweight tags have
/// neither, and a fast listing may omit both for annotated tags too.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagSnapshot {
    /// Short tag name.
    pub name: String,
    /// Object id the tag ref points at.
    pub target: String,
    /// Commit id an annotated tag peels to, when known.
    #[serde(default)]
    pub peeled: Option<String>,
    /// First line of the annotation message, when known.
    #[serde(default)]
    pub subject: Option<String>,
}

impl TagSnapshot {
    /// Snapshot of a lightweight tag (or one listed without peel data).
    #[must_use]
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            peeled: None,
            subject: None,
        }
    }

    /// Attach annotation data to the snapshot.
    #[must_use]
    pub fn annotated(mut self, peeled: impl Into<String>, subject: impl Into<String>) -> Self {
        self.peeled = Some(peeled.into());
        self.subject = Some(subject.into());
        self
    }
}

#[derive(Debug)]
struct TagFields {
    target: String,
    peeled: Option<String>,
    subject: Option<String>,
}

/// A long-lived tag mirror.
#[derive(Debug)]
pub struct Tag {
    key: RefKey,
    lifetime: Lifetime,
    fields: RwLock<TagFields>,
}

impl Tag {
    fn read(&self) -> std::sync::RwLockReadGuard<'_, TagFields> {
        self.fields
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Short tag name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.key.name
    }

    /// Object id the tag ref points at.
    #[must_use]
    pub fn target(&self) -> String {
        self.read().target.clone()
    }

    /// Commit id the tag peels to; for lightweight tags, the target itself.
    #[must_use]
    pub fn peeled_target(&self) -> String {
        let fields = self.read();
        fields.peeled.clone().unwrap_or_else(|| fields.target.clone())
    }

    /// Annotation subject, if the tag is annotated and it has been read.
    #[must_use]
    pub fn subject(&self) -> Option<String> {
        self.read().subject.clone()
    }
}

impl Entity for Tag {
    type Key = RefKey;
    type Snapshot = TagSnapshot;

    fn key(&self) -> RefKey {
        self.key.clone()
    }

    fn snapshot_key(snapshot: &TagSnapshot) -> RefKey {
        RefKey::tag(snapshot.name.clone())
    }

    fn lifetime(&self) -> &Lifetime {
        &self.lifetime
    }

    fn from_snapshot(snapshot: &TagSnapshot) -> Self {
        Self {
            key: Self::snapshot_key(snapshot),
            lifetime: Lifetime::new(),
            fields: RwLock::new(TagFields {
                target: snapshot.target.clone(),
                peeled: snapshot.peeled.clone(),
                subject: snapshot.subject.clone(),
            }),
        }
    }

    fn apply_snapshot(&self, snapshot: &TagSnapshot) -> Vec<&'static str> {
        let mut fields = self
            .fields
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut changed = Vec::new();
        if fields.target != snapshot.target {
            fields.target = snapshot.target.clone();
            changed.push("target");
        }
        if let Some(peeled) = &snapshot.peeled
            && fields.peeled.as_ref() != Some(peeled)
        {
            fields.peeled = Some(peeled.clone());
            changed.push("peeled");
        }
        if let Some(subject) = &snapshot.subject
            && fields.subject.as_ref() != Some(subject)
        {
            fields.subject = Some(subject.clone());
            changed.push("subject");
        }
        changed
    }
}

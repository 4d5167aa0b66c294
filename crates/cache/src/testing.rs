//! Shared test fixtures for the engine's unit tests.

use crate::entity::{Entity, Lifetime};
use std::sync::RwLock;

/// Snapshot record for [`TestEntity`]; `note` is a sparse field.
#[derive(Debug, Clone)]
pub struct TestSnapshot {
    pub key: String,
    pub value: String,
    pub note: Option<String>,
}

impl TestSnapshot {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[derive(Debug)]
struct TestFields {
    value: String,
    note: Option<String>,
}

/// Minimal entity used by the engine's own tests.
#[derive(Debug)]
pub struct TestEntity {
    key: String,
    lifetime: Lifetime,
    fields: RwLock<TestFields>,
}

impl TestEntity {
    pub fn value(&self) -> String {
        self.fields.read().expect("fields lock").value.clone()
    }

    pub fn note(&self) -> Option<String> {
        self.fields.read().expect("fields lock").note.clone()
    }
}

impl Entity for TestEntity {
    type Key = String;
    type Snapshot = TestSnapshot;

    fn key(&self) -> String {
        self.key.clone()
    }

    fn snapshot_key(snapshot: &TestSnapshot) -> String {
        snapshot.key.clone()
    }

    fn lifetime(&self) -> &Lifetime {
        &self.lifetime
    }

    fn from_snapshot(snapshot: &TestSnapshot) -> Self {
        Self {
            key: snapshot.key.clone(),
            lifetime: Lifetime::new(),
            fields: RwLock::new(TestFields {
                value: snapshot.value.clone(),
                note: snapshot.note.clone(),
            }),
        }
    }

    fn apply_snapshot(&self, snapshot: &TestSnapshot) -> Vec<&'static str> {
        let mut fields = self.fields.write().expect("fields lock");
        let mut changed = Vec::new();
        if fields.value != snapshot.value {
            fields.value = snapshot.value.clone();
            changed.push("value");
        }
        if let Some(note) = &snapshot.note
            && fields.note.as_ref() != Some(note)
        {
            fields.note = Some(note.clone());
            changed.push("note");
        }
        changed
    }
}

use serde::{Deserialize, Serialize};

use super::EntityKey;

/// A typed edge between two entities in the same snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: EntityKey,
    pub target: EntityKey,
    pub kind: String,
}

impl Relationship {
    pub fn new(source: EntityKey, target: EntityKey, kind: impl Into<String>) -> Self {
        Self {
            source,
            target,
            kind: kind.into(),
        }
    }

    pub fn touches(&self, key: &EntityKey) -> bool {
        &self.source == key || &self.target == key
    }
}

/// A named reference emitted during extraction, resolved against the
/// snapshot's entities in a second pass before it becomes a [`Relationship`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnresolvedReference {
    pub source: EntityKey,
    /// Bare target name as it appeared in source, e.g. `"Order"`.
    pub target_name: String,
    pub kind: String,
}

impl UnresolvedReference {
    pub fn new(source: EntityKey, target_name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            source,
            target_name: target_name.into(),
            kind: kind.into(),
        }
    }
}

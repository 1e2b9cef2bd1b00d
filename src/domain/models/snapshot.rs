use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Entity, EntityKey, EntityKind, Relationship};

/// The complete, versioned entity/relationship set from one successful
/// pipeline pass. Immutable once committed; readers hold an `Arc` to it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u64,
    #[serde(with = "entity_map")]
    pub entities: BTreeMap<EntityKey, Entity>,
    pub relationships: Vec<Relationship>,
    pub generated_at: u64,
}

/// JSON object keys must be strings, so the entity map is persisted keyed
/// by the `repo/kind/name` form of `EntityKey` (its `Display` output).
mod entity_map {
    use std::collections::BTreeMap;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{Entity, EntityKey, EntityKind};

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<EntityKey, Entity>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(map.iter().map(|(k, v)| (k.to_string(), v)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<EntityKey, Entity>, D::Error> {
        let raw = BTreeMap::<String, Entity>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(k, v)| {
                let mut parts = k.splitn(3, '/');
                match (parts.next(), parts.next().and_then(EntityKind::parse), parts.next()) {
                    (Some(repo), Some(kind), Some(name)) => {
                        Ok((EntityKey::new(repo, kind, name), v))
                    }
                    _ => Err(D::Error::custom(format!("invalid entity key: {k}"))),
                }
            })
            .collect()
    }
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &EntityKey) -> Option<&Entity> {
        self.entities.get(key)
    }

    pub fn list_by_kind(&self, kind: EntityKind) -> Vec<&Entity> {
        self.entities
            .values()
            .filter(|e| e.kind() == kind)
            .collect()
    }

    /// Relationships where the given entity appears on either side.
    pub fn relationships_of(&self, key: &EntityKey) -> Vec<&Relationship> {
        self.relationships.iter().filter(|r| r.touches(key)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn summary(&self) -> SnapshotSummary {
        let mut by_kind = BTreeMap::new();
        for entity in self.entities.values() {
            *by_kind.entry(entity.kind()).or_insert(0usize) += 1;
        }
        let mut repos: Vec<String> = self
            .entities
            .values()
            .map(|e| e.repo().to_string())
            .collect();
        repos.sort();
        repos.dedup();

        SnapshotSummary {
            version: self.version,
            total_entities: self.entities.len(),
            total_relationships: self.relationships.len(),
            entities_by_kind: by_kind,
            repositories: repos,
            generated_at: self.generated_at,
        }
    }
}

/// Headline counts for a snapshot, exposed on the API and written with
/// the snapshot artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub version: u64,
    pub total_entities: usize,
    pub total_relationships: usize,
    pub entities_by_kind: BTreeMap<EntityKind, usize>,
    pub repositories: Vec<String>,
    pub generated_at: u64,
}

/// Nodes-and-edges view of a snapshot for graph export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphExport {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub key: EntityKey,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: EntityKey,
    pub target: EntityKey,
    pub kind: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::DependencyEntity;

    fn dep(repo: &str, name: &str) -> Entity {
        Entity::Dependency(DependencyEntity {
            name: name.to_string(),
            ecosystem: "pypi".to_string(),
            version: "1.0".to_string(),
            dep_kind: "direct".to_string(),
            repo: repo.to_string(),
        })
    }

    #[test]
    fn summary_counts_by_kind_and_repo() {
        let mut snapshot = Snapshot::empty();
        for entity in [dep("a", "requests"), dep("b", "requests"), dep("a", "flask")] {
            snapshot.entities.insert(entity.key(), entity);
        }
        let summary = snapshot.summary();
        assert_eq!(summary.total_entities, 3);
        assert_eq!(summary.entities_by_kind[&EntityKind::Dependency], 3);
        assert_eq!(summary.repositories, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn same_dependency_in_two_repos_stays_separate() {
        let mut snapshot = Snapshot::empty();
        for entity in [dep("a", "requests"), dep("b", "requests")] {
            snapshot.entities.insert(entity.key(), entity);
        }
        assert_eq!(snapshot.list_by_kind(EntityKind::Dependency).len(), 2);
    }
}

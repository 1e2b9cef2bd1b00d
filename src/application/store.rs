use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::application::extraction::resolve_relationships;
use crate::domain::{
    unix_now, DomainError, Entity, EntityBatch, EntityKey, EntityKind, GraphEdge, GraphExport,
    GraphNode, Provenance, Relationship, Snapshot, SnapshotSummary,
};

/// In-memory knowledge base with copy-on-commit snapshots.
///
/// Readers clone an `Arc<Snapshot>` and never observe a half-built state:
/// a commit assembles the next snapshot off to the side and swaps it in
/// under a short write lock. Entities with the same key are merged with
/// order-independent rules; LLM-sourced descriptions win over pattern ones.
pub struct KnowledgeStore {
    current: RwLock<Arc<Snapshot>>,
}

impl Default for KnowledgeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KnowledgeStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot::empty())),
        }
    }

    pub async fn current(&self) -> Arc<Snapshot> {
        self.current.read().await.clone()
    }

    /// Replace the knowledge base with the result of a full extraction pass.
    /// Returns the committed snapshot.
    pub async fn commit(&self, batch: EntityBatch) -> Result<Arc<Snapshot>, DomainError> {
        for warning in &batch.warnings {
            warn!(warning, "extraction warning");
        }

        let entities = merge_entities(batch.entities);
        let relationships = resolve_relationships(&entities);

        let next = {
            let previous = self.current.read().await;
            Arc::new(Snapshot {
                version: previous.version + 1,
                entities,
                relationships,
                generated_at: unix_now(),
            })
        };

        let mut slot = self.current.write().await;
        *slot = next.clone();
        info!(
            version = next.version,
            entities = next.entities.len(),
            relationships = next.relationships.len(),
            "snapshot committed"
        );
        Ok(next)
    }

    /// Install a previously persisted snapshot, e.g. at startup. Keeps the
    /// snapshot's own version so later commits continue the sequence.
    pub async fn restore(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let restored = Arc::new(snapshot);
        let mut slot = self.current.write().await;
        *slot = restored.clone();
        info!(version = restored.version, entities = restored.len(), "snapshot restored");
        restored
    }

    pub async fn get(&self, key: &EntityKey) -> Result<Entity, DomainError> {
        self.current()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| DomainError::not_found(key.to_string()))
    }

    pub async fn list_by_kind(&self, kind: EntityKind) -> Vec<Entity> {
        self.current()
            .await
            .list_by_kind(kind)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn relationships_of(&self, key: &EntityKey) -> Vec<Relationship> {
        self.current()
            .await
            .relationships_of(key)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn summary(&self) -> SnapshotSummary {
        self.current().await.summary()
    }

    pub async fn graph(&self) -> GraphExport {
        let snapshot = self.current().await;
        GraphExport {
            nodes: snapshot
                .entities
                .iter()
                .map(|(key, entity)| GraphNode {
                    key: key.clone(),
                    description: entity.description().to_string(),
                })
                .collect(),
            edges: snapshot
                .relationships
                .iter()
                .map(|r| GraphEdge {
                    source: r.source.clone(),
                    target: r.target.clone(),
                    kind: r.kind.clone(),
                })
                .collect(),
        }
    }
}

/// Collapse extraction output into one entity per key. The result does not
/// depend on input order: entries are canonically sorted before folding and
/// every collection inside an entity is name-sorted afterwards.
fn merge_entities(mut entries: Vec<(Entity, Provenance)>) -> BTreeMap<EntityKey, Entity> {
    entries.sort_by_cached_key(|(entity, provenance)| {
        let rank = match provenance {
            Provenance::Pattern => 0u8,
            Provenance::Llm => 1,
        };
        let body = serde_json::to_string(entity).unwrap_or_default();
        (entity.key(), rank, body)
    });

    let mut merged: BTreeMap<EntityKey, (Entity, Provenance)> = BTreeMap::new();
    for (entity, provenance) in entries {
        let key = entity.key();
        match merged.get_mut(&key) {
            Some((existing, _)) => merge_into(existing, entity, provenance),
            None => {
                merged.insert(key, (entity, provenance));
            }
        }
    }

    merged
        .into_iter()
        .map(|(key, (mut entity, _))| {
            canonicalize(&mut entity);
            (key, entity)
        })
        .collect()
}

/// Non-empty scalar wins; an LLM-sourced non-empty value overrides.
fn merge_scalar(existing: &mut String, incoming: String, incoming_provenance: Provenance) {
    if existing.is_empty() || (incoming_provenance == Provenance::Llm && !incoming.is_empty()) {
        if !incoming.is_empty() {
            *existing = incoming;
        }
    }
}

fn merge_into(existing: &mut Entity, incoming: Entity, provenance: Provenance) {
    match (existing, incoming) {
        (Entity::Schema(a), Entity::Schema(b)) => {
            merge_scalar(&mut a.description, b.description, provenance);
            merge_scalar(&mut a.source_file, b.source_file, Provenance::Pattern);
            for field in b.fields {
                match a.fields.iter_mut().find(|f| f.name == field.name) {
                    Some(slot) => {
                        merge_scalar(&mut slot.field_type, field.field_type, provenance);
                        merge_scalar(&mut slot.description, field.description, provenance);
                        for constraint in field.constraints {
                            if !slot.constraints.contains(&constraint) {
                                slot.constraints.push(constraint);
                            }
                        }
                        slot.nullable = slot.nullable && field.nullable;
                    }
                    None => a.fields.push(field),
                }
            }
            for relation in b.relationships {
                if !a.relationships.contains(&relation) {
                    a.relationships.push(relation);
                }
            }
        }
        (Entity::Service(a), Entity::Service(b)) => {
            merge_scalar(&mut a.description, b.description, provenance);
            merge_scalar(&mut a.source_file, b.source_file, Provenance::Pattern);
            for method in b.methods {
                match a.methods.iter_mut().find(|m| m.name == method.name) {
                    Some(slot) => {
                        merge_scalar(&mut slot.returns, method.returns, provenance);
                        merge_scalar(&mut slot.description, method.description, provenance);
                        if slot.params.is_empty() {
                            slot.params = method.params;
                        }
                    }
                    None => a.methods.push(method),
                }
            }
            for dependency in b.dependencies {
                if !a.dependencies.contains(&dependency) {
                    a.dependencies.push(dependency);
                }
            }
        }
        (Entity::Api(a), Entity::Api(b)) => {
            merge_scalar(&mut a.description, b.description, provenance);
            merge_scalar(&mut a.handler, b.handler, provenance);
            merge_scalar(&mut a.source_file, b.source_file, Provenance::Pattern);
            for param in b.params {
                if !a.params.iter().any(|p| p.name == param.name) {
                    a.params.push(param);
                }
            }
        }
        (Entity::Dependency(a), Entity::Dependency(b)) => {
            merge_scalar(&mut a.version, b.version, provenance);
            // A direct declaration outranks a dev one.
            if a.dep_kind != "direct" && b.dep_kind == "direct" {
                a.dep_kind = b.dep_kind;
            }
        }
        (Entity::DataFlow(a), Entity::DataFlow(b)) => {
            merge_scalar(&mut a.description, b.description, provenance);
            merge_scalar(&mut a.flow_kind, b.flow_kind, provenance);
        }
        (Entity::Context(a), Entity::Context(b)) => {
            merge_scalar(&mut a.purpose, b.purpose, provenance);
            merge_scalar(&mut a.domain, b.domain, provenance);
            merge_scalar(&mut a.markdown, b.markdown, provenance);
            if a.when_to_use.is_empty() {
                a.when_to_use = b.when_to_use;
            }
        }
        // Same key implies same kind; mismatches can only come from a bug
        // in key construction, so keep the existing entity.
        (existing, incoming) => {
            warn!(key = %existing.key(), incoming = %incoming.kind(), "kind mismatch during merge");
        }
    }
}

/// Sort every nested collection so merged entities compare equal no matter
/// what order their parts arrived in.
fn canonicalize(entity: &mut Entity) {
    match entity {
        Entity::Schema(s) => {
            s.fields.sort_by(|a, b| a.name.cmp(&b.name));
            for field in &mut s.fields {
                field.constraints.sort();
            }
            s.relationships
                .sort_by(|a, b| (&a.target, &a.kind).cmp(&(&b.target, &b.kind)));
        }
        Entity::Service(s) => {
            s.methods.sort_by(|a, b| a.name.cmp(&b.name));
            s.dependencies.sort();
        }
        Entity::Api(a) => {
            a.params.sort_by(|x, y| x.name.cmp(&y.name));
        }
        Entity::Context(c) => {
            c.when_to_use.sort();
        }
        Entity::Dependency(_) | Entity::DataFlow(_) => {}
    }
}

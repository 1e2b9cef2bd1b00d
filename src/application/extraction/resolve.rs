use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::domain::{Entity, EntityKey, EntityKind, Relationship, UnresolvedReference};

/// Second extraction pass: turn the bare names entities carry (schema
/// relation targets, service dependency lists, data-flow endpoints) into
/// typed edges between snapshot keys.
///
/// Resolution order: exact name in the same repository, case-insensitive
/// name in the same repository, then a cross-repo match only when the name
/// is globally unique. References that still miss are dropped.
pub fn resolve_relationships(entities: &BTreeMap<EntityKey, Entity>) -> Vec<Relationship> {
    let resolver = NameResolver::build(entities);

    let mut edges = Vec::new();
    for reference in collect_references(entities) {
        match resolver.resolve(&reference.source.repo, &reference.target_name) {
            Some(target) if target != reference.source => {
                edges.push(Relationship::new(
                    reference.source,
                    target,
                    reference.kind,
                ));
            }
            Some(_) => {}
            None => {
                debug!(
                    source = %reference.source,
                    target = %reference.target_name,
                    "dropping unresolved reference"
                );
            }
        }
    }

    edges.sort_by(|a, b| (&a.source, &a.target, &a.kind).cmp(&(&b.source, &b.target, &b.kind)));
    edges.dedup();
    edges
}

fn collect_references(entities: &BTreeMap<EntityKey, Entity>) -> Vec<UnresolvedReference> {
    let mut refs = Vec::new();

    for (key, entity) in entities {
        match entity {
            Entity::Schema(schema) => {
                for relation in &schema.relationships {
                    refs.push(UnresolvedReference::new(
                        key.clone(),
                        &relation.target,
                        &relation.kind,
                    ));
                }
            }
            Entity::Service(service) => {
                for dependency in &service.dependencies {
                    refs.push(UnresolvedReference::new(key.clone(), dependency, "uses"));
                }
            }
            Entity::Api(api) => {
                if !api.handler.is_empty() {
                    refs.push(UnresolvedReference::new(key.clone(), &api.handler, "handled_by"));
                }
            }
            Entity::DataFlow(flow) => {
                refs.push(UnresolvedReference::new(key.clone(), &flow.source, "reads_from"));
                refs.push(UnresolvedReference::new(key.clone(), &flow.target, "writes_to"));
            }
            Entity::Dependency(_) | Entity::Context(_) => {}
        }
    }

    refs
}

struct NameResolver {
    /// (repo, lowercase name) -> candidate keys.
    by_repo: HashMap<(String, String), Vec<EntityKey>>,
    /// lowercase name -> candidate keys, across all repos.
    global: HashMap<String, Vec<EntityKey>>,
}

impl NameResolver {
    fn build(entities: &BTreeMap<EntityKey, Entity>) -> Self {
        let mut by_repo: HashMap<(String, String), Vec<EntityKey>> = HashMap::new();
        let mut global: HashMap<String, Vec<EntityKey>> = HashMap::new();

        for key in entities.keys() {
            // Edges never target dependency or context records.
            if matches!(key.kind, EntityKind::Dependency | EntityKind::Context) {
                continue;
            }
            let lower = key.name.to_lowercase();
            by_repo
                .entry((key.repo.clone(), lower.clone()))
                .or_default()
                .push(key.clone());
            global.entry(lower).or_default().push(key.clone());
        }

        Self { by_repo, global }
    }

    fn resolve(&self, repo: &str, name: &str) -> Option<EntityKey> {
        let lower = name.to_lowercase();

        if let Some(candidates) = self.by_repo.get(&(repo.to_string(), lower.clone())) {
            // Exact-case match wins over a case-insensitive one.
            if let Some(exact) = candidates.iter().find(|k| k.name == name) {
                return Some(exact.clone());
            }
            if let [only] = candidates.as_slice() {
                return Some(only.clone());
            }
        }

        match self.global.get(&lower).map(Vec::as_slice) {
            Some([only]) => Some(only.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SchemaEntity, SchemaRelation, ServiceEntity};

    fn schema(repo: &str, name: &str, relations: Vec<(&str, &str)>) -> Entity {
        Entity::Schema(SchemaEntity {
            name: name.to_string(),
            repo: repo.to_string(),
            source_file: "models.py".to_string(),
            description: String::new(),
            fields: vec![],
            relationships: relations
                .into_iter()
                .map(|(target, kind)| SchemaRelation {
                    target: target.to_string(),
                    kind: kind.to_string(),
                })
                .collect(),
        })
    }

    fn service(repo: &str, name: &str, deps: Vec<&str>) -> Entity {
        Entity::Service(ServiceEntity {
            name: name.to_string(),
            repo: repo.to_string(),
            source_file: "service.py".to_string(),
            description: String::new(),
            methods: vec![],
            dependencies: deps.into_iter().map(String::from).collect(),
        })
    }

    fn store(entities: Vec<Entity>) -> BTreeMap<EntityKey, Entity> {
        entities.into_iter().map(|e| (e.key(), e)).collect()
    }

    #[test]
    fn resolves_within_repo_case_insensitively() {
        let entities = store(vec![
            schema("svc", "Order", vec![("user", "belongs_to")]),
            schema("svc", "User", vec![]),
        ]);
        let edges = resolve_relationships(&entities);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target.name, "User");
        assert_eq!(edges[0].kind, "belongs_to");
    }

    #[test]
    fn cross_repo_resolution_requires_a_unique_name() {
        let entities = store(vec![
            service("gateway", "CheckoutService", vec!["Payment"]),
            schema("payments", "Payment", vec![]),
        ]);
        let edges = resolve_relationships(&entities);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target.repo, "payments");

        // Two repos defining Payment makes the reference ambiguous.
        let entities = store(vec![
            service("gateway", "CheckoutService", vec!["Payment"]),
            schema("payments", "Payment", vec![]),
            schema("billing", "Payment", vec![]),
        ]);
        assert!(resolve_relationships(&entities).is_empty());
    }

    #[test]
    fn unresolved_references_are_dropped() {
        let entities = store(vec![schema("svc", "Order", vec![("Ghost", "belongs_to")])]);
        assert!(resolve_relationships(&entities).is_empty());
    }

    #[test]
    fn self_references_are_dropped() {
        let entities = store(vec![service("svc", "TreeService", vec!["TreeService"])]);
        assert!(resolve_relationships(&entities).is_empty());
    }
}

use std::collections::HashMap;

use crate::domain::{Entity, EntityKey, SearchHit, SearchQuery, Snapshot};

const EXACT_NAME_SCORE: f32 = 10.0;
const NAME_CONTAINS_SCORE: f32 = 5.0;
const TERM_SCORE: f32 = 1.0;

/// Inverted keyword index over one snapshot. Rebuilt whole on commit;
/// lookups never see a partially indexed state.
#[derive(Default)]
pub struct KeywordIndex {
    documents: Vec<Document>,
    inverted: HashMap<String, Vec<usize>>,
}

struct Document {
    key: EntityKey,
    name_lower: String,
    snippet: String,
}

impl KeywordIndex {
    pub fn build(snapshot: &Snapshot) -> Self {
        let mut index = Self::default();
        for (key, entity) in &snapshot.entities {
            let doc_id = index.documents.len();
            let text = index_text(entity);
            for token in tokenize(&text) {
                let postings = index.inverted.entry(token).or_default();
                if postings.last() != Some(&doc_id) {
                    postings.push(doc_id);
                }
            }
            index.documents.push(Document {
                key: key.clone(),
                name_lower: key.name.to_lowercase(),
                snippet: snippet_of(entity),
            });
        }
        index
    }

    pub fn search(&self, query: &SearchQuery) -> Vec<SearchHit> {
        let needle = query.query().trim().to_lowercase();
        if needle.is_empty() || self.documents.is_empty() {
            return vec![];
        }
        let terms: Vec<String> = tokenize(&needle);

        let mut scores: HashMap<usize, f32> = HashMap::new();
        for term in &terms {
            if let Some(postings) = self.inverted.get(term) {
                for &doc_id in postings {
                    *scores.entry(doc_id).or_insert(0.0) += TERM_SCORE;
                }
            }
        }
        // Name-level boosts beat any number of body term matches.
        for (doc_id, doc) in self.documents.iter().enumerate() {
            if doc.name_lower == needle {
                *scores.entry(doc_id).or_insert(0.0) += EXACT_NAME_SCORE;
            } else if doc.name_lower.contains(&needle) {
                *scores.entry(doc_id).or_insert(0.0) += NAME_CONTAINS_SCORE;
            }
        }

        let mut hits: Vec<SearchHit> = scores
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .map(|(doc_id, score)| {
                let doc = &self.documents[doc_id];
                SearchHit::new(doc.key.clone(), score, doc.snippet.clone())
            })
            .filter(|hit| query.matches(&hit.key))
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.key.name.cmp(&b.key.name))
        });
        hits.truncate(query.limit());
        hits
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = text
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(String::from)
        .collect();
    tokens.sort();
    tokens.dedup();
    tokens
}

/// Everything searchable about an entity, concatenated.
fn index_text(entity: &Entity) -> String {
    let mut parts = vec![
        entity.name(),
        entity.kind().as_str().to_string(),
        entity.repo().to_string(),
        entity.description().to_string(),
    ];
    match entity {
        Entity::Schema(s) => {
            parts.extend(s.fields.iter().map(|f| f.name.clone()));
            parts.extend(s.relationships.iter().map(|r| r.target.clone()));
        }
        Entity::Service(s) => {
            parts.extend(s.methods.iter().map(|m| m.name.clone()));
            parts.extend(s.dependencies.clone());
        }
        Entity::Api(a) => {
            parts.push(a.path.clone());
            parts.push(a.handler.clone());
        }
        Entity::Dependency(d) => {
            parts.push(d.ecosystem.clone());
        }
        Entity::DataFlow(f) => {
            parts.push(f.source.clone());
            parts.push(f.target.clone());
            parts.push(f.flow_kind.clone());
        }
        Entity::Context(c) => {
            parts.push(c.domain.clone());
            parts.extend(c.when_to_use.clone());
        }
    }
    parts.join(" ")
}

fn snippet_of(entity: &Entity) -> String {
    let description = entity.description();
    if description.is_empty() {
        format!("{} {} in {}", entity.kind(), entity.name(), entity.repo())
    } else {
        description.chars().take(200).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DependencyEntity, EntityKind, FieldDef, SchemaEntity};

    fn snapshot() -> Snapshot {
        let mut snapshot = Snapshot::empty();
        let entities = vec![
            Entity::Schema(SchemaEntity {
                name: "User".to_string(),
                repo: "users-svc".to_string(),
                source_file: "models.py".to_string(),
                description: "Account record".to_string(),
                fields: vec![FieldDef {
                    name: "email".to_string(),
                    field_type: "str".to_string(),
                    constraints: vec![],
                    nullable: false,
                    description: String::new(),
                }],
                relationships: vec![],
            }),
            Entity::Schema(SchemaEntity {
                name: "UserSession".to_string(),
                repo: "users-svc".to_string(),
                source_file: "models.py".to_string(),
                description: String::new(),
                fields: vec![],
                relationships: vec![],
            }),
            Entity::Dependency(DependencyEntity {
                name: "requests".to_string(),
                ecosystem: "pypi".to_string(),
                version: "2.31".to_string(),
                dep_kind: "direct".to_string(),
                repo: "orders-svc".to_string(),
            }),
        ];
        for entity in entities {
            snapshot.entities.insert(entity.key(), entity);
        }
        snapshot
    }

    #[test]
    fn exact_name_outranks_partial_name() {
        let index = KeywordIndex::build(&snapshot());
        let hits = index.search(&SearchQuery::new("user"));
        assert!(hits.len() >= 2);
        assert_eq!(hits[0].key.name, "User");
        assert_eq!(hits[1].key.name, "UserSession");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn field_names_are_searchable() {
        let index = KeywordIndex::build(&snapshot());
        let hits = index.search(&SearchQuery::new("email"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key.name, "User");
    }

    #[test]
    fn filters_apply_before_ranking() {
        let index = KeywordIndex::build(&snapshot());
        let hits = index.search(&SearchQuery::new("user").with_kind(EntityKind::Dependency));
        assert!(hits.is_empty());

        let hits = index.search(&SearchQuery::new("requests").with_repo("orders-svc"));
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn empty_index_returns_no_hits() {
        let index = KeywordIndex::build(&Snapshot::empty());
        assert!(index.search(&SearchQuery::new("anything")).is_empty());
    }

    #[test]
    fn blank_query_returns_no_hits() {
        let index = KeywordIndex::build(&snapshot());
        assert!(index.search(&SearchQuery::new("   ")).is_empty());
    }
}

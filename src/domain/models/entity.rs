use serde::{Deserialize, Serialize};

/// The kinds of knowledge records the extractors can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Schema,
    Service,
    Api,
    Dependency,
    DataFlow,
    Context,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Schema => "schema",
            EntityKind::Service => "service",
            EntityKind::Api => "api",
            EntityKind::Dependency => "dependency",
            EntityKind::DataFlow => "data_flow",
            EntityKind::Context => "context",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "schema" => Some(EntityKind::Schema),
            "service" => Some(EntityKind::Service),
            "api" | "endpoint" => Some(EntityKind::Api),
            "dependency" => Some(EntityKind::Dependency),
            "data_flow" | "dataflow" => Some(EntityKind::DataFlow),
            "context" => Some(EntityKind::Context),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unique identity of an entity within a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub repo: String,
    pub kind: EntityKind,
    pub name: String,
}

impl EntityKey {
    pub fn new(repo: impl Into<String>, kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            kind,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.repo, self.kind, self.name)
    }
}

/// Where an entity came from. LLM-sourced descriptions win over
/// pattern-sourced ones at merge time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Pattern,
    Llm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRelation {
    pub target: String,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDef {
    pub name: String,
    #[serde(rename = "type", default)]
    pub param_type: String,
    /// Where the parameter lives: path, query, or body.
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: String,
    #[serde(default)]
    pub params: Vec<ParamDef>,
    #[serde(default)]
    pub returns: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaEntity {
    pub name: String,
    pub repo: String,
    pub source_file: String,
    pub description: String,
    pub fields: Vec<FieldDef>,
    pub relationships: Vec<SchemaRelation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntity {
    pub name: String,
    pub repo: String,
    pub source_file: String,
    pub description: String,
    pub methods: Vec<MethodDef>,
    /// Names of other services/components this one uses.
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEndpointEntity {
    pub method: String,
    pub path: String,
    pub handler: String,
    pub repo: String,
    pub source_file: String,
    pub description: String,
    pub params: Vec<ParamDef>,
}

impl ApiEndpointEntity {
    /// Canonical entity name, e.g. `GET /users/:id`.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyEntity {
    pub name: String,
    pub ecosystem: String,
    pub version: String,
    /// "direct" or "dev".
    pub dep_kind: String,
    pub repo: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataFlowEntity {
    pub source: String,
    pub target: String,
    /// read | write | transform | publish | subscribe
    pub flow_kind: String,
    pub repo: String,
    pub description: String,
}

impl DataFlowEntity {
    pub fn display_name(&self) -> String {
        format!("{}->{}", self.source, self.target)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoContextEntity {
    pub repo_name: String,
    pub purpose: String,
    pub domain: String,
    pub when_to_use: Vec<String>,
    pub generated_at: u64,
    pub model: String,
    /// Narrative markdown generated for the repository.
    pub markdown: String,
}

/// A typed knowledge record extracted from a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Schema(SchemaEntity),
    Service(ServiceEntity),
    Api(ApiEndpointEntity),
    Dependency(DependencyEntity),
    DataFlow(DataFlowEntity),
    Context(RepoContextEntity),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Schema(_) => EntityKind::Schema,
            Entity::Service(_) => EntityKind::Service,
            Entity::Api(_) => EntityKind::Api,
            Entity::Dependency(_) => EntityKind::Dependency,
            Entity::DataFlow(_) => EntityKind::DataFlow,
            Entity::Context(_) => EntityKind::Context,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Entity::Schema(s) => s.name.clone(),
            Entity::Service(s) => s.name.clone(),
            Entity::Api(a) => a.display_name(),
            Entity::Dependency(d) => d.name.clone(),
            Entity::DataFlow(f) => f.display_name(),
            Entity::Context(c) => c.repo_name.clone(),
        }
    }

    pub fn repo(&self) -> &str {
        match self {
            Entity::Schema(s) => &s.repo,
            Entity::Service(s) => &s.repo,
            Entity::Api(a) => &a.repo,
            Entity::Dependency(d) => &d.repo,
            Entity::DataFlow(f) => &f.repo,
            Entity::Context(c) => &c.repo_name,
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.repo().to_string(), self.kind(), self.name())
    }

    pub fn description(&self) -> &str {
        match self {
            Entity::Schema(s) => &s.description,
            Entity::Service(s) => &s.description,
            Entity::Api(a) => &a.description,
            Entity::Dependency(_) => "",
            Entity::DataFlow(f) => &f.description,
            Entity::Context(c) => &c.purpose,
        }
    }

    pub fn source_file(&self) -> &str {
        match self {
            Entity::Schema(s) => &s.source_file,
            Entity::Service(s) => &s.source_file,
            Entity::Api(a) => &a.source_file,
            _ => "",
        }
    }
}

/// One extractor pass's worth of entities for a single repository,
/// tagged with where they came from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityBatch {
    pub entities: Vec<(Entity, Provenance)>,
    /// Per-file warnings accumulated during extraction. Never fatal.
    pub warnings: Vec<String>,
}

impl EntityBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entity: Entity, provenance: Provenance) {
        self.entities.push((entity, provenance));
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn merge(&mut self, other: EntityBatch) {
        self.entities.extend(other.entities);
        self.warnings.extend(other.warnings);
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }
}

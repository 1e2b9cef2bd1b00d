use serde::{Deserialize, Serialize};

use super::{EntityKey, EntityKind};

/// A query against the knowledge base, keyword or semantic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    query: String,
    limit: usize,
    kind: Option<EntityKind>,
    repo: Option<String>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: 10,
            kind: None,
            repo: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        // Ensure at least 1 result is requested
        self.limit = limit.max(1);
        self
    }

    pub fn with_kind(mut self, kind: EntityKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = Some(repo.into());
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn kind(&self) -> Option<EntityKind> {
        self.kind
    }

    pub fn repo(&self) -> Option<&str> {
        self.repo.as_deref()
    }

    /// True when the entity passes the kind/repo filters.
    pub fn matches(&self, key: &EntityKey) -> bool {
        if let Some(kind) = self.kind {
            if key.kind != kind {
                return false;
            }
        }
        if let Some(ref repo) = self.repo {
            if &key.repo != repo {
                return false;
            }
        }
        true
    }
}

/// A single ranked result from either index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub key: EntityKey,
    pub score: f32,
    /// The indexed text chunk for the entity (semantic hits) or a short
    /// display snippet (keyword hits).
    pub snippet: String,
}

impl SearchHit {
    pub fn new(key: EntityKey, score: f32, snippet: impl Into<String>) -> Self {
        Self {
            key,
            score,
            snippet: snippet.into(),
        }
    }
}

/// Source attribution for an `ask` answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskSource {
    pub kind: EntityKind,
    pub name: String,
    pub repo: String,
    pub score: f32,
}

/// RAG-style context assembly result. Contains no generated text; the
/// context block is input for a downstream generative step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskAnswer {
    pub question: String,
    pub context: String,
    pub sources: Vec<AskSource>,
}

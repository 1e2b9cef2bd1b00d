use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use crate::application::interfaces::LlmClient;
use crate::domain::{
    ApiEndpointEntity, DataFlowEntity, Entity, EntityBatch, FieldDef, MethodDef, ParamDef,
    Provenance, RepoContextEntity, SchemaEntity, SchemaRelation, ServiceEntity,
};

/// Bumping this invalidates every cached extraction.
const PROMPT_VERSION: &str = "1";

const MAX_ATTEMPTS: usize = 2;

const EXTRACTION_SYSTEM_PROMPT: &str = "\
You extract structured knowledge from source code. Given one file, \
identify data schemas, service classes, API endpoints, and data flows. \
Respond with a single JSON object and nothing else, using this shape:
{
  \"schemas\": [{\"name\": \"\", \"description\": \"\", \"fields\": [{\"name\": \"\", \"type\": \"\", \"nullable\": false, \"constraints\": []}], \"relationships\": [{\"target\": \"\", \"kind\": \"\"}]}],
  \"services\": [{\"name\": \"\", \"description\": \"\", \"methods\": [{\"name\": \"\", \"returns\": \"\"}], \"dependencies\": []}],
  \"endpoints\": [{\"method\": \"\", \"path\": \"\", \"handler\": \"\", \"description\": \"\", \"params\": []}],
  \"data_flows\": [{\"source\": \"\", \"target\": \"\", \"flow_kind\": \"\", \"description\": \"\"}]
}
Omit arrays that would be empty. Never invent entities the code does not show.";

const RETRY_SUFFIX: &str = "\nYour previous answer was not valid JSON. \
Respond with ONLY the JSON object, no prose, no code fences.";

const CONTEXT_SYSTEM_PROMPT: &str = "\
You summarize software repositories. Given a repository name and a listing \
of its files, respond with a single JSON object:
{\"purpose\": \"one sentence\", \"domain\": \"business domain\", \"when_to_use\": [\"...\"], \"markdown\": \"short narrative overview\"}";

/// LLM-backed extractor with a per-fingerprint single-flight cache.
///
/// The fingerprint covers file content, file path, the prompt version, and
/// the model id. Concurrent requests for the same fingerprint share one
/// provider call; completed results (including degraded empty ones) are
/// served from cache for the lifetime of the process.
pub struct LlmExtractor {
    client: Arc<dyn LlmClient>,
    cache: Mutex<HashMap<String, Arc<OnceCell<EntityBatch>>>>,
}

impl LlmExtractor {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn extract(&self, path: &Path, content: &str, repo: &str) -> EntityBatch {
        let source_file = path.to_string_lossy().to_string();
        let fp = fingerprint(&source_file, content, self.client.model_id());

        let cell = {
            let mut cache = self.cache.lock().await;
            cache.entry(fp.clone()).or_default().clone()
        };

        cell.get_or_init(|| async {
            debug!(file = %source_file, fingerprint = %fp, "running llm extraction");
            self.extract_uncached(&source_file, content, repo).await
        })
        .await
        .clone()
    }

    async fn extract_uncached(&self, source_file: &str, content: &str, repo: &str) -> EntityBatch {
        let user = format!("Repository: {repo}\nFile: {source_file}\n\n```\n{content}\n```");

        let mut last_problem = String::new();
        for attempt in 0..MAX_ATTEMPTS {
            let system = if attempt == 0 {
                EXTRACTION_SYSTEM_PROMPT.to_string()
            } else {
                format!("{EXTRACTION_SYSTEM_PROMPT}{RETRY_SUFFIX}")
            };

            let response = match self.client.complete(&system, &user).await {
                Ok(r) => r,
                Err(e) => {
                    last_problem = e.to_string();
                    continue;
                }
            };

            match parse_extraction(&response) {
                Ok(parsed) => return parsed.into_batch(repo, source_file),
                Err(e) => last_problem = e,
            }
        }

        // Degraded result: cache the failure so a broken file is not
        // re-sent to the provider on every crawl of the same content.
        warn!(file = %source_file, problem = %last_problem, "llm extraction failed");
        let mut batch = EntityBatch::new();
        batch.warn(format!("llm extraction failed for {source_file}: {last_problem}"));
        batch
    }

    /// One-shot repository summary. Not cached: the file listing changes
    /// with every crawl and the call happens once per repo.
    pub async fn summarize_repo(
        &self,
        repo: &str,
        file_listing: &[String],
    ) -> Option<RepoContextEntity> {
        let user = format!("Repository: {repo}\nFiles:\n{}", file_listing.join("\n"));
        let response = match self.client.complete(CONTEXT_SYSTEM_PROMPT, &user).await {
            Ok(r) => r,
            Err(e) => {
                warn!(repo, error = %e, "repo summary failed");
                return None;
            }
        };

        let raw = salvage_json(&response)?;
        let parsed: LlmRepoContext = serde_json::from_str(&raw).ok()?;
        Some(RepoContextEntity {
            repo_name: repo.to_string(),
            purpose: parsed.purpose,
            domain: parsed.domain,
            when_to_use: parsed.when_to_use,
            generated_at: crate::domain::unix_now(),
            model: self.client.model_id().to_string(),
            markdown: parsed.markdown,
        })
    }
}

pub fn fingerprint(source_file: &str, content: &str, model_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hasher.update(source_file.as_bytes());
    hasher.update(PROMPT_VERSION.as_bytes());
    hasher.update(model_id.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn parse_extraction(response: &str) -> Result<LlmExtraction, String> {
    let raw = salvage_json(response).ok_or_else(|| "no JSON object in response".to_string())?;
    serde_json::from_str(&raw).map_err(|e| format!("invalid extraction JSON: {e}"))
}

/// Recover a JSON object from a possibly chatty model response: fenced
/// code block first, then the first balanced `{ ... }` group, then the
/// crude first-`{`-to-last-`}` slice.
pub fn salvage_json(response: &str) -> Option<String> {
    if let Some(start) = response.find("```") {
        let after = &response[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            let block = after[..end].trim();
            if block.starts_with('{') {
                return Some(block.to_string());
            }
        }
    }

    let open = response.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in response[open..].char_indices() {
        if in_string {
            match c {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => in_string = false,
                _ => escaped = false,
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(response[open..open + i + 1].to_string());
                }
            }
            _ => {}
        }
    }

    let close = response.rfind('}')?;
    if close > open {
        Some(response[open..=close].to_string())
    } else {
        None
    }
}

#[derive(Debug, Default, Deserialize)]
struct LlmExtraction {
    #[serde(default)]
    schemas: Vec<LlmSchema>,
    #[serde(default)]
    services: Vec<LlmService>,
    #[serde(default)]
    endpoints: Vec<LlmEndpoint>,
    #[serde(default)]
    data_flows: Vec<LlmDataFlow>,
}

#[derive(Debug, Deserialize)]
struct LlmSchema {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    fields: Vec<FieldDef>,
    #[serde(default)]
    relationships: Vec<SchemaRelation>,
}

#[derive(Debug, Deserialize)]
struct LlmService {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    methods: Vec<MethodDef>,
    #[serde(default)]
    dependencies: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LlmEndpoint {
    #[serde(default)]
    method: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    handler: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    params: Vec<ParamDef>,
}

#[derive(Debug, Deserialize)]
struct LlmDataFlow {
    #[serde(default)]
    source: String,
    #[serde(default)]
    target: String,
    #[serde(default)]
    flow_kind: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct LlmRepoContext {
    #[serde(default)]
    purpose: String,
    #[serde(default)]
    domain: String,
    #[serde(default)]
    when_to_use: Vec<String>,
    #[serde(default)]
    markdown: String,
}

impl LlmExtraction {
    fn into_batch(self, repo: &str, source_file: &str) -> EntityBatch {
        let mut batch = EntityBatch::new();

        for schema in self.schemas {
            if schema.name.is_empty() {
                batch.warn(format!("{source_file}: dropped schema with empty name"));
                continue;
            }
            batch.push(
                Entity::Schema(SchemaEntity {
                    name: schema.name,
                    repo: repo.to_string(),
                    source_file: source_file.to_string(),
                    description: schema.description,
                    fields: schema.fields,
                    relationships: schema.relationships,
                }),
                Provenance::Llm,
            );
        }

        for service in self.services {
            if service.name.is_empty() {
                batch.warn(format!("{source_file}: dropped service with empty name"));
                continue;
            }
            batch.push(
                Entity::Service(ServiceEntity {
                    name: service.name,
                    repo: repo.to_string(),
                    source_file: source_file.to_string(),
                    description: service.description,
                    methods: service.methods,
                    dependencies: service.dependencies,
                }),
                Provenance::Llm,
            );
        }

        for endpoint in self.endpoints {
            if endpoint.method.is_empty() || endpoint.path.is_empty() {
                batch.warn(format!("{source_file}: dropped endpoint with empty method/path"));
                continue;
            }
            batch.push(
                Entity::Api(ApiEndpointEntity {
                    method: endpoint.method.to_uppercase(),
                    path: endpoint.path,
                    handler: endpoint.handler,
                    repo: repo.to_string(),
                    source_file: source_file.to_string(),
                    description: endpoint.description,
                    params: endpoint.params,
                }),
                Provenance::Llm,
            );
        }

        for flow in self.data_flows {
            if flow.source.is_empty() || flow.target.is_empty() {
                batch.warn(format!("{source_file}: dropped data flow with empty endpoint"));
                continue;
            }
            batch.push(
                Entity::DataFlow(DataFlowEntity {
                    source: flow.source,
                    target: flow.target,
                    flow_kind: flow.flow_kind,
                    repo: repo.to_string(),
                    description: flow.description,
                }),
                Provenance::Llm,
            );
        }

        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainError;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLlm {
        calls: AtomicUsize,
        response: String,
    }

    impl CountingLlm {
        fn new(response: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                response: response.to_string(),
            }
        }
    }

    #[async_trait]
    impl LlmClient for CountingLlm {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String, DomainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }

        fn model_id(&self) -> &str {
            "counting-model"
        }
    }

    const SCHEMA_RESPONSE: &str = r#"{"schemas": [{"name": "User", "description": "A user", "fields": [{"name": "id", "type": "int"}]}]}"#;

    #[test]
    fn salvage_handles_fenced_block() {
        let response = "Here you go:\n```json\n{\"schemas\": []}\n```\nDone.";
        assert_eq!(salvage_json(response).as_deref(), Some("{\"schemas\": []}"));
    }

    #[test]
    fn salvage_handles_prose_around_object() {
        let response = "Sure! {\"a\": {\"b\": 1}} hope that helps";
        assert_eq!(salvage_json(response).as_deref(), Some("{\"a\": {\"b\": 1}}"));
    }

    #[test]
    fn salvage_ignores_braces_inside_strings() {
        let response = r#"{"path": "/users/{id}"}"#;
        assert_eq!(salvage_json(response).as_deref(), Some(response));
    }

    #[test]
    fn salvage_returns_none_without_object() {
        assert_eq!(salvage_json("no json here"), None);
    }

    #[test]
    fn fingerprint_varies_with_every_input() {
        let base = fingerprint("a.py", "content", "model");
        assert_ne!(base, fingerprint("b.py", "content", "model"));
        assert_ne!(base, fingerprint("a.py", "changed", "model"));
        assert_ne!(base, fingerprint("a.py", "content", "other-model"));
    }

    #[tokio::test]
    async fn concurrent_extractions_share_one_provider_call() {
        let client = Arc::new(CountingLlm::new(SCHEMA_RESPONSE));
        let extractor = Arc::new(LlmExtractor::new(client.clone()));
        let path = PathBuf::from("models.py");

        let a = {
            let extractor = extractor.clone();
            let path = path.clone();
            tokio::spawn(async move { extractor.extract(&path, "class User: ...", "svc").await })
        };
        let b = {
            let extractor = extractor.clone();
            let path = path.clone();
            tokio::spawn(async move { extractor.extract(&path, "class User: ...", "svc").await })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }

    #[tokio::test]
    async fn different_content_is_not_shared() {
        let client = Arc::new(CountingLlm::new(SCHEMA_RESPONSE));
        let extractor = LlmExtractor::new(client.clone());
        let path = PathBuf::from("models.py");

        extractor.extract(&path, "class User: ...", "svc").await;
        extractor.extract(&path, "class Order: ...", "svc").await;
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unparseable_response_degrades_to_cached_warning() {
        let client = Arc::new(CountingLlm::new("I cannot help with that."));
        let extractor = LlmExtractor::new(client.clone());
        let path = PathBuf::from("models.py");

        let batch = extractor.extract(&path, "class User: ...", "svc").await;
        assert!(batch.is_empty());
        assert_eq!(batch.warnings.len(), 1);
        assert_eq!(client.calls.load(Ordering::SeqCst), MAX_ATTEMPTS);

        // Second request hits the cached degraded result.
        extractor.extract(&path, "class User: ...", "svc").await;
        assert_eq!(client.calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn extraction_maps_all_sections() {
        let response = r#"{
            "schemas": [{"name": "User", "fields": [{"name": "id", "type": "int"}]}],
            "services": [{"name": "UserService", "methods": [{"name": "get_user"}]}],
            "endpoints": [{"method": "get", "path": "/users/:id", "handler": "get_user"}],
            "data_flows": [{"source": "UserService", "target": "users", "flow_kind": "read"}]
        }"#;
        let client = Arc::new(CountingLlm::new(response));
        let extractor = LlmExtractor::new(client);

        let batch = extractor
            .extract(&PathBuf::from("app.py"), "...", "svc")
            .await;
        assert_eq!(batch.len(), 4);
        assert!(batch
            .entities
            .iter()
            .all(|(_, p)| *p == Provenance::Llm));
        let Entity::Api(api) = &batch.entities[2].0 else {
            panic!("expected api");
        };
        assert_eq!(api.method, "GET");
    }
}

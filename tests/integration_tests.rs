//! End-to-end tests: fixture repositories on disk, a full pipeline pass,
//! then queries against the committed snapshot.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use codeatlas::application::extraction::analyzers::default_registry;
use codeatlas::{
    EntityKind, ExtractionEngine, FileSnapshotWriter, JobState, KnowledgeStore, LlmExtractor,
    LocalRepoSource, MockEmbedding, MockLlm, PipelineOrchestrator, QueryEngine, SearchQuery,
};

fn write_users_service(dir: &Path) {
    fs::create_dir_all(dir).expect("mkdir");
    fs::write(
        dir.join("models.py"),
        r#"class User(Base):
    id = Column(Integer, primary_key=True)
    email = Column(String, nullable=False, unique=True)
    team_id = Column(Integer)
"#,
    )
    .expect("write models");
    fs::write(
        dir.join("routes.js"),
        "router.get('/users/:id', getUser);\n",
    )
    .expect("write routes");
    fs::write(dir.join("requirements.txt"), "requests==2.31\nflask>=2.0\n").expect("write reqs");
}

fn write_orders_service(dir: &Path) {
    fs::create_dir_all(dir).expect("mkdir");
    fs::write(
        dir.join("schema.sql"),
        "CREATE TABLE orders (\n  id INTEGER PRIMARY KEY,\n  user_id INTEGER\n);\n",
    )
    .expect("write schema");
    fs::write(dir.join("requirements.txt"), "requests==2.31\n").expect("write reqs");
}

struct Harness {
    _root: tempfile::TempDir,
    data_dir: tempfile::TempDir,
    store: Arc<KnowledgeStore>,
    query: Arc<QueryEngine>,
    orchestrator: Arc<PipelineOrchestrator>,
    llm: Arc<MockLlm>,
}

fn harness(llm_responses: Vec<String>) -> Harness {
    let root = tempfile::tempdir().expect("tempdir");
    write_users_service(&root.path().join("users-svc"));
    write_orders_service(&root.path().join("orders-svc"));

    let data_dir = tempfile::tempdir().expect("tempdir");
    let llm = Arc::new(MockLlm::new(llm_responses));

    let store = Arc::new(KnowledgeStore::new());
    let query = Arc::new(QueryEngine::new(
        store.clone(),
        Arc::new(MockEmbedding::new(64)),
    ));
    let engine = Arc::new(
        ExtractionEngine::new(default_registry())
            .with_llm(Arc::new(LlmExtractor::new(llm.clone()))),
    );
    let source = Arc::new(LocalRepoSource::new(vec![root.path().to_path_buf()]));
    let writer = Arc::new(FileSnapshotWriter::new(data_dir.path()));
    let orchestrator = Arc::new(
        PipelineOrchestrator::new(source, engine, store.clone(), query.clone()).with_sink(writer),
    );

    Harness {
        _root: root,
        data_dir,
        store,
        query,
        orchestrator,
        llm,
    }
}

async fn run_crawl(harness: &Harness, use_llm: bool) -> JobState {
    harness.orchestrator.start(use_llm).await.expect("start");
    for _ in 0..500 {
        let status = harness.orchestrator.status().await;
        if !status.is_running() {
            return status.state;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("crawl did not finish");
}

#[tokio::test(flavor = "multi_thread")]
async fn crawl_extracts_schema_and_endpoint() {
    let harness = harness(vec![]);
    assert_eq!(run_crawl(&harness, false).await, JobState::Completed);

    let snapshot = harness.store.current().await;
    assert_eq!(snapshot.version, 1);

    let schemas = snapshot.list_by_kind(EntityKind::Schema);
    assert!(schemas.iter().any(|e| e.name() == "User"));
    assert!(schemas.iter().any(|e| e.name() == "orders"));

    let apis = snapshot.list_by_kind(EntityKind::Api);
    assert_eq!(apis.len(), 1);
    assert_eq!(apis[0].name(), "GET /users/:id");
}

#[tokio::test(flavor = "multi_thread")]
async fn same_dependency_in_two_repos_stays_separate() {
    let harness = harness(vec![]);
    assert_eq!(run_crawl(&harness, false).await, JobState::Completed);

    let snapshot = harness.store.current().await;
    let requests: Vec<_> = snapshot
        .list_by_kind(EntityKind::Dependency)
        .into_iter()
        .filter(|e| e.name() == "requests")
        .collect();
    assert_eq!(requests.len(), 2);
    let mut repos: Vec<&str> = requests.iter().map(|e| e.repo()).collect();
    repos.sort();
    assert_eq!(repos, vec!["orders-svc", "users-svc"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn search_before_any_crawl_is_empty() {
    let harness = harness(vec![]);
    assert!(harness
        .query
        .search(&SearchQuery::new("user"))
        .await
        .is_empty());
    assert!(harness
        .query
        .semantic_search(&SearchQuery::new("user"))
        .await
        .expect("semantic search")
        .is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn keyword_search_finds_committed_entities() {
    let harness = harness(vec![]);
    run_crawl(&harness, false).await;

    let hits = harness.query.search(&SearchQuery::new("User")).await;
    assert!(!hits.is_empty());
    assert_eq!(hits[0].key.name, "User");

    let filtered = harness
        .query
        .search(&SearchQuery::new("requests").with_repo("orders-svc"))
        .await;
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].key.repo, "orders-svc");
}

#[tokio::test(flavor = "multi_thread")]
async fn ask_assembles_context_with_sources() {
    let harness = harness(vec![]);
    run_crawl(&harness, false).await;

    // An indexed chunk verbatim is guaranteed to clear the relevance
    // threshold under the deterministic mock embedder.
    let snapshot = harness.store.current().await;
    let user = snapshot
        .list_by_kind(EntityKind::Schema)
        .into_iter()
        .find(|e| e.name() == "User")
        .expect("User schema")
        .clone();
    let question = codeatlas::application::index::chunk_text(&user);

    let answer = harness.query.ask(&question, 5).await.expect("ask");
    assert!(!answer.sources.is_empty());
    assert_eq!(answer.sources[0].name, "User");
    assert!(answer.context.contains("User"));
    assert_eq!(answer.question, question);
}

#[tokio::test(flavor = "multi_thread")]
async fn llm_crawl_enriches_descriptions_and_dedupes_calls() {
    let response = r#"{"schemas": [{"name": "User", "description": "One registered account."}]}"#;
    let harness = harness(vec![response.to_string()]);
    assert_eq!(run_crawl(&harness, true).await, JobState::Completed);

    let snapshot = harness.store.current().await;
    let user = snapshot
        .list_by_kind(EntityKind::Schema)
        .into_iter()
        .find(|e| e.name() == "User")
        .expect("User schema");
    assert_eq!(user.description(), "One registered account.");

    let calls_after_first = harness.llm.call_count();
    assert!(calls_after_first > 0);

    // Unchanged files hit the fingerprint cache on the next crawl; only
    // the per-repo summary calls go back to the provider.
    assert_eq!(run_crawl(&harness, true).await, JobState::Completed);
    assert_eq!(harness.llm.call_count(), calls_after_first + 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn snapshot_artifact_is_written_per_version() {
    let harness = harness(vec![]);
    run_crawl(&harness, false).await;
    run_crawl(&harness, false).await;

    let v1 = harness.data_dir.path().join("snapshot-v1.json");
    let v2 = harness.data_dir.path().join("snapshot-v2.json");
    assert!(v1.is_file());
    assert!(v2.is_file());

    let restored = codeatlas::connector::adapter::read_snapshot(&v2).expect("read artifact");
    assert_eq!(restored.version, 2);
    assert_eq!(restored.len(), harness.store.current().await.len());
}

#[tokio::test(flavor = "multi_thread")]
async fn relationships_resolve_across_extracted_entities() {
    let root = tempfile::tempdir().expect("tempdir");
    let repo = root.path().join("shop");
    fs::create_dir_all(&repo).expect("mkdir");
    fs::write(
        repo.join("schema.sql"),
        "CREATE TABLE users (id INTEGER PRIMARY KEY);\nCREATE TABLE orders (\n  id INTEGER PRIMARY KEY,\n  user_id INTEGER REFERENCES users(id)\n);\n",
    )
    .expect("write schema");

    let store = Arc::new(KnowledgeStore::new());
    let query = Arc::new(QueryEngine::new(
        store.clone(),
        Arc::new(MockEmbedding::new(64)),
    ));
    let engine = Arc::new(ExtractionEngine::new(default_registry()));
    let source = Arc::new(LocalRepoSource::new(vec![root.path().to_path_buf()]));
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        source,
        engine,
        store.clone(),
        query,
    ));

    orchestrator.start(false).await.expect("start");
    for _ in 0..500 {
        if !orchestrator.status().await.is_running() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let snapshot = store.current().await;
    assert_eq!(snapshot.relationships.len(), 1);
    let edge = &snapshot.relationships[0];
    assert_eq!(edge.source.name, "orders");
    assert_eq!(edge.target.name, "users");
    assert_eq!(edge.kind, "belongs_to");
    assert!(snapshot.entities.contains_key(&edge.source));
    assert!(snapshot.entities.contains_key(&edge.target));
}

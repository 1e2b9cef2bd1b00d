use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::Stream;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::info;

use crate::application::{KnowledgeStore, PipelineOrchestrator, QueryEngine};
use crate::domain::{DomainError, EntityKey, EntityKind, SearchQuery};

pub struct AppState {
    pub store: Arc<KnowledgeStore>,
    pub query: Arc<QueryEngine>,
    pub orchestrator: Arc<PipelineOrchestrator>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/search", get(search))
        .route("/api/semantic-search", get(semantic_search))
        .route("/api/ask", post(ask))
        .route("/api/entities/{kind}", get(entities_by_kind))
        .route("/api/entity", get(entity))
        .route("/api/relationships", get(relationships))
        .route("/api/graph", get(graph))
        .route("/api/summary", get(summary))
        .route("/api/crawl/start", post(crawl_start))
        .route("/api/crawl/stop", post(crawl_stop))
        .route("/api/crawl/status", get(crawl_status))
        .route("/api/crawl/stream", get(crawl_stream))
        .route("/api/reindex", post(reindex))
        .with_state(state)
}

pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Deserialize)]
struct SearchParams {
    query: String,
    limit: Option<usize>,
    kind: Option<String>,
    repo: Option<String>,
}

#[derive(Deserialize)]
struct KeyParams {
    repo: String,
    kind: String,
    name: String,
}

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    limit: Option<usize>,
}

#[derive(Deserialize, Default)]
struct CrawlRequest {
    #[serde(default)]
    use_llm: bool,
}

#[derive(serde::Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(e: DomainError) -> ApiError {
    let status = match &e {
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::InvalidInput(_) | DomainError::ValidationFailure(_) => StatusCode::BAD_REQUEST,
        DomainError::JobAlreadyRunning => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

fn bad_request(message: impl Into<String>) -> ApiError {
    error_response(DomainError::invalid_input(message))
}

fn build_query(params: &SearchParams) -> Result<SearchQuery, ApiError> {
    let mut query = SearchQuery::new(&params.query);
    if let Some(limit) = params.limit {
        query = query.with_limit(limit);
    }
    if let Some(kind) = &params.kind {
        let kind = EntityKind::parse(kind)
            .ok_or_else(|| bad_request(format!("unknown entity kind: {kind}")))?;
        query = query.with_kind(kind);
    }
    if let Some(repo) = &params.repo {
        query = query.with_repo(repo);
    }
    Ok(query)
}

fn parse_key(params: &KeyParams) -> Result<EntityKey, ApiError> {
    let kind = EntityKind::parse(&params.kind)
        .ok_or_else(|| bad_request(format!("unknown entity kind: {}", params.kind)))?;
    Ok(EntityKey::new(&params.repo, kind, &params.name))
}

async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let query = build_query(&params)?;
    let hits = state.query.search(&query).await;
    Ok(Json(serde_json::json!({ "hits": hits })))
}

async fn semantic_search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let query = build_query(&params)?;
    let hits = state
        .query
        .semantic_search(&query)
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::json!({ "hits": hits })))
}

async fn ask(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AskRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let answer = state
        .query
        .ask(&request.question, request.limit.unwrap_or(10))
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::to_value(answer).unwrap_or_default()))
}

async fn entities_by_kind(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let kind = EntityKind::parse(&kind)
        .ok_or_else(|| bad_request(format!("unknown entity kind: {kind}")))?;
    let entities = state.store.list_by_kind(kind).await;
    Ok(Json(serde_json::json!({ "entities": entities })))
}

async fn entity(
    State(state): State<Arc<AppState>>,
    Query(params): Query<KeyParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let key = parse_key(&params)?;
    let entity = state.store.get(&key).await.map_err(error_response)?;
    Ok(Json(serde_json::to_value(entity).unwrap_or_default()))
}

async fn relationships(
    State(state): State<Arc<AppState>>,
    Query(params): Query<KeyParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let key = parse_key(&params)?;
    let edges = state.store.relationships_of(&key).await;
    Ok(Json(serde_json::json!({ "relationships": edges })))
}

async fn graph(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let graph = state.store.graph().await;
    Json(serde_json::to_value(graph).unwrap_or_default())
}

async fn summary(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let summary = state.store.summary().await;
    Json(serde_json::to_value(summary).unwrap_or_default())
}

async fn crawl_start(
    State(state): State<Arc<AppState>>,
    request: Option<Json<CrawlRequest>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let use_llm = request.map(|Json(r)| r.use_llm).unwrap_or_default();
    let job_id = state
        .orchestrator
        .start(use_llm)
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::json!({ "job_id": job_id })))
}

async fn crawl_stop(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.orchestrator.stop().await.map_err(error_response)?;
    Ok(Json(serde_json::json!({ "stopping": true })))
}

async fn crawl_status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let status = state.orchestrator.status().await;
    Json(serde_json::to_value(status).unwrap_or_default())
}

/// Live job updates as server-sent events. Lagged subscribers skip ahead
/// rather than disconnect.
async fn crawl_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.orchestrator.subscribe();
    let stream = futures_util::stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(update) => {
                    let event = Event::default()
                        .json_data(&update)
                        .unwrap_or_else(|_| Event::default().data("{}"));
                    return Some((Ok(event), receiver));
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn reindex(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let version = state.query.reindex().await.map_err(error_response)?;
    Ok(Json(serde_json::json!({ "snapshot_version": version })))
}

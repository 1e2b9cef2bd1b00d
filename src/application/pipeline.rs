use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::extraction::ExtractionEngine;
use crate::application::interfaces::{RepoSource, SnapshotSink};
use crate::application::query::QueryEngine;
use crate::application::store::KnowledgeStore;
use crate::domain::{
    DomainError, EntityBatch, JobStatus, JobUpdate, Stage, STAGE_ORDER,
};

/// Repositories analyzed concurrently during the analyze stage.
const ANALYZE_CONCURRENCY: usize = 4;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Drives one crawl at a time through the fixed stage sequence
/// discover, clone, analyze, output, reloading.
///
/// At most one job runs; a second start is rejected while the first is
/// live. The job itself runs on a background task; callers observe it
/// through [`PipelineOrchestrator::status`] polling or the broadcast
/// event stream from [`PipelineOrchestrator::subscribe`].
pub struct PipelineOrchestrator {
    source: Arc<dyn RepoSource>,
    engine: Arc<ExtractionEngine>,
    store: Arc<KnowledgeStore>,
    query: Arc<QueryEngine>,
    sink: Option<Arc<dyn SnapshotSink>>,
    status: Mutex<JobStatus>,
    cancel: Mutex<Option<CancellationToken>>,
    events: broadcast::Sender<JobUpdate>,
}

impl PipelineOrchestrator {
    pub fn new(
        source: Arc<dyn RepoSource>,
        engine: Arc<ExtractionEngine>,
        store: Arc<KnowledgeStore>,
        query: Arc<QueryEngine>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            source,
            engine,
            store,
            query,
            sink: None,
            status: Mutex::new(JobStatus::idle()),
            cancel: Mutex::new(None),
            events,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn SnapshotSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Start a crawl in the background. Fails with
    /// [`DomainError::JobAlreadyRunning`] while another job is live.
    pub async fn start(self: &Arc<Self>, use_llm: bool) -> Result<String, DomainError> {
        let job_id = {
            let mut status = self.status.lock().await;
            if status.is_running() {
                return Err(DomainError::JobAlreadyRunning);
            }
            let job_id = Uuid::new_v4().to_string();
            *status = JobStatus::started(job_id.clone(), use_llm);
            job_id
        };

        let cancel = CancellationToken::new();
        *self.cancel.lock().await = Some(cancel.clone());

        let orchestrator = self.clone();
        let task_job_id = job_id.clone();
        tokio::spawn(async move {
            let outcome = orchestrator.run(&task_job_id, use_llm, cancel).await;
            orchestrator.finish(&task_job_id, outcome).await;
        });

        info!(job_id, use_llm, "crawl started");
        Ok(job_id)
    }

    /// Request cancellation of the running job. The job transitions to
    /// failed once the pipeline observes the token.
    pub async fn stop(&self) -> Result<(), DomainError> {
        let status = self.status.lock().await;
        if !status.is_running() {
            return Err(DomainError::invalid_input("no job is running"));
        }
        drop(status);

        if let Some(cancel) = self.cancel.lock().await.as_ref() {
            cancel.cancel();
        }
        Ok(())
    }

    pub async fn status(&self) -> JobStatus {
        self.status.lock().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobUpdate> {
        self.events.subscribe()
    }

    async fn run(
        &self,
        job_id: &str,
        use_llm: bool,
        cancel: CancellationToken,
    ) -> Result<(), DomainError> {
        self.enter_stage(job_id, Stage::Discover, "").await;
        let repos = self.source.discover().await?;
        if repos.is_empty() {
            return Err(DomainError::source_unavailable("no repositories discovered"));
        }
        self.log(job_id, format!("Discovered {} repositories", repos.len()))
            .await;

        if self.source.requires_clone() {
            self.enter_stage(job_id, Stage::Clone, "").await;
            // Sources that require cloning materialize working trees in
            // discover; nothing further to do here yet.
            self.log(job_id, "Working trees are up to date").await;
        } else {
            self.enter_stage(job_id, Stage::Clone, "skipped (local source)")
                .await;
        }

        let detail = if use_llm {
            "pattern + LLM extraction"
        } else {
            "pattern extraction"
        };
        self.enter_stage(job_id, Stage::Analyze, detail).await;

        let results: Vec<(String, Result<EntityBatch, DomainError>)> =
            stream::iter(repos.into_iter().map(|spec| {
                let engine = self.engine.clone();
                let cancel = cancel.clone();
                async move {
                    let batch = engine.extract_repo(&spec, use_llm, &cancel).await;
                    (spec.repo_name, batch)
                }
            }))
            .buffer_unordered(ANALYZE_CONCURRENCY)
            .collect()
            .await;

        // One broken repository must not sink the pass; only cancellation
        // aborts it.
        let mut combined = EntityBatch::new();
        for (repo, result) in results {
            match result {
                Ok(batch) => {
                    self.log(job_id, format!("Analyzed {repo}: {} entities", batch.len()))
                        .await;
                    combined.merge(batch);
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!(repo = %repo, error = %e, "repository skipped");
                    self.log(job_id, format!("Skipped {repo}: {e}")).await;
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(DomainError::Cancelled);
        }

        self.enter_stage(job_id, Stage::Output, "").await;
        let snapshot = self.store.commit(combined).await?;
        if let Some(sink) = &self.sink {
            let artifact = sink.write(&snapshot).await?;
            self.log(job_id, format!("Snapshot written to {}", artifact.display()))
                .await;
        }

        self.enter_stage(job_id, Stage::Reloading, "").await;
        let version = self.query.reindex().await?;
        self.log(job_id, format!("Indices serve snapshot v{version}"))
            .await;

        Ok(())
    }

    async fn finish(&self, job_id: &str, outcome: Result<(), DomainError>) {
        let mut status = self.status.lock().await;
        let (state, error) = match outcome {
            Ok(()) => {
                status.complete();
                info!(job_id, "crawl completed");
                (status.state, None)
            }
            Err(e) => {
                error!(job_id, error = %e, "crawl failed");
                status.fail(e.to_string());
                (status.state, Some(e.to_string()))
            }
        };
        drop(status);

        *self.cancel.lock().await = None;
        let _ = self.events.send(JobUpdate::Finished {
            job_id: job_id.to_string(),
            state,
            error,
        });
    }

    async fn enter_stage(&self, job_id: &str, stage: Stage, detail: &str) {
        let mut status = self.status.lock().await;
        status.enter_stage(stage, detail);
        let stage_index = status.stage_index;
        drop(status);

        debug_assert!(STAGE_ORDER.contains(&stage));
        let _ = self.events.send(JobUpdate::StageChanged {
            job_id: job_id.to_string(),
            stage,
            stage_index,
            detail: detail.to_string(),
        });
    }

    async fn log(&self, job_id: &str, line: impl Into<String>) {
        let line = line.into();
        self.status.lock().await.push_log(line.clone());
        let _ = self.events.send(JobUpdate::Log {
            job_id: job_id.to_string(),
            line,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::extraction::analyzers::default_registry;
    use crate::connector::adapter::MockEmbedding;
    use crate::domain::{EntityKind, JobState, SearchQuery};
    use async_trait::async_trait;
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;

    struct FixedSource {
        specs: Vec<crate::application::interfaces::RepoSpec>,
    }

    #[async_trait]
    impl RepoSource for FixedSource {
        async fn discover(
            &self,
        ) -> Result<Vec<crate::application::interfaces::RepoSpec>, DomainError> {
            Ok(self.specs.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl RepoSource for FailingSource {
        async fn discover(
            &self,
        ) -> Result<Vec<crate::application::interfaces::RepoSpec>, DomainError> {
            Err(DomainError::source_unavailable("roots missing"))
        }
    }

    fn fixture_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("models.py"),
            "class User(Base):\n    id = Column(Integer, primary_key=True)\n",
        )
        .unwrap();
        fs::write(dir.path().join("requirements.txt"), "requests==2.31\n").unwrap();
        dir
    }

    fn orchestrator(source: Arc<dyn RepoSource>) -> Arc<PipelineOrchestrator> {
        let store = Arc::new(KnowledgeStore::new());
        let query = Arc::new(QueryEngine::new(
            store.clone(),
            Arc::new(MockEmbedding::new(64)),
        ));
        let engine = Arc::new(ExtractionEngine::new(default_registry()));
        Arc::new(PipelineOrchestrator::new(source, engine, store, query))
    }

    async fn wait_until_done(orchestrator: &PipelineOrchestrator) -> JobStatus {
        for _ in 0..200 {
            let status = orchestrator.status().await;
            if !status.is_running() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job did not finish in time");
    }

    #[tokio::test]
    async fn full_pipeline_commits_and_reindexes() {
        let dir = fixture_repo();
        let source = Arc::new(FixedSource {
            specs: vec![crate::application::interfaces::RepoSpec::new(
                "fixture",
                dir.path().to_path_buf(),
            )],
        });
        let orchestrator = orchestrator(source);

        let mut events = orchestrator.subscribe();
        orchestrator.start(false).await.expect("start");
        let status = wait_until_done(&orchestrator).await;

        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.stage, Some(Stage::Reloading));
        assert_eq!(status.stage_index, 4);

        // Store and indices both serve the committed snapshot.
        let store = orchestrator.store.current().await;
        assert_eq!(store.version, 1);
        assert!(!store.list_by_kind(EntityKind::Schema).is_empty());
        let hits = orchestrator.query.search(&SearchQuery::new("User")).await;
        assert!(!hits.is_empty());

        // Subscribers saw stage transitions and the terminal event.
        let mut saw_finished = false;
        while let Ok(update) = events.try_recv() {
            if let JobUpdate::Finished { state, .. } = update {
                assert_eq!(state, JobState::Completed);
                saw_finished = true;
            }
        }
        assert!(saw_finished);
    }

    #[tokio::test]
    async fn broken_repository_is_skipped_and_logged() {
        let dir = fixture_repo();
        let source = Arc::new(FixedSource {
            specs: vec![
                crate::application::interfaces::RepoSpec::new(
                    "fixture",
                    dir.path().to_path_buf(),
                ),
                crate::application::interfaces::RepoSpec::new(
                    "ghost",
                    PathBuf::from("/nonexistent/ghost-repo"),
                ),
            ],
        });
        let orchestrator = orchestrator(source);

        orchestrator.start(false).await.expect("start");
        let status = wait_until_done(&orchestrator).await;

        // The bad working tree is recorded, the good one is committed.
        assert_eq!(status.state, JobState::Completed);
        assert!(status.log.iter().any(|l| l.contains("Skipped ghost")));

        let snapshot = orchestrator.store.current().await;
        assert_eq!(snapshot.version, 1);
        assert!(!snapshot.list_by_kind(EntityKind::Schema).is_empty());
    }

    #[tokio::test]
    async fn second_start_is_rejected_while_running() {
        let dir = fixture_repo();
        let source = Arc::new(FixedSource {
            specs: vec![crate::application::interfaces::RepoSpec::new(
                "fixture",
                dir.path().to_path_buf(),
            )],
        });
        let orchestrator = orchestrator(source);

        orchestrator.start(false).await.expect("start");
        let second = orchestrator.start(false).await;
        assert!(matches!(second, Err(DomainError::JobAlreadyRunning)));

        wait_until_done(&orchestrator).await;
        // A finished job frees the slot.
        orchestrator.start(false).await.expect("restart");
        wait_until_done(&orchestrator).await;
    }

    #[tokio::test]
    async fn discover_failure_fails_without_advancing_stage() {
        let orchestrator = orchestrator(Arc::new(FailingSource));
        orchestrator.start(false).await.expect("start");
        let status = wait_until_done(&orchestrator).await;

        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.stage, Some(Stage::Discover));
        assert_eq!(status.stage_index, 0);
        assert!(status.error.as_deref().unwrap_or("").contains("roots missing"));
    }

    #[tokio::test]
    async fn stop_without_job_is_an_error() {
        let orchestrator = orchestrator(Arc::new(FailingSource));
        let result = orchestrator.stop().await;
        assert!(matches!(result, Err(DomainError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn stop_during_analyze_fails_the_job() {
        // Many repositories keep the analyze stage busy long enough for
        // the cancellation to land between files.
        let dirs: Vec<tempfile::TempDir> = (0..20).map(|_| fixture_repo()).collect();
        let specs = dirs
            .iter()
            .enumerate()
            .map(|(i, d)| {
                crate::application::interfaces::RepoSpec::new(
                    format!("repo-{i}"),
                    d.path().to_path_buf(),
                )
            })
            .collect();
        let orchestrator = orchestrator(Arc::new(FixedSource { specs }));

        orchestrator.start(false).await.expect("start");
        // Let the job reach a running stage, then cancel.
        tokio::time::sleep(Duration::from_millis(5)).await;
        if orchestrator.status().await.is_running() {
            orchestrator.stop().await.expect("stop");
            let status = wait_until_done(&orchestrator).await;
            // Either the cancel landed mid-pipeline, or the job won the
            // race and completed.
            assert!(matches!(status.state, JobState::Failed | JobState::Completed));
            if status.state == JobState::Failed {
                assert!(status
                    .error
                    .as_deref()
                    .unwrap_or("")
                    .to_lowercase()
                    .contains("cancel"));
            }
        }
    }
}

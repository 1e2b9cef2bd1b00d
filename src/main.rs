use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use codeatlas::application::extraction::analyzers::default_registry;
use codeatlas::connector::adapter::read_snapshot;
use codeatlas::connector::api::{serve, AppState};
use codeatlas::{
    AnthropicClient, EntityKind, ExtractionEngine, FileSnapshotWriter, JobState, JobUpdate,
    KnowledgeStore, LlmClient, LlmExtractor, LocalRepoSource, MockEmbedding, MockLlm,
    PipelineOrchestrator, QueryEngine, SearchQuery,
};

#[derive(Parser)]
#[command(name = "codeatlas")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory for snapshot artifacts.
    #[arg(short, long, global = true, default_value = "~/.codeatlas")]
    data_dir: String,

    /// Root directories scanned for repositories.
    #[arg(short, long, global = true)]
    root: Vec<String>,

    /// Use a scripted model instead of a live endpoint.
    #[arg(long, global = true)]
    mock_llm: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API.
    Serve {
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Run one crawl pass and print the resulting summary.
    Crawl {
        /// Enrich pattern extraction with LLM extraction.
        #[arg(long)]
        use_llm: bool,
    },

    /// Keyword search over the latest snapshot.
    Search {
        query: String,

        #[arg(long, default_value = "10")]
        num: usize,

        #[arg(short, long)]
        kind: Option<String>,

        #[arg(long)]
        repo: Option<String>,
    },

    /// Semantic search over the latest snapshot.
    Semantic {
        query: String,

        #[arg(long, default_value = "10")]
        num: usize,
    },

    /// Assemble a retrieval context for a question.
    Ask {
        question: String,

        #[arg(long, default_value = "10")]
        num: usize,
    },

    /// List entities of one kind.
    Entities { kind: String },

    /// Print snapshot headline counts.
    Summary,
}

struct App {
    store: Arc<KnowledgeStore>,
    query: Arc<QueryEngine>,
    orchestrator: Arc<PipelineOrchestrator>,
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let data_dir = PathBuf::from(expand_tilde(&cli.data_dir));
    std::fs::create_dir_all(&data_dir)?;

    let roots: Vec<PathBuf> = if cli.root.is_empty() {
        vec![std::env::current_dir()?]
    } else {
        cli.root.iter().map(|r| PathBuf::from(expand_tilde(r))).collect()
    };

    let llm: Arc<dyn LlmClient> = if cli.mock_llm {
        info!("Using scripted mock model");
        Arc::new(MockLlm::single("{}"))
    } else {
        info!("Model endpoint: {}", AnthropicClient::configured_base_url());
        Arc::new(AnthropicClient::from_env())
    };

    let store = Arc::new(KnowledgeStore::new());
    let query = Arc::new(QueryEngine::new(store.clone(), Arc::new(MockEmbedding::default())));
    let engine = Arc::new(
        ExtractionEngine::new(default_registry()).with_llm(Arc::new(LlmExtractor::new(llm))),
    );
    let source = Arc::new(LocalRepoSource::new(roots));
    let writer = Arc::new(FileSnapshotWriter::new(&data_dir));
    let orchestrator = Arc::new(
        PipelineOrchestrator::new(source, engine, store.clone(), query.clone())
            .with_sink(writer),
    );

    let app = App {
        store,
        query,
        orchestrator,
        data_dir,
    };

    match cli.command {
        Commands::Serve { port } => {
            app.load_latest_snapshot().await?;
            let state = Arc::new(AppState {
                store: app.store.clone(),
                query: app.query.clone(),
                orchestrator: app.orchestrator.clone(),
            });
            serve(port, state).await?;
        }

        Commands::Crawl { use_llm } => {
            app.crawl(use_llm).await?;
        }

        Commands::Search {
            query,
            num,
            kind,
            repo,
        } => {
            app.load_latest_snapshot().await?;
            let mut search = SearchQuery::new(&query).with_limit(num);
            if let Some(kind) = kind.as_deref() {
                search = search.with_kind(parse_kind(kind)?);
            }
            if let Some(repo) = repo {
                search = search.with_repo(repo);
            }
            let hits = app.query.search(&search).await;
            print_hits(&hits);
        }

        Commands::Semantic { query, num } => {
            app.load_latest_snapshot().await?;
            let hits = app
                .query
                .semantic_search(&SearchQuery::new(&query).with_limit(num))
                .await?;
            print_hits(&hits);
        }

        Commands::Ask { question, num } => {
            app.load_latest_snapshot().await?;
            let answer = app.query.ask(&question, num).await?;
            if answer.sources.is_empty() {
                println!("No relevant knowledge found.");
            } else {
                println!("{}\n", answer.context);
                println!("Sources:");
                for source in &answer.sources {
                    println!(
                        "  {} {} ({}) score {:.3}",
                        source.kind, source.name, source.repo, source.score
                    );
                }
            }
        }

        Commands::Entities { kind } => {
            app.load_latest_snapshot().await?;
            let entities = app.store.list_by_kind(parse_kind(&kind)?).await;
            if entities.is_empty() {
                println!("No {kind} entities.");
            } else {
                for entity in entities {
                    println!("  {} ({})", entity.name(), entity.repo());
                }
            }
        }

        Commands::Summary => {
            app.load_latest_snapshot().await?;
            let summary = app.store.summary().await;
            println!("Snapshot v{}", summary.version);
            println!("Entities:      {}", summary.total_entities);
            println!("Relationships: {}", summary.total_relationships);
            for (kind, count) in &summary.entities_by_kind {
                println!("  {kind}: {count}");
            }
            println!("Repositories:  {}", summary.repositories.join(", "));
        }
    }

    Ok(())
}

impl App {
    /// Restore the newest snapshot artifact, if any, and build indices.
    async fn load_latest_snapshot(&self) -> Result<()> {
        let mut artifacts: Vec<(u64, PathBuf)> = std::fs::read_dir(&self.data_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                let name = path.file_name()?.to_str()?;
                let version = name
                    .strip_prefix("snapshot-v")?
                    .strip_suffix(".json")?
                    .parse()
                    .ok()?;
                Some((version, path))
            })
            .collect();
        artifacts.sort();

        if let Some((version, path)) = artifacts.pop() {
            info!("Loading snapshot v{version} from {}", path.display());
            let snapshot = read_snapshot(&path)?;
            self.store.restore(snapshot).await;
            self.query.reindex().await?;
        }
        Ok(())
    }

    async fn crawl(&self, use_llm: bool) -> Result<()> {
        let mut events = self.orchestrator.subscribe();
        let job_id = self.orchestrator.start(use_llm).await?;

        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(100));

        loop {
            match events.recv().await {
                Ok(JobUpdate::StageChanged { stage, detail, .. }) => {
                    if detail.is_empty() {
                        bar.set_message(format!("{stage}"));
                    } else {
                        bar.set_message(format!("{stage}: {detail}"));
                    }
                }
                Ok(JobUpdate::Log { line, .. }) => {
                    bar.println(format!("  {line}"));
                }
                Ok(JobUpdate::Finished { state, error, .. }) => {
                    bar.finish_and_clear();
                    match state {
                        JobState::Completed => {
                            let summary = self.store.summary().await;
                            println!(
                                "Crawl {job_id} finished: {} entities, {} relationships (snapshot v{})",
                                summary.total_entities,
                                summary.total_relationships,
                                summary.version
                            );
                        }
                        _ => {
                            anyhow::bail!(
                                "crawl failed: {}",
                                error.unwrap_or_else(|| "unknown error".to_string())
                            );
                        }
                    }
                    break;
                }
                Err(_) => break,
            }
        }
        Ok(())
    }
}

fn parse_kind(kind: &str) -> Result<EntityKind> {
    EntityKind::parse(kind).ok_or_else(|| anyhow::anyhow!("unknown entity kind: {kind}"))
}

fn print_hits(hits: &[codeatlas::SearchHit]) {
    if hits.is_empty() {
        println!("No results found.");
        return;
    }
    println!("Found {} results:\n", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. {} {} ({}) score {:.3}",
            i + 1,
            hit.key.kind,
            hit.key.name,
            hit.key.repo,
            hit.score
        );
        if !hit.snippet.is_empty() {
            println!("   | {}", hit.snippet.lines().next().unwrap_or(""));
        }
        println!();
    }
}

fn expand_tilde(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            if path == "~" {
                return home.to_string_lossy().to_string();
            }
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod cli_tests {
    use super::*;

    #[test]
    fn crawl_accepts_use_llm_flag() {
        let cli = Cli::try_parse_from(["codeatlas", "crawl", "--use-llm"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn roots_are_repeatable() {
        let cli = Cli::try_parse_from(["codeatlas", "--root", "/a", "--root", "/b", "summary"])
            .expect("parse");
        assert_eq!(cli.root.len(), 2);
    }
}

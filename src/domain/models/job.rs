use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Maximum number of log lines retained per job.
pub const JOB_LOG_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

/// Pipeline stages, in strict execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discover,
    Clone,
    Analyze,
    Output,
    Reloading,
}

/// Execution order of the pipeline stages.
pub const STAGE_ORDER: [Stage; 5] = [
    Stage::Discover,
    Stage::Clone,
    Stage::Analyze,
    Stage::Output,
    Stage::Reloading,
];

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Discover => "discover",
            Stage::Clone => "clone",
            Stage::Analyze => "analyze",
            Stage::Output => "output",
            Stage::Reloading => "reloading",
        }
    }

    pub fn index(&self) -> usize {
        STAGE_ORDER.iter().position(|s| s == self).unwrap_or(0)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Point-in-time view of a crawl job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: String,
    pub state: JobState,
    pub stage: Option<Stage>,
    /// -1 before the first stage starts.
    pub stage_index: i32,
    pub total_stages: usize,
    pub stage_detail: String,
    pub use_llm: bool,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
    pub error: Option<String>,
    pub log: VecDeque<String>,
}

impl JobStatus {
    pub fn idle() -> Self {
        Self {
            job_id: "none".to_string(),
            state: JobState::Idle,
            stage: None,
            stage_index: -1,
            total_stages: STAGE_ORDER.len(),
            stage_detail: String::new(),
            use_llm: false,
            started_at: None,
            completed_at: None,
            error: None,
            log: VecDeque::new(),
        }
    }

    pub fn started(job_id: impl Into<String>, use_llm: bool) -> Self {
        Self {
            job_id: job_id.into(),
            state: JobState::Running,
            stage: None,
            stage_index: -1,
            total_stages: STAGE_ORDER.len(),
            stage_detail: String::new(),
            use_llm,
            started_at: Some(unix_now()),
            completed_at: None,
            error: None,
            log: VecDeque::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == JobState::Running
    }

    /// Append a log line, evicting the oldest once the ring is full.
    pub fn push_log(&mut self, line: impl Into<String>) {
        if self.log.len() >= JOB_LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(line.into());
    }

    pub fn enter_stage(&mut self, stage: Stage, detail: impl Into<String>) {
        let detail = detail.into();
        self.stage = Some(stage);
        self.stage_index = stage.index() as i32;
        self.stage_detail = detail.clone();
        if detail.is_empty() {
            self.push_log(format!("Stage: {stage}"));
        } else {
            self.push_log(format!("Stage: {stage} - {detail}"));
        }
    }

    pub fn complete(&mut self) {
        self.state = JobState::Completed;
        self.completed_at = Some(unix_now());
        self.push_log("Crawl pipeline finished successfully");
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        let error = error.into();
        self.state = JobState::Failed;
        self.completed_at = Some(unix_now());
        self.push_log(format!("Pipeline failed: {error}"));
        self.error = Some(error);
    }
}

/// Incremental event delivered to live job subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobUpdate {
    StageChanged {
        job_id: String,
        stage: Stage,
        stage_index: i32,
        detail: String,
    },
    Log {
        job_id: String,
        line: String,
    },
    Finished {
        job_id: String,
        state: JobState,
        error: Option<String>,
    },
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

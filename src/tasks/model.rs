//! Task records and the worker's result payload.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TaskError;

/// Status of a crawl task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Worker has been started (or is being started) and has not finished.
    Running,
    /// Worker produced a result.
    Completed,
    /// Launch failure, worker crash, monitor timeout, or a worker-reported failure.
    Failed,
    /// Worker reported that it hit its own time limit.
    Timeout,
    /// Worker reported that it was cancelled.
    Cancelled,
}

impl TaskStatus {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Job variant handed to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlMode {
    /// Collect metadata and download images.
    Image,
    /// Collect metadata only.
    Data,
}

impl CrawlMode {
    pub const ALL: [CrawlMode; 2] = [CrawlMode::Image, CrawlMode::Data];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Data => "data",
        }
    }
}

impl std::fmt::Display for CrawlMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrawlMode {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| TaskError::InvalidMode {
                mode: s.to_string(),
                expected: Self::ALL
                    .iter()
                    .map(|m| format!("'{m}'"))
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

/// What ended a task unsuccessfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The worker process could not be started.
    LaunchFailed,
    /// The worker exited without writing a result.
    ProcessExited,
    /// The monitor gave up waiting for a result.
    Timeout,
    /// The worker wrote a result with a non-completed status.
    Worker,
}

/// Error attached to a task that did not complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: ErrorKind,
    pub message: String,
    /// Exception/error class name reported by the worker, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

impl TaskFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            error_type: None,
        }
    }
}

/// In-memory record of one submitted crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub status: TaskStatus,
    pub mode: CrawlMode,
    pub logs: Vec<String>,
    pub results: Vec<serde_json::Value>,
    pub artifacts: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// Create a fresh running record.
    pub fn new(mode: CrawlMode) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: TaskStatus::Running,
            mode,
            logs: Vec::new(),
            results: Vec::new(),
            artifacts: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    /// Mark the record failed, appending `message` as a diagnostic log line.
    pub fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) {
        let message = message.into();
        self.logs.push(message.clone());
        self.status = TaskStatus::Failed;
        self.error = Some(TaskFailure::new(kind, message));
    }

    /// Merge the worker's final payload into the record.
    ///
    /// Logs are replaced only when the payload carries them; results and
    /// artifacts always take the payload's values.
    pub fn apply_payload(&mut self, payload: ResultPayload) {
        self.status = payload.status;
        if let Some(logs) = payload.logs {
            self.logs = logs;
        }
        self.results = payload.results;
        self.artifacts = payload.artifacts;
        self.error = if payload.status == TaskStatus::Completed {
            None
        } else {
            Some(TaskFailure {
                kind: ErrorKind::Worker,
                message: payload
                    .error
                    .unwrap_or_else(|| format!("Worker reported status {}", payload.status)),
                error_type: payload.error_type,
            })
        };
    }
}

/// Final payload the worker writes to its result artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultPayload {
    pub status: TaskStatus,
    #[serde(default)]
    pub logs: Option<Vec<String>>,
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
    #[serde(default, alias = "images")]
    pub artifacts: Vec<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_type: Option<String>,
}

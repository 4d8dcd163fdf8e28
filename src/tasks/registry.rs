//! Task registry — in-memory map from task ID to its current record.
//!
//! Every mutation is applied to a clone and swapped in under the write lock,
//! so readers only ever see a complete before- or after-record.

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::TaskError;
use crate::tasks::model::{CrawlMode, TaskRecord, TaskStatus};

/// Holds every task submitted during this process's lifetime.
pub struct TaskRegistry {
    tasks: RwLock<HashMap<Uuid, TaskRecord>>,
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Allocate a new running task and return its ID.
    pub async fn create(&self, mode: CrawlMode) -> Uuid {
        let mut record = TaskRecord::new(mode);
        let mut tasks = self.tasks.write().await;
        // v4 collisions are not expected, but the ID must stay unique.
        while tasks.contains_key(&record.id) {
            record.id = Uuid::new_v4();
        }
        let id = record.id;
        tasks.insert(id, record);
        drop(tasks);

        info!(task_id = %id, mode = %mode, "Task created");
        id
    }

    /// Snapshot of a task's current record.
    pub async fn get(&self, id: Uuid) -> Option<TaskRecord> {
        self.tasks.read().await.get(&id).cloned()
    }

    /// Apply a non-terminal change to a running task.
    pub async fn update<F, R>(&self, id: Uuid, f: F) -> Result<R, TaskError>
    where
        F: FnOnce(&mut TaskRecord) -> R,
    {
        let mut tasks = self.tasks.write().await;
        let current = tasks.get(&id).ok_or(TaskError::NotFound { id })?;
        if current.status.is_terminal() {
            return Err(TaskError::AlreadyTerminal {
                id,
                status: current.status.to_string(),
            });
        }

        let mut next = current.clone();
        let out = f(&mut next);
        if next.status.is_terminal() {
            return Err(TaskError::UnexpectedTerminal {
                id,
                status: next.status.to_string(),
            });
        }
        next.id = id;
        next.updated_at = Utc::now();
        tasks.insert(id, next);
        Ok(out)
    }

    /// Append a line to a running task's log.
    pub async fn append_log(&self, id: Uuid, line: impl Into<String>) -> Result<(), TaskError> {
        let line = line.into();
        self.update(id, |record| record.logs.push(line)).await
    }

    /// Write the task's terminal state. Succeeds at most once per task.
    ///
    /// `f` must leave the record in a terminal status; otherwise nothing is
    /// written. Returns the stored record.
    pub async fn finish<F>(&self, id: Uuid, f: F) -> Result<TaskRecord, TaskError>
    where
        F: FnOnce(&mut TaskRecord),
    {
        let mut tasks = self.tasks.write().await;
        let current = tasks.get(&id).ok_or(TaskError::NotFound { id })?;
        if current.status.is_terminal() {
            return Err(TaskError::AlreadyTerminal {
                id,
                status: current.status.to_string(),
            });
        }

        let mut next = current.clone();
        f(&mut next);
        if !next.status.is_terminal() {
            return Err(TaskError::NotTerminal {
                id,
                status: next.status.to_string(),
            });
        }

        let now = Utc::now();
        next.id = id;
        next.updated_at = now;
        next.finished_at = Some(now);
        tasks.insert(id, next.clone());
        drop(tasks);

        debug!(task_id = %id, status = %next.status, "Task reached terminal state");
        Ok(next)
    }

    /// Number of tasks ever submitted.
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Check if no task has been submitted.
    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    /// Count tasks per status.
    pub async fn summary(&self) -> RegistrySummary {
        let tasks = self.tasks.read().await;

        let mut summary = RegistrySummary::default();
        for record in tasks.values() {
            match record.status {
                TaskStatus::Running => summary.running += 1,
                TaskStatus::Completed => summary.completed += 1,
                TaskStatus::Failed => summary.failed += 1,
                TaskStatus::Timeout => summary.timeout += 1,
                TaskStatus::Cancelled => summary.cancelled += 1,
            }
        }

        summary.total = tasks.len();
        summary
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-status task counts.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrySummary {
    pub total: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub timeout: usize,
    pub cancelled: usize,
}

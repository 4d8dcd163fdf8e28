//! Log reader — on-demand tail of a worker's log artifact.

use std::io::ErrorKind;
use std::path::Path;

use serde::Serialize;
use tokio::fs;
use uuid::Uuid;

use crate::artifacts::ArtifactStore;
use crate::error::LogError;

/// Default number of lines returned by a log query.
pub const DEFAULT_TAIL: usize = 50;

/// The last lines of a log plus the total line count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogTail {
    pub lines: Vec<String>,
    pub total_line_count: usize,
}

/// Reads worker logs fresh on every call; nothing is cached.
#[derive(Debug, Clone)]
pub struct LogReader {
    store: ArtifactStore,
}

impl LogReader {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }

    /// Last `n` lines of the task's log. Empty if the worker has not logged yet.
    pub async fn tail(&self, task_id: Uuid, n: usize) -> Result<LogTail, LogError> {
        tail_file(&self.store.log_path(task_id), n).await
    }
}

/// Last `n` lines of the file at `path`, in file order.
pub async fn tail_file(path: &Path, n: usize) -> Result<LogTail, LogError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(LogTail::default()),
        Err(source) => {
            return Err(LogError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let content = String::from_utf8_lossy(&bytes);
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(n);

    Ok(LogTail {
        lines: all[start..].iter().map(|l| l.to_string()).collect(),
        total_line_count: all.len(),
    })
}

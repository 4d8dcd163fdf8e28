//! File-backed artifact store for worker results and logs.
//!
//! Two directories, both created at startup:
//! - results: `{task_id}.json`, written once by the worker when it finishes
//! - logs: `{task_id}.log`, appended by the worker while it runs
//!
//! The worker owns both files while its task is running. Nothing here locks
//! them; readers must tolerate catching a file mid-write.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::error::ArtifactError;
use crate::tasks::model::ResultPayload;

/// File extensions for the per-task artifacts.
pub mod paths {
    pub const RESULT_EXT: &str = "json";
    pub const LOG_EXT: &str = "log";
}

/// Path derivation and reads for per-task artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    results_dir: PathBuf,
    logs_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(results_dir: impl Into<PathBuf>, logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
            logs_dir: logs_dir.into(),
        }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(config.results_dir.clone(), config.logs_dir.clone())
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    /// Path the worker writes its final payload to.
    pub fn result_path(&self, task_id: Uuid) -> PathBuf {
        self.results_dir.join(format!("{task_id}.{}", paths::RESULT_EXT))
    }

    /// Path the worker appends its log lines to.
    pub fn log_path(&self, task_id: Uuid) -> PathBuf {
        self.logs_dir.join(format!("{task_id}.{}", paths::LOG_EXT))
    }

    /// Ensure both artifact directories exist.
    pub async fn ensure_dirs(&self) -> Result<(), ArtifactError> {
        for dir in [&self.results_dir, &self.logs_dir] {
            fs::create_dir_all(dir)
                .await
                .map_err(|source| ArtifactError::Io {
                    path: dir.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Read and decode the task's result artifact.
    ///
    /// `Ok(None)` means the worker has not written it yet. A decode error may
    /// just mean the worker is still writing.
    pub async fn read_result(&self, task_id: Uuid) -> Result<Option<ResultPayload>, ArtifactError> {
        let path = self.result_path(task_id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ArtifactError::Io { path, source }),
        };

        let payload: ResultPayload = serde_json::from_slice(&bytes)
            .map_err(|source| ArtifactError::Decode {
                path: path.clone(),
                source,
            })?;

        if !payload.status.is_terminal() {
            return Err(ArtifactError::NotTerminal {
                path,
                status: payload.status.to_string(),
            });
        }

        Ok(Some(payload))
    }
}

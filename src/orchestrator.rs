//! Orchestrator — task submission and queries.
//!
//! Submission creates the record, launches the worker and hands it to a
//! monitor. Status and log queries are plain reads and never wait on a
//! monitor.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::artifacts::ArtifactStore;
use crate::config::OrchestratorConfig;
use crate::error::{Error, TaskError};
use crate::tasks::logs::{LogReader, LogTail};
use crate::tasks::model::{CrawlMode, ErrorKind, TaskRecord};
use crate::tasks::registry::TaskRegistry;
use crate::worker::launcher::{JobParameters, WorkerLauncher};
use crate::worker::monitor::{MonitorOutcome, MonitorSettings, ResultMonitor};

/// Owns the registry and everything needed to run crawl tasks.
pub struct Orchestrator {
    registry: Arc<TaskRegistry>,
    store: ArtifactStore,
    launcher: WorkerLauncher,
    logs: LogReader,
    settings: MonitorSettings,
    /// Monitor handles, by task. Finished handles are pruned on submit.
    monitors: Mutex<HashMap<Uuid, JoinHandle<MonitorOutcome>>>,
}

impl Orchestrator {
    /// Create an orchestrator with its own registry.
    pub fn new(config: &OrchestratorConfig) -> Self {
        Self::with_registry(config, Arc::new(TaskRegistry::new()))
    }

    /// Create an orchestrator around an existing registry.
    pub fn with_registry(config: &OrchestratorConfig, registry: Arc<TaskRegistry>) -> Self {
        let store = ArtifactStore::from_config(config);
        Self {
            registry,
            launcher: WorkerLauncher::from_config(config, store.clone()),
            logs: LogReader::new(store.clone()),
            store,
            settings: MonitorSettings::from_config(config),
            monitors: Mutex::new(HashMap::new()),
        }
    }

    /// Create the artifact directories. Call once before serving.
    pub async fn init(&self) -> Result<(), Error> {
        self.store.ensure_dirs().await?;
        info!(
            results_dir = %self.store.results_dir().display(),
            logs_dir = %self.store.logs_dir().display(),
            "Artifact directories ready"
        );
        Ok(())
    }

    /// Start a crawl and return its task ID.
    ///
    /// A launch failure does not fail the call: the task is recorded as
    /// failed and no monitor is started.
    pub async fn submit(&self, mode: CrawlMode, params: JobParameters) -> Uuid {
        let task_id = self.registry.create(mode).await;

        let worker = match self.launcher.launch(task_id, &params, mode) {
            Ok(worker) => worker,
            Err(e) => {
                error!(task_id = %task_id, error = %e, "Failed to start worker");
                let message = format!("Failed to start worker: {e}");
                if let Err(e) = self
                    .registry
                    .finish(task_id, |record| record.fail(ErrorKind::LaunchFailed, message))
                    .await
                {
                    error!(task_id = %task_id, error = %e, "Could not record launch failure");
                }
                return task_id;
            }
        };

        let monitor = ResultMonitor::new(
            task_id,
            Arc::clone(&self.registry),
            self.store.clone(),
            self.settings.clone(),
        );
        let handle = monitor.spawn(worker);
        let mut monitors = self.monitors.lock().await;
        monitors.retain(|_, h| !h.is_finished());
        monitors.insert(task_id, handle);

        task_id
    }

    /// Current snapshot of a task.
    pub async fn status(&self, task_id: Uuid) -> Result<TaskRecord, TaskError> {
        self.registry
            .get(task_id)
            .await
            .ok_or(TaskError::NotFound { id: task_id })
    }

    /// Last `tail` lines of a task's worker log.
    pub async fn logs(&self, task_id: Uuid, tail: usize) -> Result<LogTail, Error> {
        if self.registry.get(task_id).await.is_none() {
            return Err(TaskError::NotFound { id: task_id }.into());
        }
        Ok(self.logs.tail(task_id, tail).await?)
    }

    /// Wait for a task's monitor to finish.
    ///
    /// `None` if the task never had a monitor (unknown ID or launch failure),
    /// it was already awaited, or it finished and was pruned.
    pub async fn wait_for(&self, task_id: Uuid) -> Option<MonitorOutcome> {
        let handle = self.monitors.lock().await.remove(&task_id)?;
        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!(task_id = %task_id, error = %e, "Monitor task panicked");
                None
            }
        }
    }

    /// Number of tracked monitor handles.
    pub async fn tracked_monitors(&self) -> usize {
        self.monitors.lock().await.len()
    }

    /// Number of monitors still polling.
    pub async fn active_monitors(&self) -> usize {
        self.monitors
            .lock()
            .await
            .values()
            .filter(|h| !h.is_finished())
            .count()
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }
}

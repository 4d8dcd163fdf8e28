//! Result monitor — watches one worker until it produces a result, exits, or
//! runs out of time.
//!
//! ```text
//! Waiting ──result artifact decoded──▶ FoundResult
//!    │ ──worker exited, no result───▶ ProcessExited
//!    └ ──max_ticks elapsed──────────▶ TimedOut (terminate, grace, kill)
//! ```
//!
//! The monitor is the only writer of its task's terminal state. The timeout
//! is counted in ticks, so it does not depend on OS signal delivery.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::artifacts::ArtifactStore;
use crate::config::OrchestratorConfig;
use crate::tasks::model::{ErrorKind, TaskRecord};
use crate::tasks::registry::TaskRegistry;
use crate::worker::launcher::WorkerHandle;

/// How long to wait for the output pipes to drain after the worker exits.
const OUTPUT_FLUSH_WAIT: Duration = Duration::from_millis(500);

/// Stderr lines copied into the task log when a worker dies.
const STDERR_DIAGNOSTIC_LINES: usize = 5;

/// Terminal state of a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    FoundResult,
    ProcessExited,
    /// Gave up after `ticks` polls.
    TimedOut { ticks: u64 },
}

/// Polling and timeout settings.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub tick_interval: Duration,
    pub max_ticks: u64,
    pub kill_grace: Duration,
}

impl MonitorSettings {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            tick_interval: config.tick_interval,
            max_ticks: config.max_ticks,
            kill_grace: config.kill_grace,
        }
    }

    fn timeout_message(&self) -> String {
        let timeout = self.tick_interval.as_secs_f64() * self.max_ticks as f64;
        format!("Task timeout after {timeout} seconds")
    }
}

/// Watches a single task's worker.
pub struct ResultMonitor {
    task_id: Uuid,
    registry: Arc<TaskRegistry>,
    store: ArtifactStore,
    settings: MonitorSettings,
}

impl ResultMonitor {
    pub fn new(
        task_id: Uuid,
        registry: Arc<TaskRegistry>,
        store: ArtifactStore,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            task_id,
            registry,
            store,
            settings,
        }
    }

    /// Run the monitor on the runtime.
    pub fn spawn(self, worker: WorkerHandle) -> JoinHandle<MonitorOutcome> {
        tokio::spawn(self.run(worker))
    }

    /// Poll once per tick until a terminal state is reached.
    pub async fn run(self, mut worker: WorkerHandle) -> MonitorOutcome {
        let task_id = self.task_id;
        let mut elapsed: u64 = 0;

        while elapsed < self.settings.max_ticks {
            tokio::time::sleep(self.settings.tick_interval).await;
            elapsed += 1;

            match self.store.read_result(task_id).await {
                Ok(Some(payload)) => {
                    info!(task_id = %task_id, status = %payload.status, ticks = elapsed, "Worker result found");
                    self.finish(|record| record.apply_payload(payload)).await;
                    return MonitorOutcome::FoundResult;
                }
                Ok(None) => {}
                Err(e) => {
                    // Most likely caught mid-write; try again next tick.
                    debug!(task_id = %task_id, error = %e, "Result artifact not ready");
                    continue;
                }
            }

            match worker.try_exit() {
                Ok(Some(status)) => {
                    // The result may have landed between the read and the exit check.
                    if let Ok(Some(payload)) = self.store.read_result(task_id).await {
                        info!(task_id = %task_id, status = %payload.status, "Worker result found at exit");
                        self.finish(|record| record.apply_payload(payload)).await;
                        return MonitorOutcome::FoundResult;
                    }

                    worker.flush_output(OUTPUT_FLUSH_WAIT).await;
                    let stderr = worker.stderr_tail(STDERR_DIAGNOSTIC_LINES);

                    warn!(task_id = %task_id, %status, "Worker exited without generating result");
                    let message = format!("Worker exited without generating result ({status})");
                    self.finish(|record| {
                        record.fail(ErrorKind::ProcessExited, message);
                        record
                            .logs
                            .extend(stderr.into_iter().map(|line| format!("[stderr] {line}")));
                    })
                    .await;
                    return MonitorOutcome::ProcessExited;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "Failed to poll worker status");
                }
            }
        }

        let message = self.settings.timeout_message();
        warn!(task_id = %task_id, ticks = elapsed, "{message}");
        self.finish(|record| record.fail(ErrorKind::Timeout, message)).await;

        match worker.shutdown(self.settings.kill_grace).await {
            Ok(outcome) => debug!(task_id = %task_id, ?outcome, "Timed-out worker stopped"),
            Err(e) => warn!(task_id = %task_id, error = %e, "Failed to stop timed-out worker"),
        }

        MonitorOutcome::TimedOut { ticks: elapsed }
    }

    async fn finish<F>(&self, f: F)
    where
        F: FnOnce(&mut TaskRecord),
    {
        if let Err(e) = self.registry.finish(self.task_id, f).await {
            warn!(task_id = %self.task_id, error = %e, "Terminal write rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::model::{CrawlMode, TaskStatus};
    use crate::worker::launcher::{JobParameters, WorkerLauncher};

    const TICK: Duration = Duration::from_millis(20);

    struct Harness {
        _dir: tempfile::TempDir,
        registry: Arc<TaskRegistry>,
        store: ArtifactStore,
    }

    async fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("results"), dir.path().join("logs"));
        store.ensure_dirs().await.unwrap();
        Harness {
            _dir: dir,
            registry: Arc::new(TaskRegistry::new()),
            store,
        }
    }

    impl Harness {
        async fn run(&self, script: &str, max_ticks: u64) -> (Uuid, MonitorOutcome) {
            let id = self.registry.create(CrawlMode::Data).await;
            let launcher = WorkerLauncher::new(
                "sh",
                vec!["-c".to_string(), script.to_string(), "worker".to_string()],
                self.store.clone(),
            );
            let worker = launcher
                .launch(id, &JobParameters::new("1", "cookie"), CrawlMode::Data)
                .unwrap();
            let monitor = ResultMonitor::new(
                id,
                Arc::clone(&self.registry),
                self.store.clone(),
                MonitorSettings {
                    tick_interval: TICK,
                    max_ticks,
                    kill_grace: Duration::from_millis(500),
                },
            );
            (id, monitor.spawn(worker).await.unwrap())
        }
    }

    #[tokio::test]
    async fn well_formed_result_completes_task() {
        let h = harness().await;
        let (id, outcome) = h
            .run(
                r#"printf '%s' '{"status":"completed","logs":["a","b"],"results":[{"x":1}],"images":[]}' > "$5""#,
                250,
            )
            .await;

        assert_eq!(outcome, MonitorOutcome::FoundResult);
        let record = h.registry.get(id).await.unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.logs, vec!["a", "b"]);
        assert_eq!(record.results, vec![serde_json::json!({"x": 1})]);
        assert!(record.artifacts.is_empty());
        assert!(record.error.is_none());
        assert!(record.finished_at.is_some());
    }

    #[tokio::test]
    async fn worker_reported_failure_is_kept() {
        let h = harness().await;
        let (id, outcome) = h
            .run(
                r#"printf '%s' '{"status":"failed","logs":["boom"],"results":[],"images":[],"error":"login required","error_type":"AuthError"}' > "$CRAWL_RESULT_FILE""#,
                250,
            )
            .await;

        assert_eq!(outcome, MonitorOutcome::FoundResult);
        let record = h.registry.get(id).await.unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        let error = record.error.unwrap();
        assert_eq!(error.kind, ErrorKind::Worker);
        assert_eq!(error.message, "login required");
        assert_eq!(error.error_type.as_deref(), Some("AuthError"));
    }

    #[tokio::test]
    async fn exit_without_result_fails_before_timeout() {
        let h = harness().await;
        let (id, outcome) = h.run("echo 'crawler crashed' >&2; exit 2", 250).await;

        assert_eq!(outcome, MonitorOutcome::ProcessExited);
        let record = h.registry.get(id).await.unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        let error = record.error.unwrap();
        assert_eq!(error.kind, ErrorKind::ProcessExited);
        assert!(error.message.starts_with("Worker exited without generating result"));
        assert!(record.logs[0].starts_with("Worker exited without generating result"));
        assert!(record.logs.iter().any(|l| l == "[stderr] crawler crashed"));
    }

    #[tokio::test]
    async fn silent_worker_times_out_and_is_stopped() {
        let h = harness().await;
        let started = std::time::Instant::now();
        let (id, outcome) = h.run("exec sleep 30", 10).await;

        assert_eq!(outcome, MonitorOutcome::TimedOut { ticks: 10 });
        // 10 ticks of 20ms plus the shutdown; nowhere near the worker's 30s.
        assert!(started.elapsed() < Duration::from_secs(5));

        let record = h.registry.get(id).await.unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        let error = record.error.unwrap();
        assert_eq!(error.kind, ErrorKind::Timeout);
        assert!(error.message.starts_with("Task timeout after"));
        assert_eq!(record.logs.len(), 1);
    }

    #[tokio::test]
    async fn timeout_is_reached_at_the_tick_bound() {
        let h = harness().await;
        let started = std::time::Instant::now();
        let (_, outcome) = h.run("exec sleep 30", 5).await;

        assert_eq!(outcome, MonitorOutcome::TimedOut { ticks: 5 });
        // At least max_ticks sleeps happened.
        assert!(started.elapsed() >= TICK * 5);
    }

    #[tokio::test]
    async fn partial_result_is_retried_until_complete() {
        let h = harness().await;
        let (id, outcome) = h
            .run(
                r#"printf '%s' '{"status":"comp' > "$5"; sleep 0.2; printf '%s' '{"status":"completed","results":[{"n":2}]}' > "$5"; sleep 1"#,
                250,
            )
            .await;

        assert_eq!(outcome, MonitorOutcome::FoundResult);
        let record = h.registry.get(id).await.unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.results, vec![serde_json::json!({"n": 2})]);
    }

    #[tokio::test]
    async fn corrupt_result_degrades_to_timeout() {
        let h = harness().await;
        let (id, outcome) = h.run(r#"printf 'not json' > "$5""#, 10).await;

        assert_eq!(outcome, MonitorOutcome::TimedOut { ticks: 10 });
        let record = h.registry.get(id).await.unwrap();
        assert_eq!(record.error.unwrap().kind, ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn timeout_fires_on_the_last_tick() {
        let h = harness().await;
        for max_ticks in [1, 3] {
            let (_, outcome) = h.run("exec sleep 30", max_ticks).await;
            assert_eq!(outcome, MonitorOutcome::TimedOut { ticks: max_ticks });
        }
    }

    #[tokio::test]
    async fn non_utf8_output_does_not_kill_worker() {
        let h = harness().await;
        let (id, outcome) = h
            .run(
                r#"printf '\377\376 page\n'; printf '\377\n' >&2; sleep 0.3; echo "page 2"; echo "page 2" >&2; printf '%s' '{"status":"completed","results":[{"p":2}]}' > "$5""#,
                250,
            )
            .await;

        assert_eq!(outcome, MonitorOutcome::FoundResult);
        let record = h.registry.get(id).await.unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.results, vec![serde_json::json!({"p": 2})]);
    }

    #[tokio::test]
    async fn terminal_state_is_not_overwritten() {
        let h = harness().await;
        let (id, _) = h
            .run(r#"printf '%s' '{"status":"completed"}' > "$5""#, 250)
            .await;

        let before = h.registry.get(id).await.unwrap();
        assert!(
            h.registry
                .finish(id, |record| record.fail(ErrorKind::Timeout, "late"))
                .await
                .is_err()
        );
        let after = h.registry.get(id).await.unwrap();
        assert_eq!(after.status, before.status);
        assert_eq!(after.logs, before.logs);
        assert_eq!(after.updated_at, before.updated_at);
    }

    #[tokio::test]
    async fn concurrent_monitors_are_isolated() {
        let h = harness().await;
        let (a, b) = tokio::join!(
            h.run(
                r#"sleep 0.1; printf '%s' '{"status":"completed","results":[{"who":"a"}]}' > "$5""#,
                250
            ),
            h.run("sleep 0.1; exit 1", 250),
        );

        assert_eq!(a.1, MonitorOutcome::FoundResult);
        assert_eq!(b.1, MonitorOutcome::ProcessExited);

        let ra = h.registry.get(a.0).await.unwrap();
        let rb = h.registry.get(b.0).await.unwrap();
        assert_eq!(ra.status, TaskStatus::Completed);
        assert_eq!(ra.results, vec![serde_json::json!({"who": "a"})]);
        assert_eq!(rb.status, TaskStatus::Failed);
        assert!(rb.results.is_empty());
    }
}

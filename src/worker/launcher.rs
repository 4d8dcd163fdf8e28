//! Worker launcher — one isolated crawl process per task.
//!
//! The worker is invoked as
//! `program [base_args..] <task_id> <user_id> <cookie> <mode> <result_path>`
//! with `CRAWL_TASK_ID`, `CRAWL_RESULT_FILE` and `CRAWL_LOG_FILE` set in its
//! environment.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::artifacts::ArtifactStore;
use crate::config::OrchestratorConfig;
use crate::error::LaunchError;
use crate::tasks::model::CrawlMode;
use crate::worker::output::{OutputCapture, OutputStream};

/// Caller-supplied crawl parameters, forwarded to the worker untouched.
#[derive(Debug)]
pub struct JobParameters {
    /// Account whose content is collected.
    pub user_id: String,
    /// Session cookie for the target site. Never logged.
    pub cookie: SecretString,
}

impl JobParameters {
    pub fn new(user_id: impl Into<String>, cookie: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            cookie: SecretString::from(cookie.into()),
        }
    }
}

/// Starts worker processes.
#[derive(Debug, Clone)]
pub struct WorkerLauncher {
    program: String,
    base_args: Vec<String>,
    store: ArtifactStore,
}

impl WorkerLauncher {
    pub fn new(program: impl Into<String>, base_args: Vec<String>, store: ArtifactStore) -> Self {
        Self {
            program: program.into(),
            base_args,
            store,
        }
    }

    pub fn from_config(config: &OrchestratorConfig, store: ArtifactStore) -> Self {
        Self::new(config.worker_program.clone(), config.worker_args.clone(), store)
    }

    /// Spawn the worker for `task_id`.
    pub fn launch(
        &self,
        task_id: Uuid,
        params: &JobParameters,
        mode: CrawlMode,
    ) -> Result<WorkerHandle, LaunchError> {
        if self.program.trim().is_empty() {
            return Err(LaunchError::NoProgram);
        }

        let result_path = self.store.result_path(task_id);
        let log_path = self.store.log_path(task_id);

        let mut command = Command::new(&self.program);
        command
            .args(&self.base_args)
            .arg(task_id.to_string())
            .arg(&params.user_id)
            .arg(params.cookie.expose_secret())
            .arg(mode.as_str())
            .arg(&result_path)
            .env("CRAWL_TASK_ID", task_id.to_string())
            .env("CRAWL_RESULT_FILE", &result_path)
            .env("CRAWL_LOG_FILE", &log_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| LaunchError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let output = OutputCapture::new();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(output.spawn_reader(task_id, OutputStream::Stdout, stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(output.spawn_reader(task_id, OutputStream::Stderr, stderr));
        }

        info!(
            task_id = %task_id,
            pid = ?child.id(),
            program = %self.program,
            mode = %mode,
            "Worker launched"
        );

        Ok(WorkerHandle {
            task_id,
            child,
            output,
            readers,
        })
    }
}

/// How a worker ended after a shutdown request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// It had already exited before the request.
    AlreadyExited(ExitStatus),
    /// It exited within the grace period.
    Terminated(ExitStatus),
    /// It ignored the request and was killed.
    Killed,
}

/// Handle to a running worker process.
#[derive(Debug)]
pub struct WorkerHandle {
    task_id: Uuid,
    child: Child,
    output: OutputCapture,
    readers: Vec<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    /// OS process ID, `None` once the process has been reaped.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Non-blocking exit check.
    pub fn try_exit(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Ask the worker to exit.
    #[cfg(unix)]
    pub fn terminate(&mut self) -> io::Result<()> {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        match self.child.id() {
            Some(pid) => {
                kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(io::Error::from)
            }
            None => Ok(()),
        }
    }

    /// Ask the worker to exit. Without signals this is a hard kill.
    #[cfg(not(unix))]
    pub fn terminate(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    /// Kill the worker and wait for it.
    pub async fn kill(&mut self) -> io::Result<()> {
        self.child.kill().await
    }

    /// Terminate, give the worker `grace` to exit, then kill it.
    pub async fn shutdown(&mut self, grace: Duration) -> io::Result<ShutdownOutcome> {
        if let Some(status) = self.try_exit()? {
            return Ok(ShutdownOutcome::AlreadyExited(status));
        }

        if let Err(e) = self.terminate() {
            warn!(task_id = %self.task_id, error = %e, "Failed to signal worker");
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!(task_id = %self.task_id, %status, "Worker exited after terminate");
                Ok(ShutdownOutcome::Terminated(status))
            }
            Err(_) => {
                warn!(task_id = %self.task_id, ?grace, "Worker ignored terminate, killing");
                self.kill().await?;
                Ok(ShutdownOutcome::Killed)
            }
        }
    }

    /// Wait up to `wait` for the output readers to reach EOF.
    ///
    /// Call after exit so the captured tail includes the final lines.
    pub async fn flush_output(&mut self, wait: Duration) {
        let readers = std::mem::take(&mut self.readers);
        let _ = tokio::time::timeout(wait, async {
            for reader in readers {
                let _ = reader.await;
            }
        })
        .await;
    }

    pub fn output(&self) -> &OutputCapture {
        &self.output
    }

    /// Last `n` captured stderr lines.
    pub fn stderr_tail(&self, n: usize) -> Vec<String> {
        self.output.tail(OutputStream::Stderr, n)
    }
}

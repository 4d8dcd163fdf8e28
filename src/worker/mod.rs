//! Worker processes — launching, output capture, and result monitoring.
//!
//! Core components:
//! - `launcher` — spawns one crawl process per task and wraps it in a handle
//! - `output` — drains worker stdout/stderr for diagnostics
//! - `monitor` — per-task polling loop that writes the terminal state

pub mod launcher;
pub mod monitor;
pub mod output;

pub use launcher::{JobParameters, ShutdownOutcome, WorkerHandle, WorkerLauncher};
pub use monitor::{MonitorOutcome, MonitorSettings, ResultMonitor};
pub use output::{OutputCapture, OutputStream};

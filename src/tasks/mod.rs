//! Task state — records, the registry, and log tailing.

pub mod logs;
pub mod model;
pub mod registry;

pub use logs::{LogReader, LogTail};
pub use model::{CrawlMode, ErrorKind, ResultPayload, TaskFailure, TaskRecord, TaskStatus};
pub use registry::{RegistrySummary, TaskRegistry};

//! Error types for the crawl orchestrator.

use std::path::PathBuf;

use uuid::Uuid;

/// Top-level error type for the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Launch error: {0}")]
    Launch(#[from] LaunchError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Log error: {0}")]
    Log(#[from] LogError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Task registry and submission errors.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task {id} not found")]
    NotFound { id: Uuid },

    #[error("Invalid task ID: {0}")]
    InvalidId(String),

    #[error("Invalid mode '{mode}', expected one of: {expected}")]
    InvalidMode { mode: String, expected: String },

    #[error("Task {id} already finished with status {status}")]
    AlreadyTerminal { id: Uuid, status: String },

    #[error("Task {id} update left status {status}, expected a terminal status")]
    NotTerminal { id: Uuid, status: String },

    #[error("Task {id} update would set terminal status {status} outside finish")]
    UnexpectedTerminal { id: Uuid, status: String },
}

/// Worker process launch errors.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker program is not configured")]
    NoProgram,
}

/// Result artifact errors.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed result payload in {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Result payload in {path} has non-terminal status {status}")]
    NotTerminal { path: PathBuf, status: String },
}

/// Log artifact errors.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("Error reading logs from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for the orchestrator.
pub type Result<T> = std::result::Result<T, Error>;

//! HTTP API over the orchestrator.

pub mod routes;

pub use routes::{AppState, crawl_routes};

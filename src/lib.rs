//! Crawl orchestrator — runs site-specific crawl workers out of process and
//! tracks their state.

pub mod api;
pub mod artifacts;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod tasks;
pub mod worker;

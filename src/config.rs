//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Directory holding one `{task_id}.json` result file per task.
    pub results_dir: PathBuf,
    /// Directory holding one `{task_id}.log` log file per task.
    pub logs_dir: PathBuf,
    /// Worker executable.
    pub worker_program: String,
    /// Arguments placed before the per-task arguments (e.g. the worker script).
    pub worker_args: Vec<String>,
    /// Monitor polling interval.
    pub tick_interval: Duration,
    /// Number of ticks before a task times out.
    pub max_ticks: u64,
    /// How long a terminated worker gets to exit before it is killed.
    pub kill_grace: Duration,
    /// Address the HTTP API binds to.
    pub bind_addr: String,
    /// Port the HTTP API listens on.
    pub port: u16,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from(".task_results"),
            logs_dir: PathBuf::from(".task_logs"),
            worker_program: "python3".to_string(),
            worker_args: vec!["worker.py".to_string()],
            tick_interval: Duration::from_secs(1),
            max_ticks: 3600, // 1 hour at the default tick
            kill_grace: Duration::from_secs(5),
            bind_addr: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl OrchestratorConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let results_dir = std::env::var("CRAWL_RESULTS_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.results_dir);

        let logs_dir = std::env::var("CRAWL_LOGS_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.logs_dir);

        let worker_program =
            std::env::var("CRAWL_WORKER_PROGRAM").unwrap_or(defaults.worker_program);

        let worker_args: Vec<String> = std::env::var("CRAWL_WORKER_ARGS")
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or(defaults.worker_args);

        let tick_interval = std::env::var("CRAWL_TICK_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.tick_interval);

        let max_ticks: u64 = std::env::var("CRAWL_TIMEOUT_TICKS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_ticks);

        let kill_grace = std::env::var("CRAWL_KILL_GRACE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.kill_grace);

        let bind_addr = std::env::var("CRAWL_BIND_ADDR").unwrap_or(defaults.bind_addr);

        let port: u16 = std::env::var("CRAWL_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.port);

        Self {
            results_dir,
            logs_dir,
            worker_program,
            worker_args,
            tick_interval,
            max_ticks,
            kill_grace,
            bind_addr,
            port,
        }
    }

    /// Reject values the monitor cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "CRAWL_TICK_MS".to_string(),
                message: "tick interval must be greater than zero".to_string(),
            });
        }
        if self.max_ticks == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CRAWL_TIMEOUT_TICKS".to_string(),
                message: "timeout must be at least one tick".to_string(),
            });
        }
        if self.worker_program.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "CRAWL_WORKER_PROGRAM".to_string(),
                message: "worker program must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Wall-clock timeout implied by the tick settings.
    pub fn timeout(&self) -> Duration {
        self.tick_interval.saturating_mul(self.max_ticks.min(u32::MAX as u64) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_one_hour_timeout() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_ticks, 3600);
        assert_eq!(config.timeout(), Duration::from_secs(3600));
        assert_eq!(config.kill_grace, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_tick_is_rejected() {
        let config = OrchestratorConfig {
            tick_interval: Duration::ZERO,
            ..OrchestratorConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = OrchestratorConfig {
            max_ticks: 0,
            ..OrchestratorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_program_is_rejected() {
        let config = OrchestratorConfig {
            worker_program: "  ".to_string(),
            ..OrchestratorConfig::default()
        };
        assert!(config.validate().is_err());
    }
}

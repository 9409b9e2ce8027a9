use serde::{Deserialize, Serialize};

/// Configuration for the task orchestrator, loaded from `BABEL_*`
/// environment variables with defaults that work on any machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Feature toggle; false means every call runs synchronously
    pub enabled: bool,

    /// Worker threads for I/O-bound work
    pub io_workers: usize,
    /// Worker threads for CPU-bound work
    pub cpu_workers: usize,

    /// Max concurrent LLM calls
    pub llm_concurrent: usize,
    /// Max LLM requests per second
    pub llm_rate_limit: f64,

    /// Default task timeout (seconds)
    pub task_timeout: f64,
    /// Pool shutdown timeout (seconds)
    pub shutdown_timeout: f64,

    /// Fall back to sequential execution on pool failure
    pub fallback_sequential: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            io_workers: 4,
            cpu_workers: default_cpu_workers(),
            llm_concurrent: 3,
            llm_rate_limit: 10.0,
            task_timeout: 60.0,
            shutdown_timeout: 10.0,
            fallback_sequential: true,
        }
    }
}

fn default_cpu_workers() -> usize {
    std::cmp::max(1, num_cpus::get() / 2)
}

impl OrchestratorConfig {
    /// Load configuration from environment variables.
    ///
    /// CPU workers default to half the available cores; I/O workers to
    /// 4; LLM concurrency to 3 to stay under typical API limits.
    pub fn from_env() -> Self {
        Self {
            enabled: get_bool_env("BABEL_PARALLEL_ENABLED", true),
            io_workers: get_usize_env("BABEL_IO_WORKERS", 4),
            cpu_workers: get_usize_env("BABEL_CPU_WORKERS", default_cpu_workers()),
            llm_concurrent: get_usize_env("BABEL_LLM_CONCURRENT", 3),
            llm_rate_limit: get_f64_env("BABEL_LLM_RATE_LIMIT", 10.0),
            task_timeout: get_f64_env("BABEL_TASK_TIMEOUT", 60.0),
            shutdown_timeout: get_f64_env("BABEL_SHUTDOWN_TIMEOUT", 10.0),
            fallback_sequential: get_bool_env("BABEL_FALLBACK_SEQUENTIAL", true),
        }
    }

    /// Reject configurations that cannot run.
    pub fn validate(&self) -> Result<(), String> {
        if self.io_workers < 1 {
            return Err("BABEL_IO_WORKERS must be >= 1".to_string());
        }
        if self.cpu_workers < 1 {
            return Err("BABEL_CPU_WORKERS must be >= 1".to_string());
        }
        if self.llm_concurrent < 1 {
            return Err("BABEL_LLM_CONCURRENT must be >= 1".to_string());
        }
        if self.task_timeout <= 0.0 {
            return Err("BABEL_TASK_TIMEOUT must be > 0".to_string());
        }
        Ok(())
    }

    /// Disabled configuration, for sequential-only operation.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

fn get_bool_env(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(value) => match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

fn get_usize_env(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_f64_env(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = OrchestratorConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.enabled);
        assert_eq!(config.io_workers, 4);
        assert!(config.cpu_workers >= 1);
        assert_eq!(config.llm_concurrent, 3);
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = OrchestratorConfig {
            io_workers: 0,
            ..OrchestratorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_disabled() {
        let config = OrchestratorConfig::disabled();
        assert!(!config.enabled);
        assert!(config.validate().is_ok());
    }
}

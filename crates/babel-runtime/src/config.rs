use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;
use babel_core::BabelPaths;
use babel_orchestrator::OrchestratorConfig;

// Layered configuration, priority from high to low:
//   explicit set call > project config.yaml > user ~/.babel/config.yaml
//   > BABEL_* environment variables > built-in defaults.
// Lower layers load first; each higher layer overlays only the fields
// it names.

/// Which LLM endpoint is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveLlm {
    Local,
    Remote,
    #[default]
    Auto,
}

/// One LLM endpoint description. The adapter behind it is external;
/// this is just enough to pick and probe one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmEndpoint {
    pub provider: String,
    pub model: String,
    /// Env var holding the API key, when the provider needs one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub active: ActiveLlm,
    pub local: LlmEndpoint,
    pub remote: LlmEndpoint,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            active: ActiveLlm::Auto,
            local: LlmEndpoint {
                provider: "ollama".to_string(),
                model: "llama3.2".to_string(),
                api_key_env: None,
            },
            remote: LlmEndpoint {
                provider: "claude".to_string(),
                model: "claude-sonnet-4-5".to_string(),
                api_key_env: Some("ANTHROPIC_API_KEY".to_string()),
            },
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BabelConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub parallel: OrchestratorConfig,
}

/// Overlay with every field optional; used for the file layers so a
/// config file only has to name what it changes.
#[derive(Debug, Default, Deserialize)]
struct ConfigOverlay {
    #[serde(default)]
    llm: Option<LlmOverlay>,
    #[serde(default)]
    parallel: Option<ParallelOverlay>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmOverlay {
    active: Option<ActiveLlm>,
    local: Option<EndpointOverlay>,
    remote: Option<EndpointOverlay>,
}

#[derive(Debug, Default, Deserialize)]
struct EndpointOverlay {
    provider: Option<String>,
    model: Option<String>,
    api_key_env: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ParallelOverlay {
    enabled: Option<bool>,
    io_workers: Option<usize>,
    cpu_workers: Option<usize>,
    llm_concurrent: Option<usize>,
    llm_rate_limit: Option<f64>,
    task_timeout: Option<f64>,
    shutdown_timeout: Option<f64>,
    fallback_sequential: Option<bool>,
}

impl BabelConfig {
    /// Load the full layer stack for a project (or no project).
    pub fn load(project: Option<&BabelPaths>) -> Result<Self> {
        let mut config = Self::default();

        // Environment sits just above the defaults
        config.apply_env();

        if let Some(user_path) = Self::user_config_path()
            && user_path.exists()
        {
            config.merge_file(&user_path)?;
        }

        if let Some(project) = project {
            let project_path = project.config_path();
            if project_path.exists() {
                config.merge_file(&project_path)?;
            }
        }

        Ok(config)
    }

    /// `~/.babel/config.yaml`
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".babel").join("config.yaml"))
    }

    fn apply_env(&mut self) {
        // Orchestrator env vars share the defaults logic
        self.parallel = OrchestratorConfig::from_env();

        if let Ok(active) = std::env::var("BABEL_LLM_ACTIVE") {
            match active.to_lowercase().as_str() {
                "local" => self.llm.active = ActiveLlm::Local,
                "remote" => self.llm.active = ActiveLlm::Remote,
                "auto" => self.llm.active = ActiveLlm::Auto,
                _ => {}
            }
        }
        if let Ok(provider) = std::env::var("BABEL_LLM_LOCAL_PROVIDER") {
            self.llm.local.provider = provider;
        }
        if let Ok(model) = std::env::var("BABEL_LLM_LOCAL_MODEL") {
            self.llm.local.model = model;
        }
        if let Ok(provider) = std::env::var("BABEL_LLM_REMOTE_PROVIDER") {
            self.llm.remote.provider = provider;
        }
        if let Ok(model) = std::env::var("BABEL_LLM_REMOTE_MODEL") {
            self.llm.remote.model = model;
        }
        if let Ok(key_env) = std::env::var("BABEL_LLM_REMOTE_API_KEY_ENV") {
            self.llm.remote.api_key_env = Some(key_env);
        }
    }

    /// Overlay one YAML file onto the current state.
    pub fn merge_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)?;
        let overlay: ConfigOverlay = serde_yaml::from_str(&content)?;
        self.apply_overlay(overlay);
        Ok(())
    }

    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        if let Some(llm) = overlay.llm {
            if let Some(active) = llm.active {
                self.llm.active = active;
            }
            if let Some(local) = llm.local {
                apply_endpoint(&mut self.llm.local, local);
            }
            if let Some(remote) = llm.remote {
                apply_endpoint(&mut self.llm.remote, remote);
            }
        }
        if let Some(parallel) = overlay.parallel {
            let p = &mut self.parallel;
            if let Some(enabled) = parallel.enabled {
                p.enabled = enabled;
            }
            if let Some(io_workers) = parallel.io_workers {
                p.io_workers = io_workers;
            }
            if let Some(cpu_workers) = parallel.cpu_workers {
                p.cpu_workers = cpu_workers;
            }
            if let Some(llm_concurrent) = parallel.llm_concurrent {
                p.llm_concurrent = llm_concurrent;
            }
            if let Some(llm_rate_limit) = parallel.llm_rate_limit {
                p.llm_rate_limit = llm_rate_limit;
            }
            if let Some(task_timeout) = parallel.task_timeout {
                p.task_timeout = task_timeout;
            }
            if let Some(shutdown_timeout) = parallel.shutdown_timeout {
                p.shutdown_timeout = shutdown_timeout;
            }
            if let Some(fallback) = parallel.fallback_sequential {
                p.fallback_sequential = fallback;
            }
        }
    }

    /// Resolve which endpoint is active. In `auto`, the remote wins
    /// when its API key env var is set; otherwise local.
    pub fn active_endpoint(&self) -> (&'static str, &LlmEndpoint) {
        match self.llm.active {
            ActiveLlm::Local => ("local", &self.llm.local),
            ActiveLlm::Remote => ("remote", &self.llm.remote),
            ActiveLlm::Auto => {
                let remote_available = self
                    .llm
                    .remote
                    .api_key_env
                    .as_deref()
                    .is_some_and(|var| std::env::var(var).is_ok_and(|v| !v.is_empty()));
                if remote_available {
                    ("remote", &self.llm.remote)
                } else {
                    ("local", &self.llm.local)
                }
            }
        }
    }
}

fn apply_endpoint(endpoint: &mut LlmEndpoint, overlay: EndpointOverlay) {
    if let Some(provider) = overlay.provider {
        endpoint.provider = provider;
    }
    if let Some(model) = overlay.model {
        endpoint.model = model;
    }
    if let Some(api_key_env) = overlay.api_key_env {
        endpoint.api_key_env = Some(api_key_env);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = BabelConfig::default();
        assert_eq!(config.llm.active, ActiveLlm::Auto);
        assert_eq!(config.llm.local.provider, "ollama");
        assert!(config.parallel.enabled);
    }

    #[test]
    fn test_project_file_overlays_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(
            &path,
            "llm:\n  active: local\n  local:\n    model: qwen3\nparallel:\n  io_workers: 9\n",
        )
        .unwrap();

        let mut config = BabelConfig::default();
        config.merge_file(&path).unwrap();

        assert_eq!(config.llm.active, ActiveLlm::Local);
        assert_eq!(config.llm.local.model, "qwen3");
        // Untouched fields survive the overlay
        assert_eq!(config.llm.local.provider, "ollama");
        assert_eq!(config.parallel.io_workers, 9);
    }

    #[test]
    fn test_auto_prefers_local_without_key() {
        let config = BabelConfig {
            llm: LlmConfig {
                active: ActiveLlm::Auto,
                remote: LlmEndpoint {
                    provider: "claude".into(),
                    model: "m".into(),
                    api_key_env: Some("BABEL_TEST_MISSING_KEY_VAR".into()),
                },
                ..LlmConfig::default()
            },
            ..BabelConfig::default()
        };

        let (which, endpoint) = config.active_endpoint();
        assert_eq!(which, "local");
        assert_eq!(endpoint.provider, "ollama");
    }

    #[test]
    fn test_explicit_active_wins() {
        let config = BabelConfig {
            llm: LlmConfig {
                active: ActiveLlm::Remote,
                ..LlmConfig::default()
            },
            ..BabelConfig::default()
        };
        assert_eq!(config.active_endpoint().0, "remote");
    }
}

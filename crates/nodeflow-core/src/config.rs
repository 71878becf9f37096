use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FlowError, Result};
use crate::types::RunMode;

/// Top-level nodeflow configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub log: Option<LogConfig>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// How the linear runner picks the nodes it visits.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Schedule {
    /// Follow one outgoing edge at a time from the start node.
    #[default]
    Chain,
    /// Execute every node in dependency order.
    FullOrder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub mode: RunMode,
    /// Force every tool-agent node onto the simulator path.
    #[serde(default)]
    pub use_simulators: bool,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Playback multiplier for the steppable runner.
    #[serde(default = "default_speed")]
    pub speed: f32,
    /// Delay between nodes at speed 1.0, in milliseconds.
    #[serde(default)]
    pub base_delay_ms: u64,
    /// Step budget is `step_budget_factor * node_count`.
    #[serde(default = "default_step_budget_factor")]
    pub step_budget_factor: usize,
    #[serde(default)]
    pub schedule: Schedule,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            use_simulators: false,
            seed: default_seed(),
            speed: default_speed(),
            base_delay_ms: 0,
            step_budget_factor: default_step_budget_factor(),
            schedule: Schedule::default(),
        }
    }
}

fn default_seed() -> u64 { 42 }
fn default_speed() -> f32 { 1.0 }
fn default_step_budget_factor() -> usize { 2 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: default_model_id(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            retry: None,
        }
    }
}

fn default_provider() -> String { "openai".to_string() }
fn default_model_id() -> String { "gpt-4o-mini".to_string() }
fn default_max_tokens() -> u32 { 2048 }
fn default_temperature() -> f32 { 0.0 }

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// JSONL run logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Enable run logging (default: true when section is present).
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// Directory for log files. Default: <data_dir>/logs
    #[serde(default)]
    pub log_dir: Option<String>,
    /// 1 = run summary, 2 = per node, 3 = gate activity.
    #[serde(default = "default_log_level")]
    pub level: u8,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_dir: None,
            level: default_log_level(),
        }
    }
}

fn default_log_enabled() -> bool { true }
fn default_log_level() -> u8 { 2 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Persist a manifest for every finished run.
    #[serde(default = "default_save_runs")]
    pub save_runs: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            save_runs: default_save_runs(),
        }
    }
}

fn default_data_dir() -> String { "~/.nodeflow".to_string() }
fn default_save_runs() -> bool { true }

/// Run-level policy checked over aggregated node results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Model ids that must not appear in any node result.
    #[serde(default)]
    pub disallowed_models: Vec<String>,
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| FlowError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: Self = toml::from_str(&expanded).map_err(|e| FlowError::Config(e.to_string()))?;
        debug!(path = %path.display(), mode = %config.engine.mode, "Config loaded");
        Ok(config)
    }

    /// Resolve the data directory (expand ~).
    pub fn data_dir(&self) -> PathBuf {
        let dir = &self.storage.data_dir;
        if let Some(rest) = dir.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(dir)
    }

    /// Resolve the log directory, if run logging is enabled.
    pub fn log_dir(&self) -> Option<PathBuf> {
        let log = self.log.as_ref()?;
        if !log.enabled {
            return None;
        }
        Some(
            log.log_dir
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(|| self.data_dir().join("logs")),
        )
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_NODEFLOW_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_NODEFLOW_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_NODEFLOW_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_NODEFLOW_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_NODEFLOW_VAR}\"");
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.engine.mode, RunMode::Mock);
        assert_eq!(config.engine.step_budget_factor, 2);
        assert_eq!(config.engine.seed, 42);
        assert_eq!(config.engine.schedule, Schedule::Chain);
        assert!(config.policy.disallowed_models.is_empty());
        assert!(config.log_dir().is_none());
    }

    #[test]
    fn test_engine_section() {
        let toml_str = r#"
[engine]
mode = "live"
use_simulators = true
schedule = "full-order"
speed = 2.0

[policy]
disallowed_models = ["gpt-3.5-turbo"]
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.mode, RunMode::Live);
        assert!(config.engine.use_simulators);
        assert_eq!(config.engine.schedule, Schedule::FullOrder);
        assert_eq!(config.engine.speed, 2.0);
        assert_eq!(config.policy.disallowed_models, vec!["gpt-3.5-turbo"]);
    }

    #[test]
    fn test_log_dir_defaults_under_data_dir() {
        let toml_str = r#"
[storage]
data_dir = "/tmp/nf"

[log]
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.log_dir(), Some(PathBuf::from("/tmp/nf/logs")));
        assert_eq!(config.log.map(|l| l.level), Some(2));
    }
}

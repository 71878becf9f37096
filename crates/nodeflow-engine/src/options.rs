use serde::{Deserialize, Serialize};

use nodeflow_core::config::{AppConfig, Schedule};
use nodeflow_core::types::{LlmRequest, RunMode, Scenario};

use crate::graph::Node;

/// Caller-supplied LLM settings. Each set field beats the node's own default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmOverrides {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl LlmOverrides {
    /// Fill model/provider/temperature/seed on `request`: override first,
    /// then node config, then the run seed.
    pub fn apply(&self, node: &Node, run_seed: u64, request: &mut LlmRequest) {
        request.model = self.model.clone().or_else(|| node.field_str("model"));
        request.provider = self.provider.clone().or_else(|| node.field_str("provider"));
        request.temperature = self
            .temperature
            .or_else(|| node.field_f64("temperature").map(|t| t as f32));
        request.seed = self
            .seed
            .or_else(|| node.field_f64("seed").map(|s| s as u64))
            .or(Some(run_seed));
    }
}

/// Per-run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    pub mode: RunMode,
    pub seed: u64,
    pub use_simulators: bool,
    #[serde(default)]
    pub scenario: Option<Scenario>,
    /// User text fed to the start node.
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub overrides: LlmOverrides,
    pub schedule: Schedule,
    pub step_budget_factor: usize,
    pub base_delay_ms: u64,
    pub speed: f32,
    #[serde(default)]
    pub disallowed_models: Vec<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl RunOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        let engine = &config.engine;
        Self {
            mode: engine.mode,
            seed: engine.seed,
            use_simulators: engine.use_simulators,
            scenario: None,
            input: None,
            overrides: LlmOverrides::default(),
            schedule: engine.schedule,
            step_budget_factor: engine.step_budget_factor.max(1),
            base_delay_ms: engine.base_delay_ms,
            speed: engine.speed,
            disallowed_models: config.policy.disallowed_models.clone(),
        }
    }

    pub fn with_scenario(mut self, scenario: Option<Scenario>) -> Self {
        self.scenario = scenario;
        self
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn overrides_beat_node_defaults() {
        let node = Node::new("a", "agent").with_config(json!({
            "model": "node-model",
            "provider": "gemini",
            "temperature": 0.2
        }));
        let overrides = LlmOverrides {
            model: Some("caller-model".into()),
            seed: Some(5),
            ..Default::default()
        };
        let mut req = LlmRequest::new("x");
        overrides.apply(&node, 42, &mut req);
        assert_eq!(req.model.as_deref(), Some("caller-model"));
        assert_eq!(req.provider.as_deref(), Some("gemini"));
        assert_eq!(req.temperature, Some(0.2));
        assert_eq!(req.seed, Some(5));
    }

    #[test]
    fn run_seed_is_last_resort() {
        let mut req = LlmRequest::new("x");
        LlmOverrides::default().apply(&Node::new("a", "agent"), 42, &mut req);
        assert_eq!(req.seed, Some(42));
        assert!(req.model.is_none());
    }
}

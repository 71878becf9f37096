use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique run identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether LLM-backed paths talk to real providers or the deterministic mock.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Mock,
    Live,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mock => write!(f, "mock"),
            Self::Live => write!(f, "live"),
        }
    }
}

/// Lifecycle of a controller run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
    Error,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Classification of a node result. Exactly one per node execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    Mock,
    Computed,
    Error,
}

impl std::fmt::Display for ResultType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Mock => "mock",
            Self::Computed => "computed",
            Self::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Scenario attached to a run; its description is injected into the start node's context.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Requested shape of an LLM response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    Text,
    Json,
}

/// A single prompt sent through the LLM capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }
}

/// What came back from an LLM call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    /// Provider payload as received, kept for auditing and context extraction.
    pub raw: serde_json::Value,
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Failure injection for simulated tool calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ErrorMode {
    #[default]
    None,
    /// Fail with probability `rate`, drawn from the seeded generator.
    Random { rate: f64 },
    /// Always fail with the given error kind.
    Force { kind: String },
}

/// A request to the tool-simulation capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub tool_name: String,
    pub operation: String,
    #[serde(default)]
    pub args: serde_json::Value,
    pub seed: u64,
    #[serde(default)]
    pub latency_ms: Option<u64>,
    #[serde(default)]
    pub error_mode: ErrorMode,
}

/// Error body of a failed tool simulation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolFailure {
    pub kind: String,
    pub message: String,
}

/// Result of a simulated tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ToolOutcome {
    Ok { ok: bool, data: serde_json::Value },
    Err { ok: bool, error: ToolFailure },
}

impl ToolOutcome {
    pub fn success(data: serde_json::Value) -> Self {
        Self::Ok { ok: true, data }
    }

    pub fn failure(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Err {
            ok: false,
            error: ToolFailure {
                kind: kind.into(),
                message: message.into(),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

/// Why the step gate suspended a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PauseReason {
    Breakpoint,
    Step,
    UserRequested,
}

/// Flow event broadcast to all subscribers (timeline rendering, run history, logs).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum FlowEvent {
    FlowStarted {
        run_id: RunId,
        start_node_id: String,
        mode: RunMode,
        node_count: usize,
        at: DateTime<Utc>,
    },
    NodeStarted {
        run_id: RunId,
        node_id: String,
        kind: String,
        at: DateTime<Utc>,
    },
    NodeFinished {
        run_id: RunId,
        node_id: String,
        result_type: ResultType,
        summary: String,
        duration_ms: u64,
        at: DateTime<Utc>,
    },
    FlowFinished {
        run_id: RunId,
        status: ExecutionStatus,
        executed: usize,
        duration_ms: u64,
        at: DateTime<Utc>,
    },
    Paused {
        run_id: RunId,
        node_id: String,
        reason: PauseReason,
        at: DateTime<Utc>,
    },
    Resumed {
        run_id: RunId,
        node_id: String,
        at: DateTime<Utc>,
    },
    Warning {
        run_id: RunId,
        message: String,
        at: DateTime<Utc>,
    },
}

impl FlowEvent {
    pub fn run_id(&self) -> &RunId {
        match self {
            Self::FlowStarted { run_id, .. }
            | Self::NodeStarted { run_id, .. }
            | Self::NodeFinished { run_id, .. }
            | Self::FlowFinished { run_id, .. }
            | Self::Paused { run_id, .. }
            | Self::Resumed { run_id, .. }
            | Self::Warning { run_id, .. } => run_id,
        }
    }

    /// Wire name of the event type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FlowStarted { .. } => "flow-started",
            Self::NodeStarted { .. } => "node-started",
            Self::NodeFinished { .. } => "node-finished",
            Self::FlowFinished { .. } => "flow-finished",
            Self::Paused { .. } => "paused",
            Self::Resumed { .. } => "resumed",
            Self::Warning { .. } => "warning",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_event_wire_shape() {
        let event = FlowEvent::NodeFinished {
            run_id: RunId::from_str("r1"),
            node_id: "agent-1".into(),
            result_type: ResultType::Mock,
            summary: "ok".into(),
            duration_ms: 3,
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "node-finished");
        assert_eq!(json["nodeId"], "agent-1");
        assert_eq!(json["resultType"], "mock");
        assert_eq!(event.kind(), "node-finished");
    }

    #[test]
    fn tool_outcome_shapes() {
        let ok = serde_json::to_value(ToolOutcome::success(serde_json::json!([1]))).unwrap();
        assert_eq!(ok, serde_json::json!({"ok": true, "data": [1]}));

        let err = ToolOutcome::failure("timeout", "took too long");
        assert!(!err.is_ok());
        let json = serde_json::to_value(err).unwrap();
        assert_eq!(json["error"]["kind"], "timeout");
    }

    #[test]
    fn error_mode_default_is_none() {
        let inv: ToolInvocation = serde_json::from_value(serde_json::json!({
            "toolName": "calendar",
            "operation": "list_events",
            "seed": 7
        }))
        .unwrap();
        assert_eq!(inv.error_mode, ErrorMode::None);
        assert!(inv.latency_ms.is_none());
    }
}

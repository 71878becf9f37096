use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use nodeflow_core::types::ResultType;

use crate::context::NodeOutput;

/// Which configuration source produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionPath {
    MockResponse,
    MockPreset,
    Executor,
    MissingProperties,
    NoExecutionPath,
    NoExecutor,
}

impl std::fmt::Display for ExecutionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::MockResponse => "mock-response",
            Self::MockPreset => "mock-preset",
            Self::Executor => "executor",
            Self::MissingProperties => "missing-properties",
            Self::NoExecutionPath => "no-execution-path",
            Self::NoExecutor => "no-executor",
        };
        write!(f, "{}", s)
    }
}

/// One recognized config field and whether the node sets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyUse {
    pub field: String,
    pub configured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputsTab {
    pub ports: BTreeMap<String, NodeOutput>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    #[serde(default)]
    pub upstream: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputsTab {
    pub result_type: ResultType,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryTab {
    pub path: ExecutionPath,
    #[serde(default)]
    pub rules_fired: Vec<String>,
    #[serde(default)]
    pub missing_properties: Vec<String>,
    pub explanation: String,
}

/// Result of one node execution: the output plus the explanation of why it
/// was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub node_id: String,
    pub kind: String,
    pub result: NodeOutput,
    pub properties_used: Vec<PropertyUse>,
    pub execution_summary: String,
    pub inputs_tab: InputsTab,
    pub outputs_tab: OutputsTab,
    pub summary_tab: SummaryTab,
    pub trace: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_intent: Option<Value>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Minimal result with empty tabs, for fixtures and synthetic entries.
    pub fn bare(node_id: &str, kind: &str, result: NodeOutput, result_type: ResultType) -> Self {
        let text = result.as_text();
        Self {
            node_id: node_id.to_string(),
            kind: kind.to_string(),
            result,
            properties_used: Vec::new(),
            execution_summary: String::new(),
            inputs_tab: InputsTab::default(),
            outputs_tab: OutputsTab {
                result_type,
                text,
                provider: None,
                model: None,
                route: None,
            },
            summary_tab: SummaryTab {
                path: ExecutionPath::Executor,
                rules_fired: Vec::new(),
                missing_properties: Vec::new(),
                explanation: String::new(),
            },
            trace: Vec::new(),
            parsed_intent: None,
            duration_ms: 0,
        }
    }

    pub fn result_type(&self) -> ResultType {
        self.outputs_tab.result_type
    }

    /// Human-facing result text: the error message for error outputs.
    pub fn result_text(&self) -> String {
        match self.result.error() {
            Some(e) => e.to_string(),
            None => self.result.as_text(),
        }
    }
}

/// Run-scoped results keyed by node id, remembering completion order.
#[derive(Debug, Clone, Default)]
pub struct RunResults {
    entries: HashMap<String, ExecutionResult>,
    order: Vec<String>,
}

impl RunResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a result. A node revisited on a cycle replaces its earlier result.
    pub fn insert(&mut self, result: ExecutionResult) {
        let id = result.node_id.clone();
        if self.entries.insert(id.clone(), result).is_none() {
            self.order.push(id);
        }
    }

    pub fn get(&self, node_id: &str) -> Option<&ExecutionResult> {
        self.entries.get(node_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Results in first-completion order.
    pub fn iter(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    pub fn to_map(&self) -> BTreeMap<String, ExecutionResult> {
        self.entries.clone().into_iter().collect()
    }
}

/// Serialized as a list in first-completion order.
impl Serialize for RunResults {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

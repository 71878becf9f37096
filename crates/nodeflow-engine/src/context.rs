//! Per-node input resolution.
//!
//! Upstream outputs come in many shapes (plain text, `{output}`, raw provider
//! payloads). `extract_text` turns any of them into the string a downstream
//! prompt is built from; the lookup order below is relied on by every
//! LLM-backed node.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::bridge::result::RunResults;
use crate::graph::{Connection, Graph, Node};

/// What a node produced. Immutable once stored in the run results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeOutput {
    Text(String),
    Structured(Value),
}

impl NodeOutput {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn from_error(message: impl Into<String>) -> Self {
        Self::Structured(json!({ "error": message.into() }))
    }

    /// Wrap a JSON value; strings become `Text`.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s),
            other => Self::Structured(other),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.clone()),
            Self::Structured(v) => v.clone(),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Structured(v) => v.get("error").and_then(|e| e.as_str()),
            Self::Text(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error().is_some()
    }

    /// Text as seen by downstream nodes.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Structured(v) => extract_text(v),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Structured(v) => v.get(key),
            Self::Text(_) => None,
        }
    }
}

/// Lookup order: string → `output` → `message` → `content` → OpenAI-shaped
/// `llm` → Gemini-shaped `llm` → `gemini` → compact JSON.
pub fn extract_text(value: &Value) -> String {
    if let Value::String(s) = value {
        return s.clone();
    }
    for key in ["output", "message", "content"] {
        if let Some(s) = value.get(key).and_then(|v| v.as_str()) {
            return s.to_string();
        }
    }
    for pointer in [
        "/llm/choices/0/message/content",
        "/llm/candidates/0/content/parts/0/text",
        "/gemini/candidates/0/content/parts/0/text",
    ] {
        if let Some(s) = value.pointer(pointer).and_then(|v| v.as_str()) {
            return s.to_string();
        }
    }
    value.to_string()
}

/// Port-keyed inputs for namespaced consumers. A port fed by more than one
/// connection keeps the first under its name; later ones become `port.sourceId`.
pub fn port_inputs(results: &RunResults, incoming: &[&Connection]) -> BTreeMap<String, NodeOutput> {
    let mut inputs = BTreeMap::new();
    for conn in incoming {
        let Some(result) = results.get(&conn.source) else {
            continue;
        };
        let key = if inputs.contains_key(&conn.target_port) {
            format!("{}.{}", conn.target_port, conn.source)
        } else {
            conn.target_port.clone()
        };
        inputs.insert(key, result.result.clone());
    }
    inputs
}

/// Flat extracted strings for legacy consumers, in connection order.
pub fn text_inputs(results: &RunResults, incoming: &[&Connection]) -> Vec<String> {
    incoming
        .iter()
        .filter_map(|conn| results.get(&conn.source))
        .map(|r| r.result.as_text())
        .collect()
}

/// How a node kind consumes its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    Namespaced,
    Legacy,
}

/// Snapshot of one ancestor in the flow context bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AncestorEntry {
    pub config: Map<String, Value>,
    pub output: NodeOutput,
    pub metadata: Value,
}

/// `{nodeId → {config, output, metadata}}` for every ancestor with a result.
pub type FlowContext = BTreeMap<String, AncestorEntry>;

/// Everything a node executor reads about its position in the run.
#[derive(Debug, Clone, Default)]
pub struct NodeContext {
    pub node_id: String,
    pub mode: Option<ContextMode>,
    pub inputs: BTreeMap<String, NodeOutput>,
    pub texts: Vec<String>,
    pub flow: FlowContext,
    /// Scenario description, present only for the start node.
    pub scenario: Option<String>,
    pub warnings: Vec<String>,
}

impl NodeContext {
    /// Joined input text with the scenario block appended.
    pub fn input_text(&self) -> String {
        let mut text = self.texts.join("\n\n");
        if let Some(scenario) = &self.scenario {
            let label = match self.mode {
                Some(ContextMode::Legacy) => "Context:",
                _ => "Scenario Context:",
            };
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str(label);
            text.push('\n');
            text.push_str(scenario);
        }
        text
    }

    /// Variables visible to router expressions: `input` plus every ancestor id.
    pub fn variables(&self) -> std::collections::HashMap<String, Value> {
        let mut vars: std::collections::HashMap<String, Value> = self
            .flow
            .iter()
            .map(|(id, entry)| (id.clone(), Value::String(entry.output.as_text())))
            .collect();
        vars.insert("input".into(), Value::String(self.input_text()));
        vars
    }

    /// Render ancestors as `- id: text` lines for prompts.
    pub fn upstream_summary(&self) -> String {
        self.flow
            .iter()
            .map(|(id, entry)| format!("- {}: {}", id, entry.output.as_text()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Builds a `NodeContext` from the graph and the results so far.
pub struct ContextBuilder<'a> {
    graph: &'a Graph,
    results: &'a RunResults,
    start_node_id: &'a str,
    scenario: Option<&'a str>,
    run_input: Option<&'a str>,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(graph: &'a Graph, results: &'a RunResults, start_node_id: &'a str) -> Self {
        Self {
            graph,
            results,
            start_node_id,
            scenario: None,
            run_input: None,
        }
    }

    pub fn with_scenario(mut self, description: Option<&'a str>) -> Self {
        self.scenario = description.filter(|d| !d.trim().is_empty());
        self
    }

    /// User text handed to the start node ahead of any upstream input.
    pub fn with_input(mut self, input: Option<&'a str>) -> Self {
        self.run_input = input.filter(|i| !i.trim().is_empty());
        self
    }

    pub fn build(&self, node: &Node, mode: ContextMode) -> NodeContext {
        let incoming = self.graph.incoming(&node.id);
        let is_start = node.id == self.start_node_id;

        let mut texts = Vec::new();
        if is_start {
            if let Some(input) = self.run_input {
                texts.push(input.to_string());
            }
        }
        texts.extend(text_inputs(self.results, &incoming));

        let mut warnings = Vec::new();
        if mode == ContextMode::Legacy {
            let message = format!(
                "Node '{}' ({}) uses legacy context mode; inputs are flattened to text",
                node.id, node.kind
            );
            warn!(node_id = %node.id, kind = %node.kind, "Legacy context mode is deprecated");
            warnings.push(message);
        }

        NodeContext {
            node_id: node.id.clone(),
            mode: Some(mode),
            inputs: port_inputs(self.results, &incoming),
            texts,
            flow: self.flow_context(node),
            scenario: if is_start { self.scenario.map(str::to_string) } else { None },
            warnings,
        }
    }

    fn flow_context(&self, node: &Node) -> FlowContext {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = self
            .graph
            .incoming(&node.id)
            .iter()
            .map(|c| c.source.as_str())
            .collect();
        let mut flow = FlowContext::new();

        while let Some(id) = stack.pop() {
            if id == node.id || !seen.insert(id) {
                continue;
            }
            if let (Some(ancestor), Some(result)) = (self.graph.node(id), self.results.get(id)) {
                flow.insert(
                    id.to_string(),
                    AncestorEntry {
                        config: ancestor.config.clone(),
                        output: result.result.clone(),
                        metadata: json!({
                            "kind": ancestor.kind,
                            "resultType": result.outputs_tab.result_type,
                            "durationMs": result.duration_ms,
                        }),
                    },
                );
            }
            stack.extend(self.graph.incoming(id).iter().map(|c| c.source.as_str()));
        }
        flow
    }
}

//! Properties resolution bridge.
//!
//! Turns a node's configuration into an `ExecutionResult`. Sources are tried
//! in a fixed order: `mockResponse`, then `mockPreset`, then the kind's
//! executor when its behaviour fields are set. A node with no recognized
//! field set never reaches any of them.

pub mod intent;
pub mod properties;
pub mod result;

use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use nodeflow_core::traits::ToolSimulator;
use nodeflow_core::types::ResultType;

use crate::context::{ContextBuilder, ContextMode, NodeContext, NodeOutput};
use crate::executors::{self, tool, ExecEnv, NodeKind};
use crate::graph::Node;

pub use result::{
    ExecutionPath, ExecutionResult, InputsTab, OutputsTab, PropertyUse, RunResults, SummaryTab,
};

pub const MISSING_PROPERTIES: &str = "No info input in properties panel";
pub const NO_EXECUTION_PATH: &str = "No valid execution path";

/// Intermediate result before timing and tabs are attached.
struct Resolved {
    path: ExecutionPath,
    output: NodeOutput,
    result_type: ResultType,
    summary: String,
    explanation: String,
    rules_fired: Vec<String>,
    missing: Vec<String>,
    provider: Option<String>,
    model: Option<String>,
    route: Option<String>,
    parsed_intent: Option<Value>,
}

impl Resolved {
    fn new(path: ExecutionPath, output: NodeOutput, result_type: ResultType) -> Self {
        Self {
            path,
            output,
            result_type,
            summary: String::new(),
            explanation: String::new(),
            rules_fired: Vec::new(),
            missing: Vec::new(),
            provider: None,
            model: None,
            route: None,
            parsed_intent: None,
        }
    }

    fn describe(mut self, summary: impl Into<String>, explanation: impl Into<String>) -> Self {
        self.summary = summary.into();
        self.explanation = explanation.into();
        self
    }
}

/// Parse a configured mock response: JSON when it parses, raw text otherwise.
pub fn parse_mock_response(value: &Value) -> (NodeOutput, &'static str) {
    match value {
        Value::String(s) => match serde_json::from_str::<Value>(s.trim()) {
            Ok(parsed) if parsed.is_object() || parsed.is_array() => {
                (NodeOutput::Structured(parsed), "json")
            }
            _ => (NodeOutput::Text(s.clone()), "text"),
        },
        other => (NodeOutput::from_value(other.clone()), "json"),
    }
}

/// Execute one node and explain the outcome.
pub async fn execute_node(node: &Node, builder: &ContextBuilder<'_>, env: &ExecEnv) -> ExecutionResult {
    let started = Instant::now();
    let kind = NodeKind::resolve(&node.kind, node.subtype.as_deref());
    let mode = kind.map_or(ContextMode::Namespaced, |k| k.context_mode());
    let ctx = builder.build(node, mode);

    let inputs_tab = InputsTab {
        ports: ctx.inputs.clone(),
        text: ctx.input_text(),
        scenario: ctx.scenario.clone(),
        upstream: ctx.flow.keys().cloned().collect(),
    };
    let mut trace = ctx.warnings.clone();

    let (resolved, properties_used) = match kind {
        None => (no_executor(node), Vec::new()),
        Some(kind) => {
            let props = properties::enumerate(kind, node);
            let resolved = resolve(kind, node, &props, &ctx, env, &mut trace).await;
            (resolved, props)
        }
    };
    let mut resolved = resolved;

    if kind.is_some_and(|k| k.is_tool()) {
        let op = tool::operation(node).unwrap_or_else(|| "unspecified".into());
        let marker = format!("operation: {}", op);
        if !resolved.summary.contains(&marker) {
            resolved.summary = format!("{} ({})", resolved.summary, marker);
        }
    }

    trace.push(format!("path: {}", resolved.path));
    let duration_ms = started.elapsed().as_millis() as u64;
    info!(
        node_id = %node.id,
        kind = %node.kind,
        path = %resolved.path,
        result_type = %resolved.result_type,
        duration_ms,
        "Node resolved"
    );

    let text = match resolved.output.error() {
        Some(e) => e.to_string(),
        None => resolved.output.as_text(),
    };
    ExecutionResult {
        node_id: node.id.clone(),
        kind: kind.map_or_else(|| node.kind.clone(), |k| k.label().to_string()),
        result: resolved.output,
        properties_used,
        execution_summary: resolved.summary,
        inputs_tab,
        outputs_tab: OutputsTab {
            result_type: resolved.result_type,
            text,
            provider: resolved.provider,
            model: resolved.model,
            route: resolved.route,
        },
        summary_tab: SummaryTab {
            path: resolved.path,
            rules_fired: resolved.rules_fired,
            missing_properties: resolved.missing,
            explanation: resolved.explanation,
        },
        trace,
        parsed_intent: resolved.parsed_intent,
        duration_ms,
    }
}

/// Dry resolution of one node: which path `execute_node` would take.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub node_id: String,
    pub kind: Option<String>,
    pub path: ExecutionPath,
    pub properties: Vec<PropertyUse>,
    pub missing: Vec<String>,
}

/// Walk the same source order as `execute_node` without running anything.
pub fn plan(node: &Node, tools: &dyn ToolSimulator) -> Plan {
    let Some(kind) = NodeKind::resolve(&node.kind, node.subtype.as_deref()) else {
        return Plan {
            node_id: node.id.clone(),
            kind: None,
            path: ExecutionPath::NoExecutor,
            properties: Vec::new(),
            missing: Vec::new(),
        };
    };
    let properties = properties::enumerate(kind, node);
    let mut missing = Vec::new();

    let path = if !properties.iter().any(|p| p.configured) {
        missing = properties.iter().map(|p| p.field.clone()).collect();
        ExecutionPath::MissingProperties
    } else if node.is_configured("mockResponse") {
        ExecutionPath::MockResponse
    } else if node
        .first_str(&["mockPreset", "simulation.mockPreset"])
        .and_then(|name| {
            let hint = if kind.is_tool() { tool::tool_name(node) } else { None };
            tools.preset(hint.as_deref(), &name)
        })
        .is_some()
    {
        ExecutionPath::MockPreset
    } else {
        missing = properties::missing_behaviour(kind, node);
        if missing.is_empty() {
            ExecutionPath::Executor
        } else {
            ExecutionPath::NoExecutionPath
        }
    };

    Plan {
        node_id: node.id.clone(),
        kind: Some(kind.label().to_string()),
        path,
        properties,
        missing,
    }
}

fn no_executor(node: &Node) -> Resolved {
    let declared = match node.subtype.as_deref() {
        Some(sub) => format!("{}/{}", node.kind, sub),
        None => node.kind.clone(),
    };
    let message = format!("No executor for node type: {}", declared);
    Resolved::new(
        ExecutionPath::NoExecutor,
        NodeOutput::from_error(message.clone()),
        ResultType::Error,
    )
    .describe(
        message,
        format!("'{}' does not name a known node kind, so nothing was run.", declared),
    )
}

async fn resolve(
    kind: NodeKind,
    node: &Node,
    props: &[PropertyUse],
    ctx: &NodeContext,
    env: &ExecEnv,
    trace: &mut Vec<String>,
) -> Resolved {
    let configured: Vec<&str> = props
        .iter()
        .filter(|p| p.configured)
        .map(|p| p.field.as_str())
        .collect();

    if configured.is_empty() {
        let missing: Vec<String> = props.iter().map(|p| p.field.clone()).collect();
        let mut r = Resolved::new(
            ExecutionPath::MissingProperties,
            NodeOutput::from_error(MISSING_PROPERTIES),
            ResultType::Error,
        )
        .describe(
            format!("{} '{}' has no configured properties", kind, node.label()),
            format!(
                "None of the {} recognized {} properties are set; configure at least one of: {}.",
                missing.len(),
                kind,
                missing.join(", ")
            ),
        );
        r.missing = missing;
        return r;
    }
    trace.push(format!("configured: {}", configured.join(", ")));

    if let Some(value) = node.field("mockResponse").filter(|_| node.is_configured("mockResponse")) {
        let (output, format) = parse_mock_response(value);
        debug!(node_id = %node.id, format, "Using mockResponse");
        let mut r = Resolved::new(ExecutionPath::MockResponse, output, ResultType::Mock).describe(
            format!("Returned configured mock response ({})", format),
            "A mockResponse is configured, so it was returned without calling any backend.",
        );
        r.rules_fired.push(format!("mockResponse:{}", format));
        return r;
    }

    if let Some(name) = node.first_str(&["mockPreset", "simulation.mockPreset"]) {
        let tool_hint = if kind.is_tool() { tool::tool_name(node) } else { None };
        match env.tools.preset(tool_hint.as_deref(), &name) {
            Some(value) => {
                let mut r = Resolved::new(
                    ExecutionPath::MockPreset,
                    NodeOutput::from_value(value),
                    ResultType::Mock,
                )
                .describe(
                    format!("Returned mock preset '{}'", name),
                    format!("Mock preset '{}' was found in the preset catalog and returned as-is.", name),
                );
                r.rules_fired.push(format!("mockPreset:{}", name));
                return r;
            }
            None => trace.push(format!("unknown mock preset '{}' skipped", name)),
        }
    }

    let missing = properties::missing_behaviour(kind, node);
    if !missing.is_empty() {
        let mut r = Resolved::new(
            ExecutionPath::NoExecutionPath,
            NodeOutput::Structured(json!({
                "error": NO_EXECUTION_PATH,
                "missing": missing,
            })),
            ResultType::Error,
        )
        .describe(
            format!("{} '{}' cannot run: {}", kind, node.label(), NO_EXECUTION_PATH),
            format!(
                "Properties are set ({}), but none of them drives execution. Missing: {}.",
                configured.join(", "),
                missing.join(", ")
            ),
        );
        r.missing = missing;
        return r;
    }

    let parsed_intent = match (kind, node.field_str("rules.nl")) {
        (NodeKind::Agent, Some(rules)) => {
            let intent = intent::extract(node, &rules, env).await;
            trace.push(format!(
                "intent ({}): {}",
                intent["source"].as_str().unwrap_or_default(),
                intent["operations"]
            ));
            Some(intent)
        }
        _ => None,
    };

    let outcome = executors::execute(kind, node, ctx, env).await;
    trace.extend(outcome.trace.iter().cloned());

    let result_type = if outcome.output.is_error() {
        ResultType::Error
    } else if outcome.simulated {
        ResultType::Mock
    } else {
        ResultType::Computed
    };
    let explanation = format!(
        "Ran the {} executor using {}; the result is {}.",
        kind,
        configured.join(", "),
        result_type
    );

    let mut r = Resolved::new(ExecutionPath::Executor, outcome.output, result_type)
        .describe(outcome.summary, explanation);
    r.rules_fired = outcome.rules_fired;
    r.provider = outcome.provider;
    r.model = outcome.model;
    r.route = outcome.route;
    r.parsed_intent = parsed_intent;
    r
}

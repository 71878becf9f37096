use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::debug;

use nodeflow_core::types::{ErrorMode, ToolInvocation, ToolOutcome};

use super::{ExecEnv, NodeExecutor, NodeOutcome};
use crate::context::{NodeContext, NodeOutput};
use crate::graph::Node;

pub struct ToolExecutor;

/// Tool name a node targets: `toolName`, `tool`, then `simulation.providerId`.
pub fn tool_name(node: &Node) -> Option<String> {
    node.first_str(&["toolName", "tool", "simulation.providerId"])
}

/// The node's own operation. Upstream output is never consulted.
pub fn operation(node: &Node) -> Option<String> {
    node.first_str(&["operation", "simulation.operation"])
}

/// Latency and failure injection read from `simulation.*`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSettings {
    pub latency_ms: Option<u64>,
    pub error_mode: ErrorMode,
}

impl SimulationSettings {
    pub fn from_node(node: &Node) -> Self {
        let latency_ms = node
            .field_f64("simulation.latency")
            .filter(|ms| *ms > 0.0)
            .map(|ms| ms as u64);

        let error_mode = match node.field_str("simulation.errorMode").as_deref() {
            Some("random") => ErrorMode::Random {
                rate: node
                    .field_f64("simulation.failureRate")
                    .filter(|r| r.is_finite())
                    .map_or(0.5, |r| r.clamp(0.0, 1.0)),
            },
            Some("force") => ErrorMode::Force {
                kind: node
                    .field_str("simulation.errorKind")
                    .unwrap_or_else(|| "forced_error".into()),
            },
            _ => ErrorMode::None,
        };

        Self {
            latency_ms,
            error_mode,
        }
    }
}

/// Call the simulator and shape the outcome the same way for tool and
/// tool-agent nodes.
pub(crate) async fn simulate(
    node: &Node,
    env: &ExecEnv,
    tool: String,
    op: String,
    args: Value,
) -> NodeOutcome {
    let settings = SimulationSettings::from_node(node);
    let invocation = ToolInvocation {
        tool_name: tool.clone(),
        operation: op.clone(),
        args,
        seed: env.options.seed,
        latency_ms: settings.latency_ms,
        error_mode: settings.error_mode.clone(),
    };
    debug!(node_id = %node.id, tool = %tool, operation = %op, "Invoking tool simulator");

    let outcome = match env.tools.invoke(invocation).await {
        ToolOutcome::Ok { data, .. } => NodeOutcome::new(
            NodeOutput::Structured(json!({
                "status": "success",
                "tool": tool,
                "operation": op,
                "data": data,
            })),
            format!("Simulated {} call succeeded (operation: {})", tool, op),
        ),
        ToolOutcome::Err { error, .. } => NodeOutcome::new(
            NodeOutput::Structured(json!({
                "error": error.message,
                "kind": error.kind,
                "tool": tool,
                "operation": op,
            })),
            format!("Simulated {} call failed with {} (operation: {})", tool, error.kind, op),
        ),
    };

    let mut outcome = outcome
        .simulated(true)
        .rule(format!("{}.{}", tool, op))
        .trace(format!("seed {}", env.options.seed));
    if let Some(ms) = settings.latency_ms {
        outcome = outcome.trace(format!("latency {}ms", ms));
    }
    if settings.error_mode != ErrorMode::None {
        outcome = outcome.trace(format!("error mode {:?}", settings.error_mode));
    }
    outcome
}

impl NodeExecutor for ToolExecutor {
    fn execute<'a>(
        &'a self,
        node: &'a Node,
        _ctx: &'a NodeContext,
        env: &'a ExecEnv,
    ) -> BoxFuture<'a, NodeOutcome> {
        Box::pin(async move {
            let (Some(tool), Some(op)) = (tool_name(node), operation(node)) else {
                return NodeOutcome::failed(
                    "Tool node needs both a tool and an operation",
                    "Tool not run (operation: unspecified)",
                );
            };
            let args = node
                .field("args")
                .or_else(|| node.field("simulation.args"))
                .cloned()
                .unwrap_or_else(|| json!({}));
            simulate(node, env, tool, op, args).await
        })
    }
}

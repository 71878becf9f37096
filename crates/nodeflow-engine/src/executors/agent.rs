use futures::future::BoxFuture;
use serde_json::json;
use tracing::{debug, warn};

use nodeflow_core::types::LlmRequest;

use super::{raw_key, ExecEnv, NodeExecutor, NodeOutcome};
use crate::context::{NodeContext, NodeOutput};
use crate::graph::Node;

pub struct AgentExecutor;

/// System prompt layers, outermost first.
pub(crate) fn system_layers(node: &Node) -> Vec<String> {
    let mut layers = Vec::new();

    let rules: Vec<String> = ["systemPrompt", "rules.nl", "behavior"]
        .iter()
        .filter_map(|f| node.field_str(f))
        .collect();
    if !rules.is_empty() {
        layers.push(format!("System rules:\n{}", rules.join("\n")));
    }
    if let Some(p) = node.field_str("personality") {
        layers.push(format!("Personality:\n{}", p));
    }
    if let Some(p) = node.field_str("escalationPolicy") {
        layers.push(format!("Escalation policy:\n{}", p));
    }
    if let Some(t) = node.field_f64("confidenceThreshold") {
        layers.push(format!(
            "Confidence threshold: {}. If your confidence is below it, say so and escalate.",
            t
        ));
    }
    layers
}

/// User prompt: upstream context, then the node's own input text.
pub(crate) fn user_prompt(node: &Node, ctx: &NodeContext) -> String {
    let mut parts = Vec::new();
    let upstream = ctx.upstream_summary();
    if !upstream.is_empty() {
        parts.push(format!("Upstream context:\n{}", upstream));
    }
    let input = ctx.input_text();
    let user = node
        .field_str("userMessage")
        .or_else(|| (!input.is_empty()).then_some(input))
        .unwrap_or_else(|| "Proceed according to your rules.".to_string());
    parts.push(format!("User:\n{}", user));
    parts.join("\n\n")
}

impl NodeExecutor for AgentExecutor {
    fn execute<'a>(
        &'a self,
        node: &'a Node,
        ctx: &'a NodeContext,
        env: &'a ExecEnv,
    ) -> BoxFuture<'a, NodeOutcome> {
        Box::pin(async move {
            let layers = system_layers(node);
            let request = LlmRequest::new(user_prompt(node, ctx)).with_system(layers.join("\n\n"));

            match env.ask(node, request).await {
                Ok(resp) => {
                    debug!(node_id = %node.id, provider = %resp.provider, "Agent response received");
                    let mut body = json!({
                        "output": resp.text,
                        "provider": resp.provider,
                        "model": resp.model,
                    });
                    body[raw_key(&resp.provider)] = resp.raw.clone();
                    let output = NodeOutput::Structured(body);
                    let summary = format!(
                        "Agent '{}' answered via {} ({} chars)",
                        node.label(),
                        resp.provider,
                        resp.text.chars().count()
                    );
                    let mut outcome = NodeOutcome::new(output, summary)
                        .simulated(env.is_mock())
                        .from_llm(&resp)
                        .trace(format!("prompt layers: {}", layers.len()));
                    for field in ["systemPrompt", "rules.nl", "behavior"] {
                        if node.is_configured(field) {
                            outcome = outcome.rule(field);
                        }
                    }
                    outcome
                }
                Err(e) => {
                    warn!(node_id = %node.id, error = %e, "Agent call failed");
                    NodeOutcome::failed(e.to_string(), format!("Agent '{}' failed: {}", node.label(), e))
                }
            }
        })
    }
}

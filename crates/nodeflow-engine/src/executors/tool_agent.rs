use futures::future::BoxFuture;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use tracing::{debug, warn};

use nodeflow_core::types::{LlmRequest, ResponseFormat};

use super::tool::{operation, simulate};
use super::{raw_key, ExecEnv, NodeExecutor, NodeOutcome};
use crate::context::{NodeContext, NodeOutput};
use crate::graph::Node;

pub struct ToolAgentExecutor;

/// Simulate when the run forces simulators, the node asks for it, or a
/// provider is configured without an explicit mode.
pub fn should_simulate(node: &Node, use_simulators: bool) -> bool {
    if use_simulators {
        return true;
    }
    match node.field_str("simulation.mode") {
        Some(mode) => mode.eq_ignore_ascii_case("simulate"),
        None => node.is_configured("simulation.providerId"),
    }
}

/// How a live response was turned into data.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    Direct(Value),
    Braces(Value),
    Fallback(Value),
    Raw(String),
}

impl Parsed {
    fn label(&self) -> &'static str {
        match self {
            Self::Direct(_) => "direct",
            Self::Braces(_) => "brace-extraction",
            Self::Fallback(_) => "domain-fallback",
            Self::Raw(_) => "raw-text",
        }
    }
}

/// Direct parse, then the outermost `{…}` span, then a domain fallback.
pub fn parse_tool_response(text: &str, domain: Option<&str>, seed: u64) -> Parsed {
    if let Ok(v) = serde_json::from_str::<Value>(text.trim()) {
        if v.is_object() || v.is_array() {
            return Parsed::Direct(v);
        }
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Ok(v) = serde_json::from_str::<Value>(&text[start..=end]) {
                return Parsed::Braces(v);
            }
        }
    }
    if let Some(v) = domain.and_then(|d| domain_fallback(d, seed)) {
        return Parsed::Fallback(v);
    }
    Parsed::Raw(text.to_string())
}

fn domain_fallback(domain: &str, seed: u64) -> Option<Value> {
    if !domain.to_lowercase().contains("calendar") {
        return None;
    }
    Some(calendar_availability(seed))
}

/// Deterministic three-slot availability for calendar requests.
pub fn calendar_availability(seed: u64) -> Value {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut hour = 9;
    let slots: Vec<Value> = (0..3)
        .map(|_| {
            hour += rng.gen_range(0..=2);
            let slot = json!({
                "start": format!("{:02}:00", hour),
                "end": format!("{:02}:30", hour),
            });
            hour += 1;
            slot
        })
        .collect();
    json!({ "available": true, "slots": slots })
}

impl NodeExecutor for ToolAgentExecutor {
    fn execute<'a>(
        &'a self,
        node: &'a Node,
        ctx: &'a NodeContext,
        env: &'a ExecEnv,
    ) -> BoxFuture<'a, NodeOutcome> {
        Box::pin(async move {
            let provider = node.field_str("simulation.providerId");

            if should_simulate(node, env.options.use_simulators) {
                let (Some(tool), Some(op)) = (provider.clone(), operation(node)) else {
                    return NodeOutcome::failed(
                        "Simulation needs simulation.providerId and an operation",
                        format!(
                            "Tool agent '{}' could not simulate (operation: {})",
                            node.label(),
                            operation(node).unwrap_or_else(|| "unspecified".into())
                        ),
                    );
                };
                let args = node
                    .field("simulation.args")
                    .or_else(|| node.field("args"))
                    .cloned()
                    .unwrap_or_else(|| json!({}));
                return simulate(node, env, tool, op, args).await.rule("simulate");
            }

            let instructions = node
                .first_str(&["rules.nl", "systemPrompt", "prompt"])
                .unwrap_or_default();
            let op = operation(node);
            let mut prompt = format!("Task:\n{}", instructions);
            if let Some(op) = &op {
                prompt.push_str(&format!("\n\nOperation: {}", op));
            }
            let input = ctx.input_text();
            if !input.is_empty() {
                prompt.push_str(&format!("\n\nInput:\n{}", input));
            }
            let request = LlmRequest::new(prompt)
                .with_system("You act as a tool. Respond with strict JSON only, no prose.")
                .with_format(ResponseFormat::Json);

            let resp = match env.ask(node, request).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(node_id = %node.id, error = %e, "Tool agent call failed");
                    return NodeOutcome::failed(
                        e.to_string(),
                        format!(
                            "Tool agent '{}' failed (operation: {})",
                            node.label(),
                            op.as_deref().unwrap_or("unspecified")
                        ),
                    );
                }
            };

            let domain = provider.clone().or_else(|| Some(instructions.clone()));
            let parsed = parse_tool_response(&resp.text, domain.as_deref(), env.options.seed);
            debug!(node_id = %node.id, parse = parsed.label(), "Tool agent response parsed");

            let mut body = match &parsed {
                Parsed::Direct(v) | Parsed::Braces(v) | Parsed::Fallback(v) => json!({
                    "output": v.to_string(),
                    "data": v,
                }),
                Parsed::Raw(text) => json!({ "output": text }),
            };
            body["parse"] = json!(parsed.label());
            body["provider"] = json!(resp.provider);
            body[raw_key(&resp.provider)] = resp.raw.clone();

            NodeOutcome::new(
                NodeOutput::Structured(body),
                format!(
                    "Tool agent '{}' answered live, parsed by {} (operation: {})",
                    node.label(),
                    parsed.label(),
                    op.as_deref().unwrap_or("unspecified")
                ),
            )
            .simulated(env.is_mock())
            .from_llm(&resp)
            .rule("live")
            .trace(format!("parse: {}", parsed.label()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use nodeflow_test_utils::{FailingLlm, RecordingTools, ScriptedLlm};

    use crate::executors::testing::{env_with_tools, with_input};

    #[test]
    fn simulate_decision_rule() {
        let bare = Node::new("t", "tool-agent");
        assert!(!should_simulate(&bare, false));
        assert!(should_simulate(&bare, true));

        let with_provider =
            Node::new("t", "tool-agent").with_config(json!({"simulation": {"providerId": "calendar"}}));
        assert!(should_simulate(&with_provider, false));

        let live = Node::new("t", "tool-agent").with_config(json!({
            "simulation": {"providerId": "calendar", "mode": "live"}
        }));
        assert!(!should_simulate(&live, false));

        let explicit = Node::new("t", "tool-agent").with_config(json!({"simulation": {"mode": "simulate"}}));
        assert!(should_simulate(&explicit, false));
    }

    #[test]
    fn parse_stages() {
        assert!(matches!(parse_tool_response(r#"{"a":1}"#, None, 1), Parsed::Direct(_)));
        assert!(matches!(
            parse_tool_response(r#"Sure! {"a":1} hope that helps"#, None, 1),
            Parsed::Braces(_)
        ));
        assert!(matches!(
            parse_tool_response("no json here", Some("calendar"), 1),
            Parsed::Fallback(_)
        ));
        assert_eq!(
            parse_tool_response("no json here", Some("email"), 1),
            Parsed::Raw("no json here".into())
        );
    }

    #[test]
    fn calendar_fallback_is_deterministic() {
        let a = calendar_availability(9);
        assert_eq!(a, calendar_availability(9));
        assert_eq!(a["slots"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn simulate_branch_invokes_the_tool() {
        let tools = Arc::new(RecordingTools::new());
        let env = env_with_tools(Arc::new(FailingLlm), tools.clone());
        let node = Node::new("ta", "tool-agent").with_config(json!({
            "simulation": {
                "providerId": "calendar",
                "operation": "list_events",
                "args": {"day": "monday"}
            }
        }));

        let outcome = ToolAgentExecutor.execute(&node, &with_input("what is on monday"), &env).await;
        assert!(outcome.simulated);
        assert_eq!(outcome.rules_fired, vec!["calendar.list_events", "simulate"]);
        assert_eq!(outcome.output.get("status"), Some(&json!("success")));

        let calls = tools.invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool_name, "calendar");
        assert_eq!(calls[0].args, json!({"day": "monday"}));
    }

    #[tokio::test]
    async fn simulate_without_operation_fails() {
        let tools = Arc::new(RecordingTools::new());
        let env = env_with_tools(Arc::new(FailingLlm), tools.clone());
        let node = Node::new("ta", "tool-agent")
            .with_config(json!({"simulation": {"providerId": "calendar"}}));
        let outcome = ToolAgentExecutor.execute(&node, &with_input(""), &env).await;
        assert!(outcome.output.is_error());
        assert!(outcome.summary.ends_with("(operation: unspecified)"));
        assert!(tools.invocations().is_empty());
    }

    #[tokio::test]
    async fn live_branch_parses_the_reply() {
        let llm = Arc::new(ScriptedLlm::always(r#"Here you go: {"events": []} done"#));
        let tools = Arc::new(RecordingTools::new());
        let env = env_with_tools(llm.clone(), tools.clone());
        let node = Node::new("ta", "tool-agent").with_config(json!({
            "systemPrompt": "List my meetings",
            "operation": "list_events",
            "simulation": {"providerId": "calendar", "mode": "live"}
        }));

        let outcome = ToolAgentExecutor.execute(&node, &with_input("this week"), &env).await;
        assert!(!outcome.simulated);
        assert_eq!(outcome.rules_fired, vec!["live"]);
        assert_eq!(outcome.output.get("parse"), Some(&json!("brace-extraction")));
        assert_eq!(outcome.output.get("data"), Some(&json!({"events": []})));
        assert_eq!(outcome.provider.as_deref(), Some("scripted"));
        assert!(tools.invocations().is_empty());

        let request = &llm.requests()[0];
        assert_eq!(request.response_format, Some(ResponseFormat::Json));
        assert!(request.system.as_deref().unwrap_or_default().contains("strict JSON"));
        assert!(request.prompt.starts_with("Task:\nList my meetings"));
        assert!(request.prompt.contains("Operation: list_events"));
        assert!(request.prompt.contains("Input:\nthis week"));
    }

    #[tokio::test]
    async fn live_branch_failure_is_an_error_result() {
        let env = env_with_tools(Arc::new(FailingLlm), Arc::new(RecordingTools::new()));
        let node = Node::new("ta", "tool-agent").with_config(json!({"prompt": "check stock"}));
        let outcome = ToolAgentExecutor.execute(&node, &with_input(""), &env).await;
        assert!(outcome.output.is_error());
        assert!(outcome.summary.contains("failed (operation: unspecified)"));
    }
}


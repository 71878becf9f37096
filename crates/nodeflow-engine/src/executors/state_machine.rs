use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::condition;
use super::{ExecEnv, NodeExecutor, NodeOutcome};
use crate::context::{NodeContext, NodeOutput};
use crate::graph::Node;

pub struct StateMachineExecutor;

#[derive(Debug, Clone, Deserialize)]
pub struct Transition {
    pub from: String,
    pub to: String,
    pub event: String,
    #[serde(default)]
    pub condition: Option<String>,
}

pub fn parse_transitions(node: &Node) -> Vec<Transition> {
    match node.field("transitions") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|t| serde_json::from_value(t.clone()).ok())
            .collect(),
        _ => Vec::new(),
    }
}

fn initial_state(node: &Node, transitions: &[Transition]) -> Option<String> {
    node.field_str("initialState")
        .or_else(|| transitions.first().map(|t| t.from.clone()))
}

impl NodeExecutor for StateMachineExecutor {
    fn execute<'a>(
        &'a self,
        node: &'a Node,
        ctx: &'a NodeContext,
        env: &'a ExecEnv,
    ) -> BoxFuture<'a, NodeOutcome> {
        Box::pin(async move {
            let transitions = parse_transitions(node);
            let persist = node.field_bool("persistState").unwrap_or(true);

            let stored = if persist { env.stores.state(&node.id) } else { None };
            let Some(current) = stored.or_else(|| initial_state(node, &transitions)) else {
                return NodeOutcome::failed(
                    "State machine has no initial state",
                    "No initialState and no transitions configured",
                );
            };

            let event = node
                .field_str("event")
                .unwrap_or_else(|| ctx.texts.join(" ").trim().to_string());

            let vars = ctx.variables();
            let mut trace = Vec::new();
            let mut chosen = None;
            for t in transitions
                .iter()
                .filter(|t| t.from == current && t.event.eq_ignore_ascii_case(&event))
            {
                match t.condition.as_deref().filter(|c| !c.trim().is_empty()) {
                    Some(cond) => {
                        let verdict = condition::check(cond, node, &vars, env).await;
                        trace.push(format!("guard '{}' -> {}", cond, verdict.passed()));
                        if verdict.passed() {
                            chosen = Some(t);
                            break;
                        }
                    }
                    None => {
                        chosen = Some(t);
                        break;
                    }
                }
            }

            let mut outcome = match chosen {
                Some(t) => {
                    if persist {
                        env.stores.set_state(&node.id, t.to.clone());
                    }
                    debug!(node_id = %node.id, from = %current, to = %t.to, "State transition");
                    let message = format!("Transitioned from {} to {} on '{}'", current, t.to, event);
                    NodeOutcome::new(
                        NodeOutput::Structured(json!({
                            "output": message,
                            "previousState": current,
                            "state": t.to,
                            "transitioned": true,
                        })),
                        message.clone(),
                    )
                    .rule(format!("{} -> {}", current, t.to))
                }
                None => {
                    if persist {
                        env.stores.set_state(&node.id, current.clone());
                    }
                    let message = format!("No transition found from '{}' on event '{}'", current, event);
                    NodeOutcome::new(
                        NodeOutput::Structured(json!({
                            "output": message,
                            "previousState": current,
                            "state": current,
                            "transitioned": false,
                        })),
                        message.clone(),
                    )
                }
            };
            outcome.trace = trace;
            outcome
        })
    }
}

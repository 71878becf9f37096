use futures::future::BoxFuture;
use serde_json::json;

use nodeflow_core::types::LlmRequest;

use super::{raw_key, ExecEnv, NodeExecutor, NodeOutcome};
use crate::context::{NodeContext, NodeOutput};
use crate::graph::Node;

pub struct ThinkingExecutor;

const DEFAULT_INSTRUCTION: &str =
    "Think through the problem step by step. Finish with a line starting with 'Answer:'.";

/// Split a reply into (reasoning, answer) at the last `Answer:` marker.
pub fn split_answer(text: &str) -> (String, String) {
    match text.rfind("Answer:") {
        Some(at) => (
            text[..at].trim().to_string(),
            text[at + "Answer:".len()..].trim().to_string(),
        ),
        None => (text.trim().to_string(), text.trim().to_string()),
    }
}

impl NodeExecutor for ThinkingExecutor {
    fn execute<'a>(
        &'a self,
        node: &'a Node,
        ctx: &'a NodeContext,
        env: &'a ExecEnv,
    ) -> BoxFuture<'a, NodeOutcome> {
        Box::pin(async move {
            let instruction = node
                .first_str(&["prompt", "instructions", "systemPrompt"])
                .unwrap_or_else(|| DEFAULT_INSTRUCTION.to_string());
            let input = ctx.input_text();
            let prompt = if input.is_empty() {
                instruction.clone()
            } else {
                format!("{}\n\n{}", input, instruction)
            };
            let mut request = LlmRequest::new(prompt);
            if let Some(style) = node.field_str("style") {
                request = request.with_system(format!("Reasoning style: {}", style));
            }

            match env.ask(node, request).await {
                Ok(resp) => {
                    let (reasoning, answer) = split_answer(&resp.text);
                    let mut body = json!({
                        "output": answer,
                        "reasoning": reasoning,
                        "provider": resp.provider,
                    });
                    body[raw_key(&resp.provider)] = resp.raw.clone();
                    NodeOutcome::new(
                        NodeOutput::Structured(body),
                        format!("Reasoned via {}", resp.provider),
                    )
                    .rule("reasoning")
                    .simulated(env.is_mock())
                    .from_llm(&resp)
                }
                Err(e) => NodeOutcome::failed(e.to_string(), "Thinking call failed"),
            }
        })
    }
}

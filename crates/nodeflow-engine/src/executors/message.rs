use futures::future::BoxFuture;
use regex::Regex;

use super::{ExecEnv, MessageVariant, NodeExecutor, NodeOutcome};
use crate::context::{NodeContext, NodeOutput};
use crate::graph::Node;

pub struct MessageExecutor(pub MessageVariant);

/// Fill `{{input}}`, `{{scenario}}` and `{{<nodeId>}}`. Unknown placeholders
/// are left in place.
pub fn render(template: &str, ctx: &NodeContext) -> (String, Vec<String>) {
    let Ok(re) = Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}") else {
        return (template.to_string(), Vec::new());
    };
    let mut filled = Vec::new();
    let rendered = re
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            let value = match name {
                "input" => Some(ctx.texts.join("\n\n")),
                "scenario" => Some(ctx.scenario.clone().unwrap_or_default()),
                id => ctx.flow.get(id).map(|e| e.output.as_text()),
            };
            match value {
                Some(v) => {
                    filled.push(name.to_string());
                    v
                }
                None => caps[0].to_string(),
            }
        })
        .into_owned();
    (rendered, filled)
}

impl NodeExecutor for MessageExecutor {
    fn execute<'a>(
        &'a self,
        node: &'a Node,
        ctx: &'a NodeContext,
        _env: &'a ExecEnv,
    ) -> BoxFuture<'a, NodeOutcome> {
        Box::pin(async move {
            if let Some(template) = node.field_str("template") {
                let (text, filled) = render(&template, ctx);
                let summary = format!(
                    "Rendered {} with {} placeholder(s)",
                    if self.0 == MessageVariant::PromptTemplate { "prompt template" } else { "message template" },
                    filled.len()
                );
                let mut outcome = NodeOutcome::new(NodeOutput::Text(text), summary).rule("template");
                for name in filled {
                    outcome = outcome.trace(format!("filled {{{{{}}}}}", name));
                }
                return outcome;
            }
            let message = node.field_str("message").unwrap_or_default();
            NodeOutcome::new(NodeOutput::Text(message), "Emitted static message").rule("message")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AncestorEntry, ContextMode};
    use serde_json::json;

    #[test]
    fn placeholders() {
        let mut ctx = NodeContext {
            node_id: "m".into(),
            mode: Some(ContextMode::Legacy),
            texts: vec!["hi".into()],
            scenario: Some("Monday".into()),
            ..Default::default()
        };
        ctx.flow.insert(
            "agent-1".into(),
            AncestorEntry {
                config: Default::default(),
                output: NodeOutput::Structured(json!({"output": "drafted"})),
                metadata: json!({}),
            },
        );
        let (text, filled) = render("{{input}} / {{ scenario }} / {{agent-1}} / {{nope}}", &ctx);
        assert_eq!(text, "hi / Monday / drafted / {{nope}}");
        assert_eq!(filled, vec!["input", "scenario", "agent-1"]);
    }
}

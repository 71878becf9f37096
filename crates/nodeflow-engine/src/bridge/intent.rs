//! Maps natural-language agent rules onto `tool.operation` capabilities.

use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use nodeflow_core::types::{LlmRequest, ResponseFormat};

use crate::executors::ExecEnv;
use crate::graph::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentSource {
    Json,
    Regex,
    Keyword,
}

impl IntentSource {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Regex => "regex",
            Self::Keyword => "keyword",
        }
    }
}

/// Operations listed in a JSON reply: a bare array, or `operations`/`intents`.
pub fn parse_json(text: &str) -> Vec<String> {
    let Ok(value) = serde_json::from_str::<Value>(text.trim()) else {
        return Vec::new();
    };
    let list = match &value {
        Value::Array(items) => Some(items),
        Value::Object(map) => map
            .get("operations")
            .or_else(|| map.get("intents"))
            .and_then(|v| v.as_array()),
        _ => None,
    };
    list.map(|items| {
        items
            .iter()
            .filter_map(|v| v.as_str().or_else(|| v.get("operation").and_then(|o| o.as_str())))
            .filter(|s| s.contains('.'))
            .map(|s| s.trim().to_lowercase())
            .collect()
    })
    .unwrap_or_default()
}

/// `tool.operation` tokens found in free text, first occurrence order.
pub fn parse_regex(text: &str) -> Vec<String> {
    let Ok(re) = Regex::new(r"\b([a-z][a-z0-9_]*)\.([a-z][a-z0-9_]*)\b") else {
        return Vec::new();
    };
    let lower = text.to_lowercase();
    let mut found: Vec<String> = Vec::new();
    for caps in re.captures_iter(&lower) {
        let op = format!("{}.{}", &caps[1], &caps[2]);
        if !found.contains(&op) {
            found.push(op);
        }
    }
    found
}

/// Capabilities whose tool is named in the rules together with one of its
/// operation words.
pub fn keyword_match(rules: &str, capabilities: &[String]) -> Vec<String> {
    let lower = rules.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    capabilities
        .iter()
        .filter(|cap| {
            let Some((tool, op)) = cap.split_once('.') else {
                return false;
            };
            let tool_named = words.iter().any(|w| w.trim_end_matches('s') == tool);
            tool_named
                && op
                    .split('_')
                    .filter(|part| *part != tool && part.len() >= 4)
                    .any(|part| words.iter().any(|w| w.starts_with(part)))
        })
        .cloned()
        .collect()
}

/// Run the intent sub-call for an agent with `rules.nl`.
pub async fn extract(node: &Node, rules: &str, env: &ExecEnv) -> Value {
    let capabilities = env.tools.capabilities();
    let prompt = format!(
        "Map these rules onto tool operations.\nRules:\n{}\n\nAvailable operations:\n{}\n\n\
         Reply with JSON: {{\"operations\": [\"tool.operation\", ...]}}",
        rules,
        capabilities.join("\n")
    );
    let request = LlmRequest::new(prompt).with_format(ResponseFormat::Json);

    let (operations, source) = match env.ask(node, request).await {
        Ok(resp) => {
            let json_ops = parse_json(&resp.text);
            if !json_ops.is_empty() {
                (json_ops, IntentSource::Json)
            } else {
                let regex_ops = parse_regex(&resp.text);
                if !regex_ops.is_empty() {
                    (regex_ops, IntentSource::Regex)
                } else {
                    (keyword_match(rules, &capabilities), IntentSource::Keyword)
                }
            }
        }
        Err(e) => {
            debug!(node_id = %node.id, error = %e, "Intent call failed, using keywords");
            (keyword_match(rules, &capabilities), IntentSource::Keyword)
        }
    };

    json!({
        "operations": operations,
        "source": source.as_str(),
        "rules": rules,
    })
}

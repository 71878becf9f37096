use futures::future::BoxFuture;
use serde_json::{json, Value};

use super::{ExecEnv, NodeExecutor, NodeOutcome};
use crate::context::{extract_text, NodeContext, NodeOutput};
use crate::graph::Node;

pub struct KnowledgeExecutor;

const EMPTY: &str = "No documents found";

fn configured_documents(node: &Node) -> Vec<String> {
    match node.field("documents") {
        Some(Value::Array(items)) => items
            .iter()
            .map(extract_text)
            .filter(|s| !s.trim().is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Documents containing any query term, case-insensitively.
pub fn search(docs: &[String], query: &str) -> Vec<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .filter(|t| t.len() > 1)
        .collect();
    if terms.is_empty() {
        return Vec::new();
    }
    docs.iter()
        .filter(|d| {
            let lower = d.to_lowercase();
            terms.iter().any(|t| lower.contains(t.as_str()))
        })
        .cloned()
        .collect()
}

fn listing(docs: Vec<String>, summary: String) -> NodeOutcome {
    if docs.is_empty() {
        return NodeOutcome::new(
            NodeOutput::Structured(json!({ "output": EMPTY, "documents": [] })),
            summary,
        );
    }
    NodeOutcome::new(
        NodeOutput::Structured(json!({ "output": docs.join("\n\n"), "documents": docs })),
        summary,
    )
}

impl NodeExecutor for KnowledgeExecutor {
    fn execute<'a>(
        &'a self,
        node: &'a Node,
        ctx: &'a NodeContext,
        env: &'a ExecEnv,
    ) -> BoxFuture<'a, NodeOutcome> {
        Box::pin(async move {
            let op = node
                .field_str("operation")
                .map(|s| s.to_lowercase())
                .unwrap_or_default();
            let stores = &env.stores;

            match op.as_str() {
                "store" => {
                    let mut docs = configured_documents(node);
                    if docs.is_empty() {
                        docs = ctx.texts.iter().filter(|t| !t.trim().is_empty()).cloned().collect();
                    }
                    let added = docs.len();
                    let total = stores.add_documents(&node.id, docs);
                    NodeOutcome::new(
                        NodeOutput::Structured(json!({
                            "output": format!("Stored {} document(s)", added),
                            "stored": added,
                            "total": total,
                        })),
                        format!("Stored {} document(s); {} in cache", added, total),
                    )
                    .rule("store")
                }
                "retrieve" => {
                    let docs = stores.documents(&node.id);
                    let n = docs.len();
                    listing(docs, format!("Retrieved {} document(s)", n)).rule("retrieve")
                }
                "search" => {
                    let query = node
                        .field_str("query")
                        .unwrap_or_else(|| ctx.input_text());
                    let hits = search(&stores.documents(&node.id), &query);
                    let n = hits.len();
                    listing(hits, format!("Search for '{}' matched {} document(s)", query, n))
                        .rule("search")
                        .trace(format!("query: {}", query))
                }
                other => NodeOutcome::failed(
                    format!("Unknown knowledge-base operation '{}'", other),
                    "Knowledge base operation must be store, retrieve or search",
                ),
            }
        })
    }
}

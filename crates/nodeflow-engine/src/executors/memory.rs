use futures::future::BoxFuture;
use serde_json::{json, Value};

use super::{ExecEnv, NodeExecutor, NodeOutcome};
use crate::context::{NodeContext, NodeOutput};
use crate::graph::Node;

pub struct MemoryExecutor;

/// Value to store: configured `value`, else the flattened input text.
fn incoming_value(node: &Node, ctx: &NodeContext) -> Value {
    node.field("value")
        .cloned()
        .unwrap_or_else(|| Value::String(ctx.input_text()))
}

impl NodeExecutor for MemoryExecutor {
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
                .unwrap_or_else(|| "read".into());
            let key = node.field_str("key");
            let stores = &env.stores;

            match (op.as_str(), key.as_deref()) {
                ("write", Some(key)) => {
                    let value = incoming_value(node, ctx);
                    stores.memory_set(&node.id, key, value.clone());
                    NodeOutcome::new(
                        NodeOutput::Structured(json!({"output": value, "key": key})),
                        format!("Wrote memory key '{}'", key),
                    )
                    .rule("write")
                }
                ("append", Some(key)) => {
                    let len = stores.memory_append(&node.id, key, incoming_value(node, ctx));
                    NodeOutcome::new(
                        NodeOutput::Structured(json!({
                            "output": stores.memory_get(&node.id, key),
                            "key": key,
                            "length": len,
                        })),
                        format!("Appended to memory key '{}' ({} item(s))", key, len),
                    )
                    .rule("append")
                }
                ("read", Some(key)) => match stores.memory_get(&node.id, key) {
                    Some(value) => NodeOutcome::new(
                        NodeOutput::Structured(json!({"output": value, "key": key, "found": true})),
                        format!("Read memory key '{}'", key),
                    )
                    .rule("read"),
                    None => NodeOutcome::new(
                        NodeOutput::Structured(json!({
                            "output": format!("No value stored under '{}'", key),
                            "key": key,
                            "found": false,
                        })),
                        format!("Memory key '{}' is empty", key),
                    )
                    .rule("read"),
                },
                ("read", None) => {
                    let all = stores.memory_all(&node.id);
                    let n = all.len();
                    NodeOutcome::new(
                        NodeOutput::Structured(json!({"output": Value::Object(all), "found": n > 0})),
                        format!("Read {} memory key(s)", n),
                    )
                    .rule("read")
                }
                ("clear", key) => {
                    let removed = stores.memory_clear(&node.id, key);
                    NodeOutcome::new(
                        NodeOutput::Structured(json!({
                            "output": format!("Cleared {} memory key(s)", removed),
                            "cleared": removed,
                        })),
                        format!("Cleared {} memory key(s)", removed),
                    )
                    .rule("clear")
                }
                ("write" | "append", None) => NodeOutcome::failed(
                    format!("Memory {} needs a key", op),
                    "Memory operation skipped: no key configured",
                ),
                (other, _) => NodeOutcome::failed(
                    format!("Unknown memory operation '{}'", other),
                    "Memory operation must be write, read, append or clear",
                ),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use nodeflow_test_utils::FailingLlm;

    use crate::context::ContextMode;
    use crate::executors::testing::{live_env, with_input};

    fn memory(config: Value) -> Node {
        Node::new("m", "memory").with_config(config)
    }

    #[test]
    fn configured_value_wins_over_input() {
        let ctx = NodeContext {
            mode: Some(ContextMode::Legacy),
            texts: vec!["from upstream".into()],
            ..Default::default()
        };
        let plain = Node::new("m", "memory");
        assert_eq!(incoming_value(&plain, &ctx), json!("from upstream"));
        let fixed = Node::new("m", "memory").with_config(json!({"value": {"n": 1}}));
        assert_eq!(incoming_value(&fixed, &ctx), json!({"n": 1}));
    }

    #[tokio::test]
    async fn write_read_append_clear() {
        let env = live_env(Arc::new(FailingLlm));
        let ctx = with_input("book the dentist");

        let missing = MemoryExecutor
            .execute(&memory(json!({"key": "todo"})), &ctx, &env)
            .await;
        assert_eq!(missing.output.get("found"), Some(&json!(false)));
        assert_eq!(missing.rules_fired, vec!["read"]);

        let wrote = MemoryExecutor
            .execute(&memory(json!({"operation": "write", "key": "todo"})), &ctx, &env)
            .await;
        assert_eq!(wrote.output.get("output"), Some(&json!("book the dentist")));

        let read = MemoryExecutor
            .execute(&memory(json!({"operation": "read", "key": "todo"})), &ctx, &env)
            .await;
        assert_eq!(read.output.get("found"), Some(&json!(true)));
        assert_eq!(read.output.as_text(), "book the dentist");

        let appended = MemoryExecutor
            .execute(
                &memory(json!({"operation": "append", "key": "todo", "value": "renew passport"})),
                &ctx,
                &env,
            )
            .await;
        assert_eq!(appended.output.get("length"), Some(&json!(2)));
        assert_eq!(
            appended.output.get("output"),
            Some(&json!(["book the dentist", "renew passport"]))
        );

        MemoryExecutor
            .execute(&memory(json!({"operation": "write", "key": "mood", "value": "calm"})), &ctx, &env)
            .await;
        let everything = MemoryExecutor.execute(&memory(json!({})), &ctx, &env).await;
        assert_eq!(
            everything.output.get("output"),
            Some(&json!({"todo": ["book the dentist", "renew passport"], "mood": "calm"}))
        );

        let one = MemoryExecutor
            .execute(&memory(json!({"operation": "clear", "key": "mood"})), &ctx, &env)
            .await;
        assert_eq!(one.output.get("cleared"), Some(&json!(1)));
        let rest = MemoryExecutor
            .execute(&memory(json!({"operation": "clear"})), &ctx, &env)
            .await;
        assert_eq!(rest.output.get("cleared"), Some(&json!(1)));
        assert!(env.stores.memory_all("m").is_empty());
    }

    #[tokio::test]
    async fn write_without_key_fails() {
        let env = live_env(Arc::new(FailingLlm));
        let outcome = MemoryExecutor
            .execute(&memory(json!({"operation": "write"})), &with_input("x"), &env)
            .await;
        assert_eq!(outcome.output.error(), Some("Memory write needs a key"));
        assert!(env.stores.memory_all("m").is_empty());
    }
}


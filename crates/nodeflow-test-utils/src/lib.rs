//! Test doubles shared by nodeflow crates.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use futures::future::BoxFuture;
use serde_json::{json, Value};

use nodeflow_core::error::{FlowError, Result};
use nodeflow_core::traits::{LlmClient, ProjectStore, ToolSimulator};
use nodeflow_core::types::{LlmRequest, LlmResponse, ToolInvocation, ToolOutcome};

/// LLM that replays scripted replies in order, then repeats the last one.
/// Every request is recorded.
pub struct ScriptedLlm {
    provider: String,
    replies: Mutex<VecDeque<String>>,
    last: Mutex<String>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            provider: "scripted".into(),
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            last: Mutex::new(String::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `text`.
    pub fn always(text: impl Into<String>) -> Self {
        let text: String = text.into();
        Self::new([text])
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl LlmClient for ScriptedLlm {
    fn name(&self) -> &str {
        &self.provider
    }

    fn complete(&self, request: LlmRequest) -> BoxFuture<'_, Result<LlmResponse>> {
        Box::pin(async move {
            let model = request.model.clone();
            self.requests.lock().unwrap().push(request);
            let text = {
                let mut last = self.last.lock().unwrap();
                if let Some(next) = self.replies.lock().unwrap().pop_front() {
                    *last = next;
                }
                last.clone()
            };
            Ok(LlmResponse {
                raw: json!({"choices": [{"message": {"content": text}}]}),
                text,
                provider: self.provider.clone(),
                model: model.or_else(|| Some("scripted-model".into())),
            })
        })
    }
}

/// LLM whose every call fails like an unreachable endpoint.
pub struct FailingLlm;

impl LlmClient for FailingLlm {
    fn name(&self) -> &str {
        "failing"
    }

    fn complete(&self, _request: LlmRequest) -> BoxFuture<'_, Result<LlmResponse>> {
        Box::pin(async { Err(FlowError::LlmRequest("connection refused".into())) })
    }
}

/// Tool simulator that echoes its invocation and records it.
#[derive(Default)]
pub struct RecordingTools {
    invocations: Mutex<Vec<ToolInvocation>>,
}

impl RecordingTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.invocations.lock().unwrap().clone()
    }
}

impl ToolSimulator for RecordingTools {
    fn invoke(&self, invocation: ToolInvocation) -> BoxFuture<'_, ToolOutcome> {
        Box::pin(async move {
            let data = json!({
                "tool": invocation.tool_name,
                "operation": invocation.operation,
                "args": invocation.args,
            });
            self.invocations.lock().unwrap().push(invocation);
            ToolOutcome::success(data)
        })
    }

    fn preset(&self, _tool: Option<&str>, name: &str) -> Option<Value> {
        (name == "list_success").then(|| json!({"status": "success", "data": ["item1", "item2", "item3"]}))
    }

    fn capabilities(&self) -> Vec<String> {
        vec!["calendar.list_events".into(), "email.send_email".into()]
    }
}

/// `ProjectStore` over a `HashMap`, newest-first listing by write order.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<(HashMap<String, (u64, Value)>, u64)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProjectStore for MemoryStore {
    fn put(&self, key: &str, value: Value) -> BoxFuture<'_, Result<()>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut inner = self.inner.lock().unwrap();
            inner.1 += 1;
            let seq = inner.1;
            inner.0.insert(key, (seq, value));
            Ok(())
        })
    }

    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<Value>>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.inner.lock().unwrap().0.get(&key).map(|(_, v)| v.clone())) })
    }

    fn delete(&self, key: &str) -> BoxFuture<'_, Result<bool>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.inner.lock().unwrap().0.remove(&key).is_some()) })
    }

    fn list(&self, prefix: &str, limit: usize) -> BoxFuture<'_, Result<Vec<String>>> {
        let prefix = prefix.to_string();
        Box::pin(async move {
            let inner = self.inner.lock().unwrap();
            let mut keys: Vec<(u64, String)> = inner
                .0
                .iter()
                .filter(|(k, _)| k.starts_with(&prefix))
                .map(|(k, (seq, _))| (*seq, k.clone()))
                .collect();
            keys.sort_by(|a, b| b.0.cmp(&a.0));
            Ok(keys.into_iter().take(limit).map(|(_, k)| k).collect())
        })
    }
}

/// Node JSON in the document shape the engine ingests.
pub fn node(id: &str, kind: &str, config: Value) -> Value {
    json!({"id": id, "type": kind, "config": config})
}

/// Edge JSON in the canonical `{source, target}` shape.
pub fn edge(source: &str, target: &str) -> Value {
    json!({"source": source, "target": target})
}

/// Graph document JSON with an explicit start node.
pub fn document(nodes: Vec<Value>, edges: Vec<Value>, start: &str) -> String {
    json!({"nodes": nodes, "connections": edges, "startNodeId": start}).to_string()
}

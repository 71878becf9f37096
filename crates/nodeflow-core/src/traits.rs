use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::*;

/// LLM call capability. Implementations must fail with a typed error on
/// transport or auth failure rather than return an empty response.
pub trait LlmClient: Send + Sync + 'static {
    /// Provider name reported when a response does not name one.
    fn name(&self) -> &str;

    /// Send one prompt and wait for the full response.
    fn complete(&self, request: LlmRequest) -> BoxFuture<'_, Result<LlmResponse>>;
}

/// Tool-simulation capability: deterministic for a fixed seed.
pub trait ToolSimulator: Send + Sync + 'static {
    /// Run a simulated tool operation.
    fn invoke(&self, invocation: ToolInvocation) -> BoxFuture<'_, ToolOutcome>;

    /// Look up a named mock preset. `tool` narrows the lookup when a
    /// tool-specific variant of the preset exists.
    fn preset(&self, tool: Option<&str>, name: &str) -> Option<serde_json::Value>;

    /// `tool.operation` capability strings this simulator can serve.
    fn capabilities(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Opaque key/value persistence backend.
pub trait ProjectStore: Send + Sync + 'static {
    /// Store a value under a key, replacing any previous value.
    fn put(&self, key: &str, value: serde_json::Value) -> BoxFuture<'_, Result<()>>;

    /// Load a value by key.
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<serde_json::Value>>>;

    /// Delete a key. Returns whether it existed.
    fn delete(&self, key: &str) -> BoxFuture<'_, Result<bool>>;

    /// List keys starting with `prefix`, most recently written first.
    fn list(&self, prefix: &str, limit: usize) -> BoxFuture<'_, Result<Vec<String>>>;
}

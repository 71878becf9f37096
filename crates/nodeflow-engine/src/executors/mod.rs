//! Closed set of node executors.
//!
//! `NodeKind::resolve` is the only place kind/subtype strings are read; past
//! it, dispatch is an exhaustive match.

pub mod agent;
pub mod condition;
pub mod knowledge;
pub mod memory;
pub mod message;
pub mod router;
pub mod state_machine;
pub mod thinking;
pub mod tool;
pub mod tool_agent;

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use nodeflow_core::error::Result;
use nodeflow_core::traits::{LlmClient, ToolSimulator};
use nodeflow_core::types::{LlmRequest, LlmResponse, RunId, RunMode};

use crate::context::{ContextMode, NodeContext, NodeOutput};
use crate::graph::Node;
use crate::options::RunOptions;
use crate::store::NodeStores;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouterVariant {
    IfElse,
    Router,
    DecisionTree,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageVariant {
    Message,
    PromptTemplate,
}

/// Every executable node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "variant", rename_all = "kebab-case")]
pub enum NodeKind {
    Agent,
    ToolAgent,
    Router(RouterVariant),
    KnowledgeBase,
    Message(MessageVariant),
    StateMachine,
    Memory,
    Thinking,
    Tool,
}

fn canon(s: &str) -> String {
    s.trim().to_lowercase().replace(['_', ' '], "-")
}

impl NodeKind {
    /// Resolve declared kind/subtype strings. Case-insensitive; `_` and `-`
    /// are interchangeable. `None` means there is no executor for the pair.
    pub fn resolve(kind: &str, subtype: Option<&str>) -> Option<Self> {
        let kind = canon(kind);
        let subtype = subtype.map(canon).filter(|s| !s.is_empty());
        let sub = subtype.as_deref();

        match (kind.as_str(), sub) {
            // Category nodes carry the concrete kind in the subtype
            ("logic" | "data" | "ai", Some(s)) => Self::resolve(s, None),

            ("agent", None | Some("agent" | "llm" | "chat")) => Some(Self::Agent),
            ("agent", Some("tool-agent" | "toolagent" | "tool")) => Some(Self::ToolAgent),
            ("tool-agent" | "toolagent", None | Some(_)) => Some(Self::ToolAgent),

            ("router", None | Some("router")) => Some(Self::Router(RouterVariant::Router)),
            ("router", Some("if-else" | "ifelse" | "condition")) => {
                Some(Self::Router(RouterVariant::IfElse))
            }
            ("router", Some("decision-tree" | "decisiontree")) => {
                Some(Self::Router(RouterVariant::DecisionTree))
            }
            ("if-else" | "ifelse" | "condition", None) => Some(Self::Router(RouterVariant::IfElse)),
            ("decision-tree" | "decisiontree", None) => {
                Some(Self::Router(RouterVariant::DecisionTree))
            }

            ("knowledge-base" | "knowledgebase" | "knowledge", None) => Some(Self::KnowledgeBase),

            ("message", None | Some("message")) => Some(Self::Message(MessageVariant::Message)),
            ("message", Some("prompt-template" | "template")) => {
                Some(Self::Message(MessageVariant::PromptTemplate))
            }
            ("prompt-template" | "template", None) => {
                Some(Self::Message(MessageVariant::PromptTemplate))
            }

            ("state-machine" | "statemachine", None) => Some(Self::StateMachine),
            ("memory", None) => Some(Self::Memory),
            ("thinking" | "reasoning", None) => Some(Self::Thinking),
            ("tool", None) => Some(Self::Tool),
            ("tool", Some(s)) if s != "agent" => Some(Self::Tool),
            ("tool", Some(_)) => Some(Self::ToolAgent),

            _ => None,
        }
    }

    /// Canonical label used in summaries and events.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::ToolAgent => "tool-agent",
            Self::Router(RouterVariant::IfElse) => "if-else",
            Self::Router(RouterVariant::Router) => "router",
            Self::Router(RouterVariant::DecisionTree) => "decision-tree",
            Self::KnowledgeBase => "knowledge-base",
            Self::Message(MessageVariant::Message) => "message",
            Self::Message(MessageVariant::PromptTemplate) => "prompt-template",
            Self::StateMachine => "state-machine",
            Self::Memory => "memory",
            Self::Thinking => "thinking",
            Self::Tool => "tool",
        }
    }

    pub fn context_mode(&self) -> ContextMode {
        match self {
            Self::Message(_) | Self::Memory | Self::Thinking => ContextMode::Legacy,
            _ => ContextMode::Namespaced,
        }
    }

    pub fn is_tool(&self) -> bool {
        matches!(self, Self::Tool | Self::ToolAgent)
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Shared collaborators for one run.
pub struct ExecEnv {
    pub run_id: RunId,
    pub llm: Arc<dyn LlmClient>,
    pub tools: Arc<dyn ToolSimulator>,
    pub stores: Arc<NodeStores>,
    pub options: RunOptions,
}

impl ExecEnv {
    /// Send a request after applying caller overrides and node defaults.
    pub async fn ask(&self, node: &Node, mut request: LlmRequest) -> Result<LlmResponse> {
        self.options
            .overrides
            .apply(node, self.options.seed, &mut request);
        self.llm.complete(request).await
    }

    pub fn is_mock(&self) -> bool {
        self.options.mode == RunMode::Mock
    }
}

/// What an executor hands back to the bridge.
#[derive(Debug, Clone)]
pub struct NodeOutcome {
    pub output: NodeOutput,
    pub summary: String,
    pub rules_fired: Vec<String>,
    pub trace: Vec<String>,
    /// Produced by a simulator or the mock LLM rather than a live backend.
    pub simulated: bool,
    pub provider: Option<String>,
    pub model: Option<String>,
    /// Path chosen by a router, matched against outgoing connections.
    pub route: Option<String>,
}

impl NodeOutcome {
    pub fn new(output: NodeOutput, summary: impl Into<String>) -> Self {
        Self {
            output,
            summary: summary.into(),
            rules_fired: Vec::new(),
            trace: Vec::new(),
            simulated: false,
            provider: None,
            model: None,
            route: None,
        }
    }

    pub fn failed(message: impl Into<String>, summary: impl Into<String>) -> Self {
        Self::new(NodeOutput::from_error(message), summary)
    }

    pub fn rule(mut self, rule: impl Into<String>) -> Self {
        self.rules_fired.push(rule.into());
        self
    }

    pub fn trace(mut self, line: impl Into<String>) -> Self {
        self.trace.push(line.into());
        self
    }

    pub fn simulated(mut self, simulated: bool) -> Self {
        self.simulated = simulated;
        self
    }

    pub fn from_llm(mut self, response: &LlmResponse) -> Self {
        self.provider = Some(response.provider.clone());
        self.model = response.model.clone();
        self
    }
}

/// The polymorphic executor contract.
pub trait NodeExecutor: Send + Sync {
    fn execute<'a>(
        &'a self,
        node: &'a Node,
        ctx: &'a NodeContext,
        env: &'a ExecEnv,
    ) -> BoxFuture<'a, NodeOutcome>;
}

/// Run the executor for `kind`.
pub async fn execute(kind: NodeKind, node: &Node, ctx: &NodeContext, env: &ExecEnv) -> NodeOutcome {
    match kind {
        NodeKind::Agent => agent::AgentExecutor.execute(node, ctx, env).await,
        NodeKind::ToolAgent => tool_agent::ToolAgentExecutor.execute(node, ctx, env).await,
        NodeKind::Router(variant) => router::RouterExecutor(variant).execute(node, ctx, env).await,
        NodeKind::KnowledgeBase => knowledge::KnowledgeExecutor.execute(node, ctx, env).await,
        NodeKind::Message(variant) => message::MessageExecutor(variant).execute(node, ctx, env).await,
        NodeKind::StateMachine => state_machine::StateMachineExecutor.execute(node, ctx, env).await,
        NodeKind::Memory => memory::MemoryExecutor.execute(node, ctx, env).await,
        NodeKind::Thinking => thinking::ThinkingExecutor.execute(node, ctx, env).await,
        NodeKind::Tool => tool::ToolExecutor.execute(node, ctx, env).await,
    }
}

/// Key under which an LLM payload is kept in structured outputs.
pub(crate) fn raw_key(provider: &str) -> &'static str {
    if provider.eq_ignore_ascii_case("gemini") {
        "gemini"
    } else {
        "llm"
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use nodeflow_test_utils::RecordingTools;

    pub(crate) fn live_env(llm: Arc<dyn LlmClient>) -> ExecEnv {
        env_with_tools(llm, Arc::new(RecordingTools::new()))
    }

    pub(crate) fn env_with_tools(llm: Arc<dyn LlmClient>, tools: Arc<dyn ToolSimulator>) -> ExecEnv {
        ExecEnv {
            run_id: RunId::from_str("test"),
            llm,
            tools,
            stores: Arc::new(NodeStores::new()),
            options: RunOptions {
                mode: RunMode::Live,
                ..RunOptions::default()
            },
        }
    }

    /// Context carrying a single upstream text.
    pub(crate) fn with_input(text: &str) -> NodeContext {
        NodeContext {
            texts: vec![text.to_string()],
            ..NodeContext::default()
        }
    }
}

//! Recognized configuration fields per node kind.
//!
//! A kind's behaviour groups are what the executor path needs: every group
//! must have at least one configured field.

use crate::executors::{MessageVariant, NodeKind, RouterVariant};
use crate::graph::Node;

use super::result::PropertyUse;

const MOCK_FIELDS: &[&str] = &["mockResponse", "mockPreset"];

pub struct KindSchema {
    pub fields: &'static [&'static str],
    pub behaviour: &'static [&'static [&'static str]],
}

pub fn schema(kind: NodeKind) -> KindSchema {
    match kind {
        NodeKind::Agent => KindSchema {
            fields: &[
                "systemPrompt",
                "rules.nl",
                "behavior",
                "personality",
                "escalationPolicy",
                "confidenceThreshold",
                "userMessage",
                "model",
                "provider",
                "temperature",
            ],
            behaviour: &[&["systemPrompt", "rules.nl", "behavior", "personality", "userMessage"]],
        },
        NodeKind::ToolAgent => KindSchema {
            fields: &[
                "simulation.providerId",
                "simulation.operation",
                "simulation.mode",
                "simulation.mockPreset",
                "simulation.latency",
                "simulation.errorMode",
                "simulation.failureRate",
                "simulation.args",
                "operation",
                "rules.nl",
                "systemPrompt",
                "prompt",
            ],
            behaviour: &[&["simulation.providerId", "rules.nl", "systemPrompt", "prompt"]],
        },
        NodeKind::Router(RouterVariant::IfElse) => KindSchema {
            fields: &["condition", "truePath", "falsePath"],
            behaviour: &[&["condition"]],
        },
        NodeKind::Router(_) => KindSchema {
            fields: &["rules", "strategy", "defaultPath"],
            behaviour: &[&["rules", "defaultPath"]],
        },
        NodeKind::KnowledgeBase => KindSchema {
            fields: &["operation", "documents", "query"],
            behaviour: &[&["operation"]],
        },
        NodeKind::Message(MessageVariant::Message) => KindSchema {
            fields: &["message", "template"],
            behaviour: &[&["message", "template"]],
        },
        NodeKind::Message(MessageVariant::PromptTemplate) => KindSchema {
            fields: &["template", "message"],
            behaviour: &[&["template", "message"]],
        },
        NodeKind::StateMachine => KindSchema {
            fields: &["transitions", "initialState", "persistState", "event"],
            behaviour: &[&["transitions"]],
        },
        NodeKind::Memory => KindSchema {
            fields: &["operation", "key", "value"],
            behaviour: &[&["operation"]],
        },
        NodeKind::Thinking => KindSchema {
            fields: &["prompt", "instructions", "systemPrompt", "style", "model", "provider", "temperature"],
            behaviour: &[&["prompt", "instructions", "systemPrompt", "style"]],
        },
        NodeKind::Tool => KindSchema {
            fields: &[
                "toolName",
                "tool",
                "operation",
                "args",
                "simulation.providerId",
                "simulation.operation",
                "simulation.mockPreset",
                "simulation.latency",
                "simulation.errorMode",
                "simulation.failureRate",
                "simulation.args",
            ],
            behaviour: &[
                &["toolName", "tool", "simulation.providerId"],
                &["operation", "simulation.operation"],
            ],
        },
    }
}

/// Every recognized field of the node's kind, mock fields last.
pub fn enumerate(kind: NodeKind, node: &Node) -> Vec<PropertyUse> {
    schema(kind)
        .fields
        .iter()
        .chain(MOCK_FIELDS.iter())
        .map(|field| {
            let configured = node.is_configured(field);
            PropertyUse {
                field: field.to_string(),
                configured,
                value: if configured { node.field(field).cloned() } else { None },
            }
        })
        .collect()
}

/// Behaviour groups with nothing configured, as `a|b` alternatives.
pub fn missing_behaviour(kind: NodeKind, node: &Node) -> Vec<String> {
    schema(kind)
        .behaviour
        .iter()
        .filter(|group| !group.iter().any(|f| node.is_configured(f)))
        .map(|group| group.join("|"))
        .collect()
}

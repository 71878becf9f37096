pub mod calendar;
pub mod crm;
pub mod email;
pub mod weather;

use nodeflow_core::types::ToolFailure;

pub(crate) fn unknown_operation(provider: &str, operation: &str) -> ToolFailure {
    ToolFailure {
        kind: "unknown_operation".into(),
        message: format!("{} does not support operation '{}'", provider, operation),
    }
}

pub(crate) fn invalid_args(message: impl Into<String>) -> ToolFailure {
    ToolFailure {
        kind: "invalid_args".into(),
        message: message.into(),
    }
}

pub(crate) fn arg_str<'a>(args: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

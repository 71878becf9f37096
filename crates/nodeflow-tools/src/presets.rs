//! Named, deterministic canned tool results.
//!
//! A preset is looked up by name, optionally narrowed by tool. Tool-specific
//! entries win over the generic entry of the same name.

use serde_json::{json, Value};

/// Static catalog of mock presets.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresetCatalog;

impl PresetCatalog {
    /// Look up a preset. Returns `None` for unknown names.
    pub fn lookup(&self, tool: Option<&str>, name: &str) -> Option<Value> {
        let name = name.trim();
        if let Some(tool) = tool {
            if let Some(v) = tool_specific(&tool.to_lowercase(), name) {
                return Some(v);
            }
        }
        generic(name)
    }

    /// Names of the generic presets, for listings and error messages.
    pub fn names(&self) -> &'static [&'static str] {
        &[
            "list_success",
            "create_success",
            "update_success",
            "delete_success",
            "empty",
            "error",
            "not_found",
            "rate_limited",
            "timeout",
        ]
    }
}

fn generic(name: &str) -> Option<Value> {
    let v = match name {
        "list_success" => json!({ "status": "success", "data": ["item1", "item2", "item3"] }),
        "create_success" => json!({ "status": "success", "data": { "id": "item-001", "created": true } }),
        "update_success" => json!({ "status": "success", "data": { "id": "item-001", "updated": true } }),
        "delete_success" => json!({ "status": "success", "data": { "id": "item-001", "deleted": true } }),
        "empty" => json!({ "status": "success", "data": [] }),
        "error" => json!({ "status": "error", "error": "Simulated error" }),
        "not_found" => json!({ "status": "error", "error": "Resource not found", "code": 404 }),
        "rate_limited" => json!({ "status": "error", "error": "Rate limit exceeded", "code": 429, "retryAfter": 60 }),
        "timeout" => json!({ "status": "error", "error": "Request timed out", "code": 504 }),
        _ => return None,
    };
    Some(v)
}

fn tool_specific(tool: &str, name: &str) -> Option<Value> {
    let v = match (tool, name) {
        ("calendar", "busy_day") => json!({
            "status": "success",
            "data": [
                { "title": "Standup", "start": "09:00", "end": "09:15" },
                { "title": "Design review", "start": "10:00", "end": "11:30" },
                { "title": "Customer call", "start": "14:00", "end": "15:00" }
            ]
        }),
        ("calendar", "availability") => json!({
            "status": "success",
            "data": { "available": true, "slots": ["09:00-09:30", "13:00-13:30", "16:00-16:30"] }
        }),
        ("email", "inbox_unread") => json!({
            "status": "success",
            "data": [
                { "from": "alice@example.com", "subject": "Quarterly numbers", "unread": true },
                { "from": "bob@example.com", "subject": "Re: onboarding", "unread": true }
            ]
        }),
        ("email", "sent") => json!({ "status": "success", "data": { "messageId": "msg-000001", "sent": true } }),
        _ => return None,
    };
    Some(v)
}

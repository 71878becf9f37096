use rand::rngs::StdRng;
use rand::Rng;
use serde_json::{json, Value};

use nodeflow_core::types::ToolFailure;

use super::{arg_str, invalid_args, unknown_operation};
use crate::registry::SimProvider;

const SENDERS: &[&str] = &["alice@example.com", "bob@example.com", "support@vendor.io"];
const SUBJECTS: &[&str] = &["Quarterly numbers", "Re: onboarding", "Invoice #2231", "Lunch?"];

/// Simulated mailbox.
pub struct EmailProvider;

impl SimProvider for EmailProvider {
    fn name(&self) -> &str {
        "email"
    }

    fn operations(&self) -> &[&'static str] {
        &["send_email", "list_inbox", "search_email"]
    }

    fn run(
        &self,
        operation: &str,
        args: &Value,
        rng: &mut StdRng,
    ) -> std::result::Result<Value, ToolFailure> {
        match operation {
            "send_email" => {
                let to = arg_str(args, "to").ok_or_else(|| invalid_args("send_email requires 'to'"))?;
                Ok(json!({
                    "messageId": format!("msg-{:06}", rng.gen_range(0..1_000_000)),
                    "to": to,
                    "subject": arg_str(args, "subject").unwrap_or("(no subject)"),
                    "sent": true,
                }))
            }
            "list_inbox" | "search_email" => {
                let query = arg_str(args, "query").map(str::to_lowercase);
                let count = rng.gen_range(2..=5);
                let messages: Vec<Value> = (0..count)
                    .map(|i| {
                        json!({
                            "id": format!("msg-{}", i + 1),
                            "from": SENDERS[rng.gen_range(0..SENDERS.len())],
                            "subject": SUBJECTS[rng.gen_range(0..SUBJECTS.len())],
                            "unread": rng.gen_bool(0.5),
                        })
                    })
                    .filter(|m| match &query {
                        Some(q) => m["subject"]
                            .as_str()
                            .is_some_and(|s| s.to_lowercase().contains(q.as_str())),
                        None => true,
                    })
                    .collect();
                Ok(json!({ "messages": messages }))
            }
            other => Err(unknown_operation(self.name(), other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn send_requires_recipient() {
        let mut rng = StdRng::seed_from_u64(0);
        let err = EmailProvider.run("send_email", &json!({}), &mut rng).unwrap_err();
        assert_eq!(err.kind, "invalid_args");
        let ok = EmailProvider
            .run("send_email", &json!({"to": "a@b.c"}), &mut rng)
            .unwrap();
        assert_eq!(ok["sent"], true);
    }

    #[test]
    fn search_filters_by_subject() {
        let data = EmailProvider
            .run(
                "search_email",
                &json!({"query": "no-such-subject"}),
                &mut StdRng::seed_from_u64(5),
            )
            .unwrap();
        assert!(data["messages"].as_array().unwrap().is_empty());
    }
}

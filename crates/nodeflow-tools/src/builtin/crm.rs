use rand::rngs::StdRng;
use rand::Rng;
use serde_json::{json, Value};

use nodeflow_core::types::ToolFailure;

use super::{arg_str, unknown_operation};
use crate::registry::SimProvider;

const COMPANIES: &[&str] = &["Acme Corp", "Globex", "Initech", "Umbrella"];
const STAGES: &[&str] = &["lead", "qualified", "proposal", "won"];

/// Simulated CRM.
pub struct CrmProvider;

impl SimProvider for CrmProvider {
    fn name(&self) -> &str {
        "crm"
    }

    fn operations(&self) -> &[&'static str] {
        &["lookup_contact", "create_lead", "update_deal"]
    }

    fn run(
        &self,
        operation: &str,
        args: &Value,
        rng: &mut StdRng,
    ) -> std::result::Result<Value, ToolFailure> {
        match operation {
            "lookup_contact" => {
                let name = arg_str(args, "name").unwrap_or("Jordan Lee");
                Ok(json!({
                    "id": format!("ct-{:04}", rng.gen_range(0..10_000)),
                    "name": name,
                    "company": COMPANIES[rng.gen_range(0..COMPANIES.len())],
                    "stage": STAGES[rng.gen_range(0..STAGES.len())],
                }))
            }
            "create_lead" => Ok(json!({
                "id": format!("lead-{:04}", rng.gen_range(0..10_000)),
                "company": arg_str(args, "company").unwrap_or(COMPANIES[0]),
                "stage": "lead",
                "created": true,
            })),
            "update_deal" => Ok(json!({
                "id": arg_str(args, "id").unwrap_or("deal-0001"),
                "stage": arg_str(args, "stage").unwrap_or(STAGES[rng.gen_range(0..STAGES.len())]),
                "updated": true,
            })),
            other => Err(unknown_operation(self.name(), other)),
        }
    }
}

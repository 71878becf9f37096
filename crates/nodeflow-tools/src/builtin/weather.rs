use rand::rngs::StdRng;
use rand::Rng;
use serde_json::{json, Value};

use nodeflow_core::types::ToolFailure;

use super::{arg_str, unknown_operation};
use crate::registry::SimProvider;

const CONDITIONS: &[&str] = &["sunny", "cloudy", "rain", "snow", "windy"];

/// Simulated weather service.
pub struct WeatherProvider;

impl SimProvider for WeatherProvider {
    fn name(&self) -> &str {
        "weather"
    }

    fn operations(&self) -> &[&'static str] {
        &["current", "forecast"]
    }

    fn run(
        &self,
        operation: &str,
        args: &Value,
        rng: &mut StdRng,
    ) -> std::result::Result<Value, ToolFailure> {
        let location = arg_str(args, "location").unwrap_or("San Francisco");
        match operation {
            "current" => Ok(json!({
                "location": location,
                "tempC": rng.gen_range(-5..32),
                "condition": CONDITIONS[rng.gen_range(0..CONDITIONS.len())],
            })),
            "forecast" => {
                let days = args.get("days").and_then(|v| v.as_u64()).unwrap_or(3).min(7);
                let daily: Vec<Value> = (0..days)
                    .map(|d| {
                        json!({
                            "day": d + 1,
                            "highC": rng.gen_range(5..35),
                            "condition": CONDITIONS[rng.gen_range(0..CONDITIONS.len())],
                        })
                    })
                    .collect();
                Ok(json!({ "location": location, "daily": daily }))
            }
            other => Err(unknown_operation(self.name(), other)),
        }
    }
}

use std::time::Duration;

use futures::future::BoxFuture;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use nodeflow_core::traits::ToolSimulator;
use nodeflow_core::types::*;

use crate::presets::PresetCatalog;
use crate::registry::ProviderRegistry;

/// Tool-simulation capability backed by the provider registry and preset catalog.
///
/// Every invocation seeds its own generator from `(seed, tool, operation)`, so
/// identical invocations produce identical outcomes regardless of call order.
pub struct SimulatorHub {
    registry: ProviderRegistry,
    presets: PresetCatalog,
}

impl SimulatorHub {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            registry,
            presets: PresetCatalog,
        }
    }

    pub fn with_builtins() -> Self {
        Self::new(ProviderRegistry::with_builtins())
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }
}

impl Default for SimulatorHub {
    fn default() -> Self {
        Self::with_builtins()
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Per tool/operation stream key. FNV-1a keeps it fixed across toolchains,
/// so a seed reproduces the same data on every build.
fn stream_key(tool_name: &str, operation: &str) -> u64 {
    let tool = tool_name.to_lowercase();
    let mut hash = FNV_OFFSET;
    for part in [tool.as_bytes(), operation.as_bytes()] {
        for &b in part.iter().chain(&[0xff]) {
            hash ^= u64::from(b);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

fn rng_for(invocation: &ToolInvocation) -> StdRng {
    StdRng::seed_from_u64(invocation.seed ^ stream_key(&invocation.tool_name, &invocation.operation))
}

fn run_sync(registry: &ProviderRegistry, invocation: &ToolInvocation) -> ToolOutcome {
    let mut rng = rng_for(invocation);

    match &invocation.error_mode {
        ErrorMode::None => {}
        ErrorMode::Force { kind } => {
            return ToolOutcome::failure(
                kind.clone(),
                format!(
                    "Forced failure for {}.{}",
                    invocation.tool_name, invocation.operation
                ),
            );
        }
        ErrorMode::Random { rate } => {
            let rate = if rate.is_finite() { rate.clamp(0.0, 1.0) } else { 0.0 };
            if rng.gen_bool(rate) {
                return ToolOutcome::failure(
                    "simulated_failure",
                    format!(
                        "Random failure for {}.{} (rate {})",
                        invocation.tool_name, invocation.operation, rate
                    ),
                );
            }
        }
    }

    let Some(provider) = registry.get(&invocation.tool_name) else {
        return ToolOutcome::failure(
            "unknown_tool",
            format!("No simulator registered for '{}'", invocation.tool_name),
        );
    };

    match provider.run(&invocation.operation, &invocation.args, &mut rng) {
        Ok(data) => ToolOutcome::success(data),
        Err(failure) => ToolOutcome::Err {
            ok: false,
            error: failure,
        },
    }
}

impl ToolSimulator for SimulatorHub {
    fn invoke(&self, invocation: ToolInvocation) -> BoxFuture<'_, ToolOutcome> {
        Box::pin(async move {
            if let Some(ms) = invocation.latency_ms.filter(|ms| *ms > 0) {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            let outcome = run_sync(&self.registry, &invocation);
            debug!(
                tool = %invocation.tool_name,
                operation = %invocation.operation,
                seed = invocation.seed,
                ok = outcome.is_ok(),
                "Simulated tool call"
            );
            outcome
        })
    }

    fn preset(&self, tool: Option<&str>, name: &str) -> Option<serde_json::Value> {
        self.presets.lookup(tool, name)
    }

    fn capabilities(&self) -> Vec<String> {
        self.registry.capabilities()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn invocation(tool: &str, op: &str, seed: u64) -> ToolInvocation {
        ToolInvocation {
            tool_name: tool.into(),
            operation: op.into(),
            args: json!({}),
            seed,
            latency_ms: None,
            error_mode: ErrorMode::None,
        }
    }

    #[tokio::test]
    async fn deterministic_per_seed() {
        let hub = SimulatorHub::with_builtins();
        let a = hub.invoke(invocation("calendar", "list_events", 11)).await;
        let b = hub.invoke(invocation("calendar", "list_events", 11)).await;
        assert_eq!(a, b);
        assert!(a.is_ok());
    }

    #[tokio::test]
    async fn forced_failure_uses_kind() {
        let hub = SimulatorHub::with_builtins();
        let mut inv = invocation("calendar", "list_events", 1);
        inv.error_mode = ErrorMode::Force {
            kind: "timeout".into(),
        };
        match hub.invoke(inv).await {
            ToolOutcome::Err { error, .. } => assert_eq!(error.kind, "timeout"),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn random_failure_extremes() {
        let hub = SimulatorHub::with_builtins();
        let mut always = invocation("email", "list_inbox", 2);
        always.error_mode = ErrorMode::Random { rate: 1.0 };
        assert!(!hub.invoke(always).await.is_ok());

        let mut never = invocation("email", "list_inbox", 2);
        never.error_mode = ErrorMode::Random { rate: 0.0 };
        assert!(hub.invoke(never).await.is_ok());
    }

    #[tokio::test]
    async fn nan_rate_never_fails() {
        let hub = SimulatorHub::with_builtins();
        let mut inv = invocation("email", "list_inbox", 2);
        inv.error_mode = ErrorMode::Random { rate: f64::NAN };
        assert!(hub.invoke(inv).await.is_ok());
    }

    #[test]
    fn stream_key_is_pinned() {
        assert_eq!(stream_key("calendar", "list_events"), 0x9a0d_9b30_b5c4_a971);
        assert_eq!(
            stream_key("Calendar", "list_events"),
            stream_key("calendar", "list_events")
        );
        assert_ne!(
            stream_key("calendar", "list_events"),
            stream_key("calendar", "create_event")
        );
    }

    #[tokio::test]
    async fn unknown_tool_and_operation() {
        let hub = SimulatorHub::with_builtins();
        match hub.invoke(invocation("fax", "send", 0)).await {
            ToolOutcome::Err { error, .. } => assert_eq!(error.kind, "unknown_tool"),
            other => panic!("unexpected {:?}", other),
        }
        match hub.invoke(invocation("calendar", "teleport", 0)).await {
            ToolOutcome::Err { error, .. } => assert_eq!(error.kind, "unknown_operation"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn latency_is_applied() {
        let hub = SimulatorHub::with_builtins();
        let mut inv = invocation("weather", "current", 3);
        inv.latency_ms = Some(250);
        let started = tokio::time::Instant::now();
        assert!(hub.invoke(inv).await.is_ok());
        assert!(started.elapsed() >= Duration::from_millis(250));
    }

    #[test]
    fn preset_passthrough() {
        let hub = SimulatorHub::with_builtins();
        assert_eq!(
            hub.preset(Some("calendar"), "list_success").unwrap()["data"][0],
            "item1"
        );
    }
}

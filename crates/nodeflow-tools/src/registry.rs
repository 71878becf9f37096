use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;

use nodeflow_core::types::ToolFailure;

/// A simulated backend (calendar, email, …) serving a fixed set of operations.
pub trait SimProvider: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn operations(&self) -> &[&'static str];

    /// Produce the operation's data. All randomness must come from `rng`.
    fn run(
        &self,
        operation: &str,
        args: &serde_json::Value,
        rng: &mut StdRng,
    ) -> std::result::Result<serde_json::Value, ToolFailure>;
}

/// Registry of simulated tool providers.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn SimProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register a provider under its own name.
    pub fn register(&mut self, provider: impl SimProvider) {
        let name = provider.name().to_string();
        self.providers.insert(name, Arc::new(provider));
    }

    /// Get a provider by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<Arc<dyn SimProvider>> {
        self.providers.get(&name.to_lowercase()).cloned()
    }

    /// List all registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Every `provider.operation` pair, sorted.
    pub fn capabilities(&self) -> Vec<String> {
        let mut caps: Vec<String> = self
            .providers
            .values()
            .flat_map(|p| {
                p.operations()
                    .iter()
                    .map(move |op| format!("{}.{}", p.name(), op))
            })
            .collect();
        caps.sort();
        caps
    }

    /// Create a registry with all built-in providers registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(crate::builtin::calendar::CalendarProvider);
        registry.register(crate::builtin::email::EmailProvider);
        registry.register(crate::builtin::crm::CrmProvider);
        registry.register(crate::builtin::weather::WeatherProvider);
        registry
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

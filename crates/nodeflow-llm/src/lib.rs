pub mod providers;
pub mod retry;
pub mod router;

use nodeflow_core::config::{AppConfig, ModelConfig};
use nodeflow_core::traits::LlmClient;
use nodeflow_core::types::RunMode;

pub use providers::gemini::GeminiClient;
pub use providers::mock::MockLlmClient;
pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;
pub use router::LlmRouter;

/// Create an LLM client based on the provider name.
pub fn create_client(config: &ModelConfig) -> Box<dyn LlmClient> {
    match config.provider.as_str() {
        "gemini" | "google" => Box::new(GeminiClient::new(config.clone())),
        "mock" => Box::new(MockLlmClient::new()),
        // Everything else uses the OpenAI-compatible client
        _ => Box::new(OpenAiClient::new(config.clone())),
    }
}

/// Build the client a run talks to.
///
/// Mock mode always gets the deterministic mock. Live mode wraps the primary
/// model in retries and fallbacks, and registers every configured provider on
/// a router so nodes can pick one per request.
pub fn client_for_run(config: &AppConfig, mode: RunMode) -> Box<dyn LlmClient> {
    if mode == RunMode::Mock {
        return Box::new(MockLlmClient::new());
    }

    let primary = create_client(&config.model);
    let fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)> = config
        .fallback_models
        .iter()
        .map(|fb| (fb.clone(), create_client(fb)))
        .collect();

    let default: Box<dyn LlmClient> = match &config.model.retry {
        Some(retry) => Box::new(RetryingClient::new(primary, fallbacks, retry.clone())),
        None if !fallbacks.is_empty() => Box::new(RetryingClient::new(
            primary,
            fallbacks,
            nodeflow_core::config::RetryConfig {
                max_retries: 0,
                ..Default::default()
            },
        )),
        None => primary,
    };

    let mut router = LlmRouter::new(default);
    for fb in &config.fallback_models {
        if fb.provider != config.model.provider {
            router = router.with_provider(&fb.provider, create_client(fb));
        }
    }
    router = router.with_provider("mock", Box::new(MockLlmClient::new()));
    Box::new(router)
}

use std::collections::HashMap;

use futures::future::BoxFuture;
use tracing::debug;

use nodeflow_core::error::{FlowError, Result};
use nodeflow_core::traits::LlmClient;
use nodeflow_core::types::*;

/// Dispatches each request to the client registered for `request.provider`,
/// or to the default client when the request names none.
pub struct LlmRouter {
    default: Box<dyn LlmClient>,
    clients: HashMap<String, Box<dyn LlmClient>>,
}

impl LlmRouter {
    pub fn new(default: Box<dyn LlmClient>) -> Self {
        Self {
            default,
            clients: HashMap::new(),
        }
    }

    /// Register a client under a provider name (case-insensitive).
    pub fn with_provider(mut self, name: &str, client: Box<dyn LlmClient>) -> Self {
        self.clients.insert(name.to_lowercase(), client);
        self
    }

    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.keys().cloned().collect();
        names.sort();
        names
    }
}

impl LlmClient for LlmRouter {
    fn name(&self) -> &str {
        self.default.name()
    }

    fn complete(&self, request: LlmRequest) -> BoxFuture<'_, Result<LlmResponse>> {
        Box::pin(async move {
            let Some(provider) = request.provider.as_deref().map(str::to_lowercase) else {
                return self.default.complete(request).await;
            };
            if provider == self.default.name().to_lowercase() {
                return self.default.complete(request).await;
            }
            match self.clients.get(&provider) {
                Some(client) => {
                    debug!(provider = %provider, "Routing LLM request");
                    client.complete(request).await
                }
                None => Err(FlowError::UnsupportedProvider(provider)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockLlmClient;

    struct Named(&'static str);

    impl LlmClient for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn complete(&self, _request: LlmRequest) -> BoxFuture<'_, Result<LlmResponse>> {
            Box::pin(async move {
                Ok(LlmResponse {
                    text: self.0.to_string(),
                    raw: serde_json::Value::Null,
                    provider: self.0.to_string(),
                    model: None,
                })
            })
        }
    }

    #[tokio::test]
    async fn routes_by_provider() {
        let router = LlmRouter::new(Box::new(MockLlmClient::new()))
            .with_provider("gemini", Box::new(Named("gemini")));

        let mut req = LlmRequest::new("hi");
        req.provider = Some("Gemini".into());
        assert_eq!(router.complete(req).await.unwrap().text, "gemini");

        let resp = router.complete(LlmRequest::new("hi")).await.unwrap();
        assert_eq!(resp.provider, "mock");
    }

    #[tokio::test]
    async fn unknown_provider_is_typed_error() {
        let router = LlmRouter::new(Box::new(MockLlmClient::new()));
        let mut req = LlmRequest::new("hi");
        req.provider = Some("cohere".into());
        let err = router.complete(req).await.unwrap_err();
        assert!(matches!(err, FlowError::UnsupportedProvider(p) if p == "cohere"));
    }
}

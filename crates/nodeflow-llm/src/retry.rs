use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{info, warn};

use nodeflow_core::config::{ModelConfig, RetryConfig};
use nodeflow_core::error::{FlowError, Result};
use nodeflow_core::traits::LlmClient;
use nodeflow_core::types::*;

/// An LLM client that retries failed requests and falls back to alternative providers.
pub struct RetryingClient {
    primary: Box<dyn LlmClient>,
    fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(
        primary: Box<dyn LlmClient>,
        fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            primary,
            fallbacks,
            retry_config,
        }
    }
}

fn is_retryable(e: &FlowError) -> bool {
    match e {
        FlowError::LlmRequest(msg) => {
            msg.contains("429")
                || msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("timeout")
                || msg.contains("connection")
        }
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = (config.initial_backoff_ms * 2u64.pow(attempt)).min(config.max_backoff_ms);
    // Jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl LlmClient for RetryingClient {
    fn name(&self) -> &str {
        self.primary.name()
    }

    fn complete(&self, request: LlmRequest) -> BoxFuture<'_, Result<LlmResponse>> {
        Box::pin(async move {
            let max_retries = self.retry_config.max_retries;

            let mut last_err = None;
            for attempt in 0..=max_retries {
                match self.primary.complete(request.clone()).await {
                    Ok(response) => return Ok(response),
                    Err(e) => {
                        if is_retryable(&e) && attempt < max_retries {
                            let backoff = calculate_backoff(attempt, &self.retry_config);
                            warn!(
                                attempt = attempt + 1,
                                max_retries,
                                backoff_ms = backoff.as_millis() as u64,
                                error = %e,
                                "Retrying LLM request"
                            );
                            tokio::time::sleep(backoff).await;
                            last_err = Some(e);
                            continue;
                        }
                        last_err = Some(e);
                        break;
                    }
                }
            }

            if !self.fallbacks.is_empty() {
                info!("Primary LLM exhausted, trying fallback models");
            }
            for (fb_config, fb_client) in &self.fallbacks {
                // The fallback's own model replaces whatever the caller pinned.
                let mut fb_request = request.clone();
                fb_request.model = Some(fb_config.model_id.clone());
                match fb_client.complete(fb_request).await {
                    Ok(response) => {
                        info!(
                            model = %fb_config.model_id,
                            provider = %fb_config.provider,
                            "Fell back to alternative model"
                        );
                        return Ok(response);
                    }
                    Err(e) => {
                        warn!(
                            model = %fb_config.model_id,
                            error = %e,
                            "Fallback model also failed"
                        );
                        continue;
                    }
                }
            }

            Err(last_err.unwrap_or_else(|| FlowError::LlmRequest("All providers failed".into())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Flaky {
        calls: Arc<AtomicUsize>,
        fail_times: usize,
        error: &'static str,
    }

    impl LlmClient for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn complete(&self, _request: LlmRequest) -> BoxFuture<'_, Result<LlmResponse>> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if n < self.fail_times {
                    return Err(FlowError::LlmRequest(self.error.to_string()));
                }
                Ok(LlmResponse {
                    text: "ok".into(),
                    raw: serde_json::Value::Null,
                    provider: "flaky".into(),
                    model: None,
                })
            })
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&FlowError::LlmRequest("HTTP 429: slow down".into())));
        assert!(is_retryable(&FlowError::LlmRequest("connection reset".into())));
        assert!(!is_retryable(&FlowError::LlmRequest("HTTP 401: bad key".into())));
        assert!(!is_retryable(&FlowError::LlmParse("garbage".into())));
    }

    #[test]
    fn test_backoff_capped() {
        let config = RetryConfig {
            max_retries: 10,
            initial_backoff_ms: 1000,
            max_backoff_ms: 5000,
        };
        let d = calculate_backoff(8, &config);
        assert!(d.as_millis() <= 6000);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = RetryingClient::new(
            Box::new(Flaky {
                calls: calls.clone(),
                fail_times: 2,
                error: "HTTP 503: unavailable",
            }),
            vec![],
            fast_retry(),
        );
        let resp = client.complete(LlmRequest::new("x")).await.unwrap();
        assert_eq!(resp.text, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn auth_error_goes_to_fallback() {
        let primary_calls = Arc::new(AtomicUsize::new(0));
        let fb_calls = Arc::new(AtomicUsize::new(0));
        let client = RetryingClient::new(
            Box::new(Flaky {
                calls: primary_calls.clone(),
                fail_times: usize::MAX,
                error: "HTTP 401: bad key",
            }),
            vec![(
                ModelConfig::default(),
                Box::new(Flaky {
                    calls: fb_calls.clone(),
                    fail_times: 0,
                    error: "",
                }) as Box<dyn LlmClient>,
            )],
            fast_retry(),
        );
        let resp = client.complete(LlmRequest::new("x")).await.unwrap();
        assert_eq!(resp.text, "ok");
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fb_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_returns_last_error() {
        let client = RetryingClient::new(
            Box::new(Flaky {
                calls: Arc::new(AtomicUsize::new(0)),
                fail_times: usize::MAX,
                error: "HTTP 500: boom",
            }),
            vec![],
            fast_retry(),
        );
        let err = client.complete(LlmRequest::new("x")).await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}

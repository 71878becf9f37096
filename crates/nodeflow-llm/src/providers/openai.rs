use futures::future::BoxFuture;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use nodeflow_core::config::ModelConfig;
use nodeflow_core::error::{FlowError, Result};
use nodeflow_core::traits::LlmClient;
use nodeflow_core::types::*;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible client. Works with OpenAI, Ollama, vLLM, Groq, OpenRouter, etc.
pub struct OpenAiClient {
    http: Client,
    config: ModelConfig,
}

impl OpenAiClient {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct OaiMessage {
    role: &'static str,
    content: String,
}

fn build_body(config: &ModelConfig, request: &LlmRequest) -> ChatRequest {
    let mut messages = Vec::new();
    if let Some(system) = &request.system {
        messages.push(OaiMessage {
            role: "system",
            content: system.clone(),
        });
    }
    messages.push(OaiMessage {
        role: "user",
        content: request.prompt.clone(),
    });

    let temperature = request.temperature.unwrap_or(config.temperature);

    ChatRequest {
        model: request
            .model
            .clone()
            .unwrap_or_else(|| config.model_id.clone()),
        messages,
        max_tokens: config.max_tokens,
        temperature: if temperature > 0.0 { Some(temperature) } else { None },
        seed: request.seed,
        response_format: match request.response_format {
            Some(ResponseFormat::Json) => Some(serde_json::json!({"type": "json_object"})),
            _ => None,
        },
    }
}

/// Pull the assistant text out of a chat-completions payload.
pub(crate) fn extract_text(raw: &serde_json::Value) -> Option<String> {
    raw.pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

impl LlmClient for OpenAiClient {
    fn name(&self) -> &str {
        &self.config.provider
    }

    fn complete(&self, request: LlmRequest) -> BoxFuture<'_, Result<LlmResponse>> {
        Box::pin(async move {
            let base_url = self.config.base_url.as_deref().unwrap_or(OPENAI_API_URL);
            let body = build_body(&self.config, &request);
            let model = body.model.clone();

            let mut req = self.http.post(base_url).json(&body);

            if let Some(api_key) = &self.config.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            let response = req
                .send()
                .await
                .map_err(|e| FlowError::LlmRequest(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(FlowError::LlmRequest(format!("HTTP {}: {}", status, body)));
            }

            let raw: serde_json::Value = response
                .json()
                .await
                .map_err(|e| FlowError::LlmParse(e.to_string()))?;

            let text = extract_text(&raw)
                .ok_or_else(|| FlowError::LlmParse("response has no choices[0].message.content".into()))?;

            debug!(model = %model, chars = text.len(), "OpenAI-compatible completion received");

            Ok(LlmResponse {
                text,
                raw,
                provider: self.config.provider.clone(),
                model: Some(model),
            })
        })
    }
}

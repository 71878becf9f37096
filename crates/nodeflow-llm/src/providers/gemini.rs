use futures::future::BoxFuture;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use nodeflow_core::config::ModelConfig;
use nodeflow_core::error::{FlowError, Result};
use nodeflow_core::traits::LlmClient;
use nodeflow_core::types::*;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Google Gemini native API client.
pub struct GeminiClient {
    http: Client,
    config: ModelConfig,
}

impl GeminiClient {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

// ── Request types ────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

fn build_body(config: &ModelConfig, request: &LlmRequest) -> GeminiRequest {
    GeminiRequest {
        contents: vec![GeminiContent {
            role: Some("user"),
            parts: vec![GeminiPart {
                text: request.prompt.clone(),
            }],
        }],
        system_instruction: request.system.as_ref().map(|s| GeminiContent {
            role: None,
            parts: vec![GeminiPart { text: s.clone() }],
        }),
        generation_config: GenerationConfig {
            temperature: request.temperature.unwrap_or(config.temperature),
            max_output_tokens: config.max_tokens,
            seed: request.seed,
            response_mime_type: match request.response_format {
                Some(ResponseFormat::Json) => Some("application/json"),
                _ => None,
            },
        },
    }
}

pub(crate) fn extract_text(raw: &serde_json::Value) -> Option<String> {
    raw.pointer("/candidates/0/content/parts/0/text")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

impl LlmClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn complete(&self, request: LlmRequest) -> BoxFuture<'_, Result<LlmResponse>> {
        Box::pin(async move {
            let api_key = self
                .config
                .api_key
                .as_deref()
                .ok_or_else(|| FlowError::LlmRequest("Gemini API key not configured".into()))?;
            let model = request
                .model
                .clone()
                .unwrap_or_else(|| self.config.model_id.clone());
            let base = self.config.base_url.as_deref().unwrap_or(GEMINI_API_BASE);
            let url = format!("{}/{}:generateContent?key={}", base, model, api_key);

            let body = build_body(&self.config, &request);
            let response = self
                .http
                .post(&url)
                .json(&body)
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

            let text = extract_text(&raw).ok_or_else(|| {
                FlowError::LlmParse("response has no candidates[0].content.parts[0].text".into())
            })?;

            debug!(model = %model, chars = text.len(), "Gemini completion received");

            Ok(LlmResponse {
                text,
                raw,
                provider: "gemini".to_string(),
                model: Some(model),
            })
        })
    }
}

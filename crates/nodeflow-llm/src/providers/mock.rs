use futures::future::BoxFuture;
use serde_json::json;

use nodeflow_core::error::Result;
use nodeflow_core::traits::LlmClient;
use nodeflow_core::types::*;

/// Deterministic offline client used in mock mode.
///
/// Replies depend only on the prompt, system text and seed, so two runs of
/// the same graph produce identical outputs.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient;

impl MockLlmClient {
    pub fn new() -> Self {
        Self
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a over prompt, system text and seed. Stable across toolchains.
fn fingerprint(request: &LlmRequest) -> u64 {
    let seed = request.seed.map(u64::to_le_bytes);
    let parts: [&[u8]; 3] = [
        request.prompt.as_bytes(),
        request.system.as_deref().unwrap_or_default().as_bytes(),
        seed.as_ref().map_or(&[][..], |s| &s[..]),
    ];
    let mut hash = FNV_OFFSET;
    for part in parts {
        for &b in part.iter().chain(&[0xff]) {
            hash ^= u64::from(b);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

fn reply_for(request: &LlmRequest) -> String {
    let lower = request.prompt.to_lowercase();
    if lower.contains("respond true or false only") {
        return "FALSE".to_string();
    }
    if request.response_format == Some(ResponseFormat::Json) {
        return json!({ "mock": true, "ref": format!("{:08x}", fingerprint(request) as u32) })
            .to_string();
    }
    let head: String = request
        .prompt
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or_default()
        .chars()
        .take(80)
        .collect();
    format!(
        "[mock {:08x}] {}",
        fingerprint(request) as u32,
        head.trim()
    )
}

impl LlmClient for MockLlmClient {
    fn name(&self) -> &str {
        "mock"
    }

    fn complete(&self, request: LlmRequest) -> BoxFuture<'_, Result<LlmResponse>> {
        Box::pin(async move {
            let text = reply_for(&request);
            let model = request.model.clone().unwrap_or_else(|| "mock".to_string());
            Ok(LlmResponse {
                raw: json!({
                    "choices": [{ "message": { "role": "assistant", "content": text } }],
                    "model": model,
                }),
                text,
                provider: "mock".to_string(),
                model: Some(model),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_request_same_reply() {
        let client = MockLlmClient::new();
        let mut req = LlmRequest::new("Plan the week.");
        req.seed = Some(7);
        let a = client.complete(req.clone()).await.unwrap();
        let b = client.complete(req).await.unwrap();
        assert_eq!(a.text, b.text);
        assert!(a.text.contains("Plan the week."));
        assert_eq!(a.provider, "mock");
    }

    #[tokio::test]
    async fn reply_tag_is_pinned() {
        let client = MockLlmClient::new();
        let mut req = LlmRequest::new("Plan the week.");
        req.seed = Some(7);
        let resp = client.complete(req).await.unwrap();
        assert_eq!(resp.text, "[mock 2b892a7b] Plan the week.");
    }

    #[tokio::test]
    async fn boolean_contract_answers_false() {
        let client = MockLlmClient::new();
        let resp = client
            .complete(LlmRequest::new("Is it raining? Respond TRUE or FALSE only."))
            .await
            .unwrap();
        assert_eq!(resp.text, "FALSE");
    }

    #[tokio::test]
    async fn json_format_is_parseable() {
        let client = MockLlmClient::new();
        let resp = client
            .complete(LlmRequest::new("give json").with_format(ResponseFormat::Json))
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&resp.text).unwrap();
        assert_eq!(parsed["mock"], true);
    }
}

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::llm::{
    error_body, ChatBackend, ChatMessage, Completion, ProviderEndpoint, Role, WireFormat,
    MAX_TOKENS, TEMPERATURE,
};
use crate::error::ServiceError;

/// Hosted inference endpoints that take a single prompt string at
/// `{base}/{model}`.
pub struct HuggingFaceBackend {
    client: Client,
}

impl HuggingFaceBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Flatten a conversation with `<|role|>` markers and leave an open
/// assistant turn for the model to complete.
pub fn render_prompt(messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    for m in messages {
        let marker = match m.role {
            Role::System => "<|system|>",
            Role::User => "<|user|>",
            Role::Assistant => "<|assistant|>",
        };
        prompt.push_str(marker);
        prompt.push('\n');
        prompt.push_str(&m.content);
        prompt.push('\n');
    }
    prompt.push_str("<|assistant|>\n");
    prompt
}

#[async_trait]
impl ChatBackend for HuggingFaceBackend {
    fn wire_format(&self) -> WireFormat {
        WireFormat::HuggingFace
    }

    async fn complete(
        &self,
        endpoint: &ProviderEndpoint,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<Completion, ServiceError> {
        let api_key = endpoint
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                ServiceError::Generation(format!("{} API key not configured", endpoint.provider))
            })?;

        let body = json!({
            "inputs": render_prompt(messages),
            "parameters": {
                "max_new_tokens": MAX_TOKENS,
                "temperature": TEMPERATURE,
                "return_full_text": false,
            }
        });

        let resp = self
            .client
            .post(endpoint.url(model))
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if resp.status() != reqwest::StatusCode::OK {
            let status = resp.status();
            let body = error_body(resp).await;
            tracing::warn!("{} returned {} for model {}", endpoint.provider, status, model);
            return Err(ServiceError::Upstream {
                provider: endpoint.provider.clone(),
                body,
            });
        }

        let raw: serde_json::Value = resp.json().await?;

        // Expected shape: [{"generated_text": "..."}]
        let first = raw
            .as_array()
            .and_then(|items| items.first())
            .filter(|item| item.is_object())
            .ok_or_else(|| ServiceError::InvalidUpstreamFormat(endpoint.provider.clone()))?;

        let content = first
            .get("generated_text")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(Completion {
            content,
            model: model.to_string(),
            raw,
        })
    }
}

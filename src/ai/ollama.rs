use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::llm::{error_body, ChatBackend, ChatMessage, Completion, ProviderEndpoint, Role, WireFormat};
use crate::error::ServiceError;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

/// A local inference server exposing `{base}/generate`.
pub struct OllamaBackend {
    client: Client,
}

impl OllamaBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Flatten a conversation into `Label: content` paragraphs ending with an
/// open `Assistant: ` turn.
pub fn render_prompt(messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    for m in messages {
        let label = match m.role {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        prompt.push_str(&format!("{}: {}\n\n", label, m.content));
    }
    prompt.push_str("Assistant: ");
    prompt
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    fn wire_format(&self) -> WireFormat {
        WireFormat::Ollama
    }

    async fn complete(
        &self,
        endpoint: &ProviderEndpoint,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<Completion, ServiceError> {
        let body = GenerateRequest {
            model,
            prompt: render_prompt(messages),
            stream: false,
        };

        let resp = self
            .client
            .post(endpoint.url("generate"))
            .json(&body)
            .send()
            .await?;

        if resp.status() != reqwest::StatusCode::OK {
            let body = error_body(resp).await;
            return Err(ServiceError::Upstream {
                provider: endpoint.provider.clone(),
                body,
            });
        }

        let raw: serde_json::Value = resp.json().await?;
        // A missing `response` field is an empty answer, not a format error.
        let content = raw
            .get("response")
            .and_then(|r| r.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(Completion {
            content,
            model: model.to_string(),
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::spawn_upstream;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    fn endpoint(base_url: String) -> ProviderEndpoint {
        ProviderEndpoint {
            provider: "ollama".into(),
            base_url,
            api_key: None,
        }
    }

    #[test]
    fn prompt_uses_labels_and_trailing_cue() {
        let prompt = render_prompt(&[ChatMessage::system("S"), ChatMessage::user("U")]);
        assert_eq!(prompt, "System: S\n\nUser: U\n\nAssistant: ");
    }

    #[tokio::test]
    async fn posts_non_streaming_generate() {
        let upstream = spawn_upstream(Router::new().route(
            "/api/generate",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["model"], "llama3");
                assert_eq!(body["stream"], false);
                assert_eq!(body["prompt"], "User: hi\n\nAssistant: ");
                Json(json!({"model": "llama3", "response": "hello", "done": true}))
            }),
        ))
        .await;

        let completion = OllamaBackend::new(Client::new())
            .complete(&endpoint(upstream.url("/api")), "llama3", &[ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(completion.content, "hello");
        assert_eq!(completion.raw["done"], true);
    }

    #[tokio::test]
    async fn missing_response_field_is_empty_content() {
        let upstream = spawn_upstream(Router::new().route(
            "/generate",
            post(|| async { Json(json!({"done": true})) }),
        ))
        .await;

        let completion = OllamaBackend::new(Client::new())
            .complete(&endpoint(upstream.url("")), "llama3", &[ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(completion.content, "");
    }

    #[tokio::test]
    async fn error_status_is_upstream_error() {
        let upstream = spawn_upstream(Router::new().route(
            "/generate",
            post(|| async { (StatusCode::NOT_FOUND, "model 'llama3' not found") }),
        ))
        .await;

        let err = OllamaBackend::new(Client::new())
            .complete(&endpoint(upstream.url("")), "llama3", &[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Upstream { .. }));
    }
}

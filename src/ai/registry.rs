use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::Client;
use serde::Serialize;

use super::huggingface::HuggingFaceBackend;
use super::llm::{ChatBackend, ChatMessage, Completion, ProviderEndpoint, Role, WireFormat};
use super::ollama::OllamaBackend;
use super::openai::OpenAiBackend;
use crate::config::AppConfig;
use crate::error::ServiceError;

/// Static description of one upstream provider.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    pub name: String,
    pub base_url: String,
    pub format: WireFormat,
    /// (alias, canonical model id) in catalog order
    pub models: Vec<(String, String)>,
    pub api_key: Option<String>,
}

impl ProviderDescriptor {
    /// Canonical ids are accepted as-is; anything else must be an alias.
    pub fn resolve_model(&self, model: &str) -> Option<&str> {
        if let Some((_, id)) = self.models.iter().find(|(_, id)| id == model) {
            return Some(id.as_str());
        }
        self.models
            .iter()
            .find(|(alias, _)| alias == model)
            .map(|(_, id)| id.as_str())
    }

    pub fn canonical_models(&self) -> Vec<String> {
        self.models.iter().map(|(_, id)| id.clone()).collect()
    }

    fn endpoint(&self) -> ProviderEndpoint {
        ProviderEndpoint {
            provider: self.name.clone(),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub provider: String,
    pub model: String,
    pub api_format: WireFormat,
}

struct RegisteredProvider {
    descriptor: ProviderDescriptor,
    backend: Arc<dyn ChatBackend>,
}

/// Catalog of providers, each bound to the backend for its wire format
/// when the registry is built.
pub struct ProviderRegistry {
    providers: BTreeMap<String, RegisteredProvider>,
}

impl ProviderRegistry {
    pub fn new(descriptors: Vec<ProviderDescriptor>, client: Client) -> Self {
        let mut registry = Self::empty();
        for descriptor in descriptors {
            let backend: Arc<dyn ChatBackend> = match descriptor.format {
                WireFormat::OpenAi => Arc::new(OpenAiBackend::new(client.clone())),
                WireFormat::HuggingFace => Arc::new(HuggingFaceBackend::new(client.clone())),
                WireFormat::Ollama => Arc::new(OllamaBackend::new(client.clone())),
            };
            registry.register(descriptor, backend);
        }
        registry
    }

    pub fn empty() -> Self {
        Self {
            providers: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, descriptor: ProviderDescriptor, backend: Arc<dyn ChatBackend>) {
        tracing::debug!(
            "Registered provider '{}' ({}, {} models)",
            descriptor.name,
            backend.wire_format().as_str(),
            descriptor.models.len()
        );
        self.providers.insert(
            descriptor.name.clone(),
            RegisteredProvider { descriptor, backend },
        );
    }

    /// OpenRouter, Hugging Face and a local Ollama server.
    pub fn builtin_catalog(config: &AppConfig) -> Vec<ProviderDescriptor> {
        let models = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(alias, id)| (alias.to_string(), id.to_string()))
                .collect::<Vec<_>>()
        };

        vec![
            ProviderDescriptor {
                name: "openrouter".into(),
                base_url: "https://openrouter.ai/api/v1".into(),
                format: WireFormat::OpenAi,
                models: models(&[
                    ("mistral", "mistralai/mistral-7b-instruct:free"),
                    ("mixtral", "mistralai/mixtral-8x7b:free"),
                    ("gpt4", "openai/gpt-4:free"),
                    ("claude", "anthropic/claude-3-sonnet:free"),
                    ("deepseek", "deepseek/deepseek-r1:free"),
                ]),
                api_key: config.api_key_for("openrouter"),
            },
            ProviderDescriptor {
                name: "huggingface".into(),
                base_url: "https://api-inference.huggingface.co/models".into(),
                format: WireFormat::HuggingFace,
                models: models(&[
                    ("mistral", "mistralai/Mistral-7B-Instruct-v0.2"),
                    ("llama2", "meta-llama/Llama-2-7b-chat-hf"),
                    ("codellama", "codellama/CodeLlama-7b-Instruct-hf"),
                ]),
                api_key: config.api_key_for("huggingface"),
            },
            ProviderDescriptor {
                name: "ollama".into(),
                base_url: format!("{}/api", config.ollama_base_url.trim_end_matches('/')),
                format: WireFormat::Ollama,
                models: models(&[
                    ("llama3", "llama3"),
                    ("mistral", "mistral"),
                    ("codellama", "codellama"),
                ]),
                api_key: None,
            },
        ]
    }

    /// Canonical model ids per provider. An unknown provider yields an
    /// empty map rather than an error.
    pub fn list_models(&self, provider: Option<&str>) -> BTreeMap<String, Vec<String>> {
        match provider {
            Some(name) => self
                .providers
                .get(name)
                .map(|p| BTreeMap::from([(name.to_string(), p.descriptor.canonical_models())]))
                .unwrap_or_default(),
            None => self
                .providers
                .iter()
                .map(|(name, p)| (name.clone(), p.descriptor.canonical_models()))
                .collect(),
        }
    }

    pub fn resolve_model(&self, provider: &str, model: &str) -> Result<String, ServiceError> {
        let entry = self.entry(provider)?;
        entry
            .descriptor
            .resolve_model(model)
            .map(str::to_string)
            .ok_or_else(|| ServiceError::UnknownModel {
                provider: provider.to_string(),
                model: model.to_string(),
            })
    }

    /// Aliases are expanded; an unrecognized model is reported as given.
    pub fn model_info(&self, provider: &str, model: &str) -> Option<ModelInfo> {
        let entry = self.providers.get(provider)?;
        let model = entry.descriptor.resolve_model(model).unwrap_or(model);
        Some(ModelInfo {
            provider: provider.to_string(),
            model: model.to_string(),
            api_format: entry.descriptor.format,
        })
    }

    /// Resolve the target, optionally prepend a system prompt, and dispatch
    /// through the provider's backend.
    pub async fn generate(
        &self,
        provider: &str,
        model: &str,
        mut messages: Vec<ChatMessage>,
        system_prompt: Option<&str>,
    ) -> Result<Completion, ServiceError> {
        let entry = self.entry(provider)?;
        let model = self.resolve_model(provider, model)?;

        if let Some(prompt) = system_prompt {
            if !messages.is_empty() && messages[0].role != Role::System {
                messages.insert(0, ChatMessage::system(prompt));
            }
        }

        tracing::debug!(
            "Dispatching {} message(s) to {}/{}",
            messages.len(),
            provider,
            model
        );

        let endpoint = entry.descriptor.endpoint();
        match entry.backend.complete(&endpoint, &model, &messages).await {
            Ok(completion) => Ok(completion),
            Err(e) => {
                tracing::warn!("Generation via {}/{} failed: {}", provider, model, e);
                Err(e)
            }
        }
    }

    fn entry(&self, provider: &str) -> Result<&RegisteredProvider, ServiceError> {
        self.providers
            .get(provider)
            .ok_or_else(|| ServiceError::UnknownProvider(provider.to_string()))
    }
}

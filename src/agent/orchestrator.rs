use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use super::context::build_messages;
use super::ledger::ConversationLedger;
use super::prompts::SystemPrompts;
use crate::ai::llm::Role;
use crate::ai::registry::ProviderRegistry;
use crate::auth::IdentityStore;
use crate::db::models::AuditEntry;
use crate::error::ServiceError;

/// One generation request as received from a client. Optional fields fall
/// back to the orchestrator's defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub prompt: String,
    pub workspace: Option<String>,
    pub model: Option<String>,
    pub provider: Option<String>,
    #[serde(rename = "system_prompt")]
    pub system_prompt_key: Option<String>,
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOutcome {
    pub content: String,
    pub conversation_id: String,
}

/// Drives a generation request through authorization, quota, context
/// assembly, dispatch and bookkeeping. The first failing step ends it.
pub struct Orchestrator {
    identity: Arc<IdentityStore>,
    ledger: Arc<ConversationLedger>,
    registry: Arc<ProviderRegistry>,
    prompts: SystemPrompts,
    default_provider: String,
    default_model: String,
}

impl Orchestrator {
    pub fn new(
        identity: Arc<IdentityStore>,
        ledger: Arc<ConversationLedger>,
        registry: Arc<ProviderRegistry>,
        prompts: SystemPrompts,
        default_provider: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            ledger,
            registry,
            prompts,
            default_provider: default_provider.into(),
            default_model: default_model.into(),
        }
    }

    pub async fn generate(&self, request: GenerateRequest) -> Result<GenerateOutcome, ServiceError> {
        let username = request.username.trim();
        let prompt = request.prompt.trim();
        let workspace = request.workspace.as_deref().map(str::trim).filter(|w| !w.is_empty());

        let conversation_id = match request.conversation_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("{}-{}", username, Uuid::new_v4()),
        };

        // ── Gatekeeping ────────────────────────────────────────────
        if !self.identity.is_authorized(username).await {
            return Err(ServiceError::Unauthorized);
        }
        if prompt.is_empty() {
            return Err(ServiceError::EmptyPrompt);
        }
        // Counted from here on, even if generation fails below.
        let usage = self.identity.record_request(username).await?;
        tracing::debug!(
            "'{}' request {}/{} today",
            username,
            usage.daily_used,
            usage.daily_limit
        );

        // ── Context ────────────────────────────────────────────────
        let history = self.ledger.get_conversation(username, &conversation_id).await;
        let system_prompt = self.prompts.get(request.system_prompt_key.as_deref());
        let messages = build_messages(system_prompt, workspace, &history, prompt);

        // ── Dispatch ───────────────────────────────────────────────
        let provider = request.provider.as_deref().unwrap_or(&self.default_provider);
        let model = request.model.as_deref().unwrap_or(&self.default_model);

        let completion = self
            .registry
            .generate(provider, model, messages, None)
            .await
            .map_err(|e| match e {
                ServiceError::Generation(_) => e,
                other if other.is_dispatch_failure() => ServiceError::Generation(other.to_string()),
                other => other,
            })?;

        // ── Bookkeeping ────────────────────────────────────────────
        self.ledger
            .log_request(AuditEntry::new(
                username,
                &completion.model,
                prompt,
                &completion.content,
                workspace.is_some(),
                request.files,
            ))
            .await?;
        self.ledger
            .append_messages(
                username,
                &conversation_id,
                &[(Role::User, prompt), (Role::Assistant, completion.content.as_str())],
            )
            .await?;

        tracing::info!(
            "Generated reply for '{}' via {}/{} in {}",
            username,
            provider,
            completion.model,
            conversation_id
        );

        Ok(GenerateOutcome {
            content: completion.content,
            conversation_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::llm::{ChatBackend, ChatMessage, WireFormat};
    use crate::ai::registry::ProviderDescriptor;
    use crate::ai::testing::RecordingBackend;
    use crate::auth::roles::{RoleDefinition, RoleSet};
    use std::collections::BTreeMap;

    struct Fixture {
        _dir: tempfile::TempDir,
        identity: Arc<IdentityStore>,
        ledger: Arc<ConversationLedger>,
        backend: Arc<RecordingBackend>,
        orchestrator: Orchestrator,
    }

    fn roles() -> RoleSet {
        let role = |limit| RoleDefinition {
            can_manage_users: false,
            can_view_logs: false,
            can_use_all_models: false,
            can_upload_files: false,
            can_modify_workspace: false,
            daily_limit: limit,
        };
        RoleSet::new(BTreeMap::from([
            ("Admin".to_string(), role(1000)),
            ("User".to_string(), role(100)),
            ("Trial".to_string(), role(1)),
        ]))
    }

    async fn fixture(backend: RecordingBackend) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let identity = Arc::new(
            IdentityStore::open(dir.path().join("users.json"), roles(), &["root".to_string()])
                .await
                .unwrap(),
        );
        let ledger = Arc::new(
            ConversationLedger::open(dir.path().join("history.json"), dir.path().join("logs.json"))
                .await
                .unwrap(),
        );

        let backend = Arc::new(backend);
        let mut registry = ProviderRegistry::empty();
        registry.register(
            ProviderDescriptor {
                name: "stub".into(),
                base_url: "http://unused".into(),
                format: WireFormat::OpenAi,
                models: vec![("small".into(), "stub/small-1".into())],
                api_key: None,
            },
            backend.clone() as Arc<dyn ChatBackend>,
        );

        let orchestrator = Orchestrator::new(
            identity.clone(),
            ledger.clone(),
            Arc::new(registry),
            SystemPrompts::builtin(),
            "stub",
            "small",
        );

        Fixture {
            _dir: dir,
            identity,
            ledger,
            backend,
            orchestrator,
        }
    }

    fn request(username: &str, prompt: &str) -> GenerateRequest {
        GenerateRequest {
            username: username.into(),
            prompt: prompt.into(),
            ..GenerateRequest::default()
        }
    }

    #[tokio::test]
    async fn first_prompt_starts_a_conversation() {
        let fx = fixture(RecordingBackend::replying("Hi there!")).await;
        fx.identity.add_user("alice", "User").await.unwrap();

        let outcome = fx.orchestrator.generate(request("alice", "Hello")).await.unwrap();
        assert_eq!(outcome.content, "Hi there!");
        assert!(outcome.conversation_id.starts_with("alice-"));

        let conversation = fx.ledger.get_conversation("alice", &outcome.conversation_id).await;
        assert_eq!(conversation.len(), 2);
        assert_eq!((conversation[0].role, conversation[0].content.as_str()), (Role::User, "Hello"));
        assert_eq!(
            (conversation[1].role, conversation[1].content.as_str()),
            (Role::Assistant, "Hi there!")
        );

        let logs = fx.ledger.get_logs(Some("alice"), 10, 0).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].model, "stub/small-1");
        assert!(!logs[0].context_used);

        assert_eq!(fx.identity.get_user("alice").await.unwrap().daily_used, 1);
    }

    #[tokio::test]
    async fn follow_up_replays_history_and_workspace() {
        let fx = fixture(RecordingBackend::replying("ok")).await;
        fx.identity.add_user("alice", "User").await.unwrap();

        let first = fx.orchestrator.generate(request("alice", "one")).await.unwrap();
        let second = GenerateRequest {
            conversation_id: Some(first.conversation_id.clone()),
            workspace: Some("Workspace.Part".into()),
            system_prompt_key: Some("scripting".into()),
            files: vec!["f-1".into()],
            ..request("alice", "two")
        };
        let outcome = fx.orchestrator.generate(second).await.unwrap();
        assert_eq!(outcome.conversation_id, first.conversation_id);

        let calls = fx.backend.calls();
        let sent = &calls[1].messages;
        assert_eq!(sent.len(), 4);
        assert!(sent[0].content.contains("Lua scripting expert"));
        assert!(sent[0].content.ends_with("\n\nWorkspace Context:\nWorkspace.Part"));
        assert_eq!(sent[1], ChatMessage::user("one"));
        assert_eq!(sent[2], ChatMessage::new(Role::Assistant, "ok"));
        assert_eq!(sent[3], ChatMessage::user("two"));

        let latest = &fx.ledger.get_logs(None, 1, 0).await[0];
        assert!(latest.context_used);
        assert_eq!(latest.files_used, vec!["f-1".to_string()]);
    }

    #[tokio::test]
    async fn gatekeeping_failures_stop_before_dispatch() {
        let fx = fixture(RecordingBackend::replying("ok")).await;
        fx.identity.add_user("tina", "Trial").await.unwrap();

        let err = fx.orchestrator.generate(request("mallory", "hi")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized));

        let err = fx.orchestrator.generate(request("tina", "   ")).await.unwrap_err();
        assert!(matches!(err, ServiceError::EmptyPrompt));
        assert_eq!(fx.identity.get_user("tina").await.unwrap().daily_used, 0);

        fx.orchestrator.generate(request("tina", "hi")).await.unwrap();
        let err = fx.orchestrator.generate(request("tina", "again")).await.unwrap_err();
        assert!(matches!(err, ServiceError::RateLimited));

        assert_eq!(fx.backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn failed_generation_consumes_quota_but_writes_nothing() {
        let fx = fixture(RecordingBackend::failing()).await;
        fx.identity.add_user("alice", "User").await.unwrap();

        let err = fx
            .orchestrator
            .generate(GenerateRequest {
                conversation_id: Some("c1".into()),
                ..request("alice", "Hello")
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "generation_error");

        assert_eq!(fx.identity.get_user("alice").await.unwrap().daily_used, 1);
        assert!(fx.ledger.get_conversation("alice", "c1").await.is_empty());
        assert!(fx.ledger.get_logs(None, 10, 0).await.is_empty());
    }

    #[tokio::test]
    async fn unknown_model_is_reported_as_generation_error() {
        let fx = fixture(RecordingBackend::replying("ok")).await;
        fx.identity.add_user("alice", "User").await.unwrap();

        let err = fx
            .orchestrator
            .generate(GenerateRequest {
                model: Some("huge".into()),
                ..request("alice", "Hello")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Generation(ref m) if m.contains("huge")));
    }
}

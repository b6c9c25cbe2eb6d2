pub mod admin;
pub mod error;
pub mod files;
pub mod handlers;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::agent::ledger::ConversationLedger;
use crate::agent::orchestrator::Orchestrator;
use crate::ai::registry::ProviderRegistry;
use crate::auth::roles::Capability;
use crate::auth::IdentityStore;
use crate::error::ServiceError;
use crate::files::FileStore;
use error::ApiError;

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Shared application state, handed to every handler.
pub struct AppState {
    pub identity: Arc<IdentityStore>,
    pub ledger: Arc<ConversationLedger>,
    pub registry: Arc<ProviderRegistry>,
    pub files: FileStore,
    pub orchestrator: Orchestrator,
}

impl AppState {
    /// The caller must be a known user.
    pub async fn require_user(&self, username: &str) -> Result<(), ApiError> {
        if username.is_empty() || !self.identity.is_authorized(username).await {
            return Err(ServiceError::Unauthorized.into());
        }
        Ok(())
    }

    /// The caller must be a known user whose role grants `capability`.
    pub async fn require_capability(
        &self,
        username: &str,
        capability: Capability,
        denied: &str,
    ) -> Result<(), ApiError> {
        self.require_user(username).await?;
        if !self.identity.check_permission(username, capability).await {
            tracing::warn!("'{}' lacks {}", username, capability);
            return Err(ServiceError::PermissionDenied(denied.to_string()).into());
        }
        Ok(())
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/auth_check", post(handlers::auth_check))
        .route("/generate", post(handlers::generate))
        .route("/get_conversation", get(handlers::get_conversation))
        .route("/get_user_conversations", get(handlers::get_user_conversations))
        .route("/clear_conversation", post(handlers::clear_conversation))
        .route("/get_models", get(handlers::get_models))
        .route("/add_user", post(admin::add_user))
        .route("/remove_user", post(admin::remove_user))
        .route("/update_user", post(admin::update_user))
        .route("/list_users", get(admin::list_users))
        .route("/get_logs", get(admin::get_logs))
        .route("/get_usage_stats", get(admin::get_usage_stats))
        .route(
            "/upload_file",
            post(files::upload_file).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/get_file/:file_id", get(files::get_file))
        .route("/delete_file", post(files::delete_file))
        .route("/list_files", get(files::list_files))
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::agent::prompts::SystemPrompts;
    use crate::ai::llm::{ChatBackend, WireFormat};
    use crate::ai::registry::ProviderDescriptor;
    use crate::ai::testing::RecordingBackend;
    use crate::auth::roles::RoleSet;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    pub struct TestApp {
        pub _dir: tempfile::TempDir,
        pub state: Arc<AppState>,
        pub router: Router,
    }

    /// Builtin roles, one admin named `root`, and a `stub` provider that
    /// always replies with `reply`.
    pub async fn app(reply: &str) -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let identity = Arc::new(
            IdentityStore::open(dir.path().join("users.json"), RoleSet::builtin(), &["root".to_string()])
                .await
                .unwrap(),
        );
        let ledger = Arc::new(
            ConversationLedger::open(dir.path().join("history.json"), dir.path().join("logs.json"))
                .await
                .unwrap(),
        );
        let mut registry = ProviderRegistry::empty();
        registry.register(
            ProviderDescriptor {
                name: "stub".into(),
                base_url: "http://unused".into(),
                format: WireFormat::OpenAi,
                models: vec![("small".into(), "stub/small-1".into())],
                api_key: None,
            },
            Arc::new(RecordingBackend::replying(reply)) as Arc<dyn ChatBackend>,
        );
        let registry = Arc::new(registry);
        let orchestrator = Orchestrator::new(
            identity.clone(),
            ledger.clone(),
            registry.clone(),
            SystemPrompts::builtin(),
            "stub",
            "small",
        );
        let files = FileStore::open(dir.path().join("uploads")).await.unwrap();

        let state = Arc::new(AppState {
            identity,
            ledger,
            registry,
            files,
            orchestrator,
        });
        TestApp {
            _dir: dir,
            router: router(state.clone()),
            state,
        }
    }

    impl TestApp {
        pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let body = to_bytes(response.into_body(), 1 << 20).await.unwrap();
            let json = if body.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&body).unwrap_or(Value::Null)
            };
            (status, json)
        }

        pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
            self.send(Request::get(uri).body(Body::empty()).unwrap()).await
        }

        pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
            self.send(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
        }
    }
}

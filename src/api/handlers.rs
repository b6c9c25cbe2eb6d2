use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::ApiError;
use super::AppState;
use crate::agent::orchestrator::GenerateRequest;
use crate::error::ServiceError;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UsernameBody {
    pub username: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConversationParams {
    pub username: String,
    pub conversation_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    pub provider: String,
    pub model: String,
}

/// `GET /`
pub async fn index() -> Json<Value> {
    Json(json!({
        "name": "Studio Assist Gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

/// `POST /auth_check`
pub async fn auth_check(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UsernameBody>,
) -> Result<Json<Value>, ApiError> {
    let username = body.username.trim();
    if username.is_empty() {
        return Err(ServiceError::MissingUsername.into());
    }
    state.require_user(username).await?;

    state.identity.record_login(username).await?;
    let user = state
        .identity
        .get_user(username)
        .await
        .ok_or(ServiceError::Unauthorized)?;
    let permissions = state.identity.roles().get(&user.role).cloned();

    tracing::info!("Auth check passed for '{}' ({})", username, user.role);
    Ok(Json(json!({
        "authorized": true,
        "username": username,
        "role": user.role,
        "permissions": permissions,
        "message": format!("Welcome, {}! You are authorized as {}.", username, user.role),
    })))
}

/// `POST /generate`
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<Value>, ApiError> {
    let outcome = state.orchestrator.generate(request).await?;
    Ok(Json(json!({
        "code": outcome.content,
        "conversation_id": outcome.conversation_id,
    })))
}

/// `GET /get_conversation`
pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ConversationParams>,
) -> Result<Json<Value>, ApiError> {
    let username = params.username.trim();
    let conversation_id = params.conversation_id.trim();
    state.require_user(username).await?;

    let conversation = state.ledger.get_conversation(username, conversation_id).await;
    Ok(Json(json!({
        "conversation": conversation,
        "conversation_id": conversation_id,
    })))
}

/// `GET /get_user_conversations`
pub async fn get_user_conversations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UsernameBody>,
) -> Result<Json<Value>, ApiError> {
    let username = params.username.trim();
    state.require_user(username).await?;

    let conversations = state.ledger.conversation_summaries(username).await;
    Ok(Json(json!({ "conversations": conversations })))
}

/// `POST /clear_conversation`
pub async fn clear_conversation(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ConversationParams>,
) -> Result<Json<Value>, ApiError> {
    let username = body.username.trim();
    state.require_user(username).await?;

    if !state
        .ledger
        .clear_conversation(username, body.conversation_id.trim())
        .await?
    {
        return Err(ApiError::ClearFailed);
    }
    Ok(Json(json!({ "message": "Conversation cleared." })))
}

/// `GET /get_models`, plus the resolved target when both `provider` and
/// `model` are given.
pub async fn get_models(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ModelParams>,
) -> Json<Value> {
    let provider = Some(params.provider.trim()).filter(|p| !p.is_empty());
    let mut body = json!({ "models": state.registry.list_models(provider) });

    let model = params.model.trim();
    if let (Some(provider), false) = (provider, model.is_empty()) {
        body["model_info"] = json!(state.registry.model_info(provider, model));
    }
    Json(body)
}

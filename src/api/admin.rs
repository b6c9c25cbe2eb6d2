use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::ApiError;
use super::AppState;
use crate::auth::roles::{Capability, DEFAULT_ROLE};

const MANAGE_DENIED: &str = "You don't have permission to manage users.";
const LOGS_DENIED: &str = "You don't have permission to view logs.";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UserChange {
    pub username: String,
    pub role: String,
    pub admin_username: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AdminParams {
    pub admin_username: String,
}

#[derive(Debug, Deserialize)]
pub struct LogParams {
    #[serde(default)]
    pub admin_username: String,
    #[serde(default)]
    pub username: String,
    #[serde(default = "default_log_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_log_limit() -> usize {
    100
}

/// Admin checks for add/remove, which also accept requests with no admin
/// at all.
async fn optional_manager(
    state: &AppState,
    admin_username: &str,
    action: &str,
    target: &str,
) -> Result<(), ApiError> {
    if admin_username.is_empty() {
        tracing::warn!("{} of user '{}' requested without an admin", action, target);
        return Ok(());
    }
    state
        .require_capability(admin_username, Capability::ManageUsers, MANAGE_DENIED)
        .await
}

/// The admin must be named, known and hold `capability`.
async fn required_admin(
    state: &AppState,
    admin_username: &str,
    capability: Capability,
    denied: &str,
) -> Result<(), ApiError> {
    if admin_username.is_empty() {
        return Err(ApiError::MissingAdmin);
    }
    state.require_capability(admin_username, capability, denied).await
}

/// `POST /add_user`
pub async fn add_user(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UserChange>,
) -> Result<Json<Value>, ApiError> {
    optional_manager(&state, body.admin_username.trim(), "Add", body.username.trim()).await?;

    let role = Some(body.role.trim()).filter(|r| !r.is_empty()).unwrap_or(DEFAULT_ROLE);
    let user = state.identity.add_user(body.username.trim(), role).await?;
    Ok(Json(json!({
        "message": format!("User '{}' added with role '{}'.", user.username, user.role),
        "user": user,
    })))
}

/// `POST /remove_user`
pub async fn remove_user(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UserChange>,
) -> Result<Json<Value>, ApiError> {
    optional_manager(&state, body.admin_username.trim(), "Removal", body.username.trim()).await?;

    let username = body.username.trim();
    state.identity.remove_user(username).await?;
    Ok(Json(json!({ "message": format!("User '{}' removed.", username) })))
}

/// `POST /update_user`
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UserChange>,
) -> Result<Json<Value>, ApiError> {
    required_admin(&state, body.admin_username.trim(), Capability::ManageUsers, MANAGE_DENIED).await?;

    let role = Some(body.role.trim()).filter(|r| !r.is_empty());
    let user = state.identity.update_user(body.username.trim(), role).await?;
    Ok(Json(json!({
        "message": format!("User '{}' updated.", user.username),
        "user": user,
    })))
}

/// `GET /list_users`
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AdminParams>,
) -> Result<Json<Value>, ApiError> {
    required_admin(&state, params.admin_username.trim(), Capability::ManageUsers, MANAGE_DENIED).await?;
    Ok(Json(json!({ "users": state.identity.list_users().await })))
}

/// `GET /get_logs`
pub async fn get_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LogParams>,
) -> Result<Json<Value>, ApiError> {
    required_admin(&state, params.admin_username.trim(), Capability::ViewLogs, LOGS_DENIED).await?;

    let filter = Some(params.username.trim()).filter(|u| !u.is_empty());
    let logs = state.ledger.get_logs(filter, params.limit, params.offset).await;
    Ok(Json(json!({
        "total": logs.len(),
        "logs": logs,
        "limit": params.limit,
        "offset": params.offset,
    })))
}

/// `GET /get_usage_stats`
pub async fn get_usage_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AdminParams>,
) -> Result<Json<Value>, ApiError> {
    required_admin(&state, params.admin_username.trim(), Capability::ViewLogs, LOGS_DENIED).await?;
    Ok(Json(json!(state.ledger.usage_stats().await)))
}

use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::ApiError;
use super::AppState;
use crate::auth::roles::Capability;

const UPLOAD_DENIED: &str = "You don't have permission to upload files.";
const MANAGE_DENIED: &str = "You don't have permission to manage files.";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileRequest {
    pub username: String,
    pub file_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
    pub username: String,
    /// Defaults to the requesting user
    pub uploaded_by: String,
    #[serde(rename = "type")]
    pub file_type: String,
}

struct Upload {
    filename: String,
    data: Vec<u8>,
}

/// `POST /upload_file` (multipart: `file`, `username`, `type`, `description`)
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut upload = None;
    let mut username = String::new();
    let mut file_type = String::new();
    let mut description = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadUpload(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadUpload(e.to_string()))?;
                upload = Some(Upload {
                    filename,
                    data: data.to_vec(),
                });
            }
            "username" | "type" | "description" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadUpload(e.to_string()))?;
                let value = value.trim().to_string();
                match name.as_str() {
                    "username" => username = value,
                    "type" => file_type = value,
                    _ => description = value,
                }
            }
            other => tracing::debug!("Ignoring upload field '{}'", other),
        }
    }

    let upload = upload.ok_or(ApiError::NoFile)?;
    if upload.filename.is_empty() {
        return Err(ApiError::NoFileSelected);
    }
    state
        .require_capability(&username, Capability::UploadFiles, UPLOAD_DENIED)
        .await?;

    if file_type.is_empty() {
        file_type = "unknown".to_string();
    }
    let metadata = state
        .files
        .save_file(&upload.data, &upload.filename, &file_type, &username, &description)
        .await?;

    Ok(Json(json!({
        "message": "File uploaded successfully.",
        "file_id": metadata.id,
        "metadata": metadata,
    })))
}

/// `GET /get_file/:file_id` as an attachment download.
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
    Query(params): Query<FileRequest>,
) -> Result<Response, ApiError> {
    state.require_user(params.username.trim()).await?;

    let file = state.files.get_file(file_id.trim()).await?;
    let disposition = format!("attachment; filename=\"{}\"", file.filename);
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.data,
    )
        .into_response())
}

/// `POST /delete_file`
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Json(body): Json<FileRequest>,
) -> Result<Json<Value>, ApiError> {
    state
        .require_capability(body.username.trim(), Capability::UploadFiles, MANAGE_DENIED)
        .await?;

    state.files.delete_file(body.file_id.trim()).await?;
    Ok(Json(json!({ "message": "File deleted" })))
}

/// `GET /list_files`
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, ApiError> {
    let username = params.username.trim();
    state.require_user(username).await?;

    let uploaded_by = Some(params.uploaded_by.trim())
        .filter(|u| !u.is_empty())
        .unwrap_or(username);
    let file_type = Some(params.file_type.trim()).filter(|t| !t.is_empty());

    let files = state.files.list_files(Some(uploaded_by), file_type).await;
    Ok(Json(json!({
        "files": files,
        "types": state.files.file_types().await,
    })))
}

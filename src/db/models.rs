use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ai::llm::Role;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub role: String,
    pub added_on: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub request_count: u64,
    /// Copied from the role when the record is written, not joined live.
    pub daily_limit: u32,
    pub daily_used: u32,
    pub last_reset: DateTime<Utc>,
}

/// Users keyed by exact username.
pub type UserDocument = BTreeMap<String, UserRecord>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub timestamp: DateTime<Utc>,
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryDocument {
    /// username -> conversation id -> messages in append order
    #[serde(default)]
    pub conversations: BTreeMap<String, BTreeMap<String, Vec<StoredMessage>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub username: String,
    pub model: String,
    pub prompt: String,
    pub response: String,
    pub context_used: bool,
    #[serde(default)]
    pub files_used: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogDocument {
    #[serde(default)]
    pub logs: Vec<AuditEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: String,
    pub filename: String,
    pub original_filename: String,
    #[serde(rename = "type")]
    pub file_type: String,
    pub size: u64,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
    pub description: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileIndex {
    #[serde(default)]
    pub files: BTreeMap<String, FileMetadata>,
}

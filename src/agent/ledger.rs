use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ai::llm::Role;
use crate::db::models::{AuditEntry, HistoryDocument, LogDocument, StoredMessage};
use crate::db::JsonDocument;
use crate::error::ServiceError;

const PREVIEW_CHARS: usize = 100;

/// Aggregate counters over the whole audit log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageStats {
    pub total_requests: usize,
    pub model_counts: BTreeMap<String, usize>,
    pub user_counts: BTreeMap<String, usize>,
    /// Keyed by `YYYY-MM-DD`
    pub day_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub message_count: usize,
    pub first_timestamp: DateTime<Utc>,
    pub last_timestamp: DateTime<Utc>,
    pub preview: String,
}

impl AuditEntry {
    pub fn new(
        username: &str,
        model: &str,
        prompt: &str,
        response: &str,
        context_used: bool,
        files_used: Vec<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            username: username.to_string(),
            model: model.to_string(),
            prompt: prompt.to_string(),
            response: response.to_string(),
            context_used,
            files_used,
        }
    }
}

/// Per-user conversation history plus the append-only audit log.
///
/// The two live in separate documents with separate locks, so logging a
/// request never waits on a history write.
pub struct ConversationLedger {
    history: JsonDocument<HistoryDocument>,
    logs: JsonDocument<LogDocument>,
}

impl ConversationLedger {
    pub async fn open(
        history_path: impl Into<PathBuf>,
        logs_path: impl Into<PathBuf>,
    ) -> anyhow::Result<Self> {
        let history = JsonDocument::<HistoryDocument>::open(history_path, HistoryDocument::default).await?;
        let logs = JsonDocument::<LogDocument>::open(logs_path, LogDocument::default).await?;

        let entries = logs.read(|l| l.logs.len()).await;
        tracing::info!(
            "Ledger loaded: history {:?}, logs {:?} ({} entries)",
            history.path(),
            logs.path(),
            entries
        );

        Ok(Self { history, logs })
    }

    // ── Conversation history ───────────────────────────────────────

    /// Append messages contiguously, creating the conversation on first use.
    /// No other writer can interleave with one call.
    pub async fn append_messages(
        &self,
        username: &str,
        conversation_id: &str,
        messages: &[(Role, &str)],
    ) -> Result<Vec<StoredMessage>, ServiceError> {
        self.history
            .update(|doc| {
                let conversation = doc
                    .conversations
                    .entry(username.to_string())
                    .or_default()
                    .entry(conversation_id.to_string())
                    .or_default();

                let mut appended = Vec::with_capacity(messages.len());
                for (role, content) in messages {
                    // Keep timestamps monotonic even if the wall clock steps back.
                    let now = Utc::now();
                    let timestamp = conversation
                        .last()
                        .map_or(now, |last| last.timestamp.max(now));
                    let message = StoredMessage {
                        timestamp,
                        role: *role,
                        content: content.to_string(),
                    };
                    conversation.push(message.clone());
                    appended.push(message);
                }
                Ok(appended)
            })
            .await
    }

    pub async fn get_conversation(&self, username: &str, conversation_id: &str) -> Vec<StoredMessage> {
        self.history
            .read(|doc| {
                doc.conversations
                    .get(username)
                    .and_then(|c| c.get(conversation_id))
                    .cloned()
                    .unwrap_or_default()
            })
            .await
    }

    pub async fn get_user_conversations(&self, username: &str) -> BTreeMap<String, Vec<StoredMessage>> {
        self.history
            .read(|doc| doc.conversations.get(username).cloned().unwrap_or_default())
            .await
    }

    /// Non-empty conversations, most recently active first.
    pub async fn conversation_summaries(&self, username: &str) -> Vec<ConversationSummary> {
        let conversations = self.get_user_conversations(username).await;

        let mut summaries: Vec<ConversationSummary> = conversations
            .into_iter()
            .filter_map(|(id, messages)| {
                let first = messages.first()?;
                let last = messages.last()?;
                let preview = messages
                    .iter()
                    .find(|m| m.role == Role::User)
                    .map(|m| truncate_preview(&m.content))
                    .unwrap_or_default();
                Some(ConversationSummary {
                    conversation_id: id,
                    message_count: messages.len(),
                    first_timestamp: first.timestamp,
                    last_timestamp: last.timestamp,
                    preview,
                })
            })
            .collect();

        summaries.sort_by(|a, b| b.last_timestamp.cmp(&a.last_timestamp));
        summaries
    }

    /// Empty the conversation but keep its id. False if it does not exist.
    pub async fn clear_conversation(
        &self,
        username: &str,
        conversation_id: &str,
    ) -> Result<bool, ServiceError> {
        let result: Result<(), ServiceError> = self
            .history
            .update(|doc| {
                let conversation = doc
                    .conversations
                    .get_mut(username)
                    .and_then(|c| c.get_mut(conversation_id))
                    .ok_or_else(|| ServiceError::NotFound(conversation_id.to_string()))?;
                conversation.clear();
                Ok(())
            })
            .await;

        match result {
            Ok(()) => {
                tracing::info!("Cleared conversation {} for '{}'", conversation_id, username);
                Ok(true)
            }
            Err(ServiceError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    // ── Audit log ──────────────────────────────────────────────────

    pub async fn log_request(&self, entry: AuditEntry) -> Result<(), ServiceError> {
        self.logs
            .update(|doc| {
                doc.logs.push(entry);
                Ok(())
            })
            .await
    }

    /// Newest first, optionally for one user, then `offset`/`limit` applied.
    pub async fn get_logs(&self, username: Option<&str>, limit: usize, offset: usize) -> Vec<AuditEntry> {
        self.logs
            .read(|doc| {
                // Reversed before the stable sort so equal timestamps stay newest first.
                let mut logs: Vec<&AuditEntry> = doc
                    .logs
                    .iter()
                    .rev()
                    .filter(|e| username.map_or(true, |u| e.username == u))
                    .collect();
                logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                logs.into_iter().skip(offset).take(limit).cloned().collect()
            })
            .await
    }

    pub async fn usage_stats(&self) -> UsageStats {
        self.logs
            .read(|doc| {
                let mut stats = UsageStats {
                    total_requests: doc.logs.len(),
                    ..UsageStats::default()
                };
                for entry in &doc.logs {
                    *stats.model_counts.entry(entry.model.clone()).or_default() += 1;
                    *stats.user_counts.entry(entry.username.clone()).or_default() += 1;
                    let day = entry.timestamp.format("%Y-%m-%d").to_string();
                    *stats.day_counts.entry(day).or_default() += 1;
                }
                stats
            })
            .await
    }
}

fn truncate_preview(content: &str) -> String {
    if content.chars().count() > PREVIEW_CHARS {
        let mut preview: String = content.chars().take(PREVIEW_CHARS).collect();
        preview.push_str("...");
        preview
    } else {
        content.to_string()
    }
}

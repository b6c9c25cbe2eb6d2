use crate::ai::llm::ChatMessage;
use crate::db::models::StoredMessage;

/// How many prior messages of a conversation are replayed to the model.
pub const HISTORY_WINDOW: usize = 10;

/// Assemble the message list for one generation call: a single system
/// message, the tail of the stored conversation, then the new prompt.
pub fn build_messages(
    system_prompt: &str,
    workspace: Option<&str>,
    history: &[StoredMessage],
    prompt: &str,
) -> Vec<ChatMessage> {
    let mut system = system_prompt.to_string();
    if let Some(ws) = workspace.map(str::trim).filter(|ws| !ws.is_empty()) {
        system.push_str("\n\nWorkspace Context:\n");
        system.push_str(ws);
    }

    let recent = &history[history.len().saturating_sub(HISTORY_WINDOW)..];

    let mut messages = Vec::with_capacity(recent.len() + 2);
    messages.push(ChatMessage::system(system));
    messages.extend(
        recent
            .iter()
            .map(|m| ChatMessage::new(m.role, m.content.clone())),
    );
    messages.push(ChatMessage::user(prompt));
    messages
}

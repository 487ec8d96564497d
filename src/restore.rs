//! Session restoration
//!
//! Rebuilds a displayable message list from server-side session history.
//! Stored content is either a plain string or an ordered list of typed
//! blocks; only text blocks survive flattening.

use crate::adapter::SessionSource;
use crate::types::{now_millis, ChatMessage, ContentBlock, RawContent, RawMessage, StreamEventRecord};

/// Convert stored messages into chat messages
///
/// Ids are `restored-{index}` and every message and nested event is
/// stamped with the current time, so hydrating the same input twice
/// yields the same ids and content.
pub fn hydrate(raw: &[RawMessage]) -> Vec<ChatMessage> {
    let now = now_millis();

    raw.iter()
        .enumerate()
        .map(|(index, message)| ChatMessage {
            id: format!("restored-{}", index),
            role: message.role,
            content: flatten_content(&message.content),
            timestamp: now,
            stream_events: message
                .stream_events
                .iter()
                .map(|event| StreamEventRecord::new(event.kind.clone(), event.data.clone()))
                .collect(),
            attached_files: message.attached_files.clone(),
            trace_id: None,
            error: None,
        })
        .collect()
}

/// Join all text blocks with newlines, dropping every other block type
pub fn flatten_content(content: &RawContent) -> String {
    match content {
        RawContent::Text(text) => text.clone(),
        RawContent::Blocks(blocks) => blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Fetch a session and hydrate it
///
/// Any failure (including an unknown session) yields an empty list; a new
/// session simply has no history yet.
pub async fn restore(source: &dyn SessionSource, session_id: &str) -> Vec<ChatMessage> {
    match source.fetch_session(session_id).await {
        Ok(record) => {
            let messages = hydrate(&record.messages);
            tracing::debug!(
                session_id = %session_id,
                count = messages.len(),
                "Session restored"
            );
            messages
        }
        Err(e) => {
            tracing::debug!(session_id = %session_id, error = %e, "No session history to restore");
            Vec::new()
        }
    }
}

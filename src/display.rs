//! Mapping from wire events to display records
//!
//! Live streams and restored sessions must render identically, so the
//! mapping mirrors the record shapes the platform writes into session
//! history: camelCase keys, one record per display-relevant event.

use crate::types::{EventKind, StreamEventRecord, WireEvent};
use serde_json::{json, Value};

/// Map a wire event to a display record
///
/// Returns `None` for events that never render on their own: text deltas
/// (they extend message content instead), run bookkeeping, and assistant
/// events with empty content.
pub fn to_record(event: &WireEvent) -> Option<StreamEventRecord> {
    let data = match event.kind() {
        EventKind::TurnStart => json!({
            "turn": event.turn,
            "maxTurns": event.field("max_turns").cloned().unwrap_or(json!(0)),
        }),
        EventKind::Assistant => {
            let content = event.str_field("content").unwrap_or_default();
            if content.is_empty() {
                return None;
            }
            json!({
                "content": content,
                "inputTokens": opt(event, "input_tokens"),
                "outputTokens": opt(event, "output_tokens"),
            })
        }
        EventKind::ToolCall => json!({
            "toolName": event.str_field("tool_name").unwrap_or_default(),
            "toolInput": opt(event, "tool_input"),
        }),
        EventKind::ToolResult => json!({
            "toolName": event.str_field("tool_name").unwrap_or_default(),
            "toolResult": event.field("tool_result").cloned().unwrap_or(json!("")),
            "success": !event
                .field("is_error")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }),
        EventKind::OutputFile => json!({
            "fileId": event.str_field("file_id").unwrap_or_default(),
            "filename": event.str_field("filename").unwrap_or_default(),
            "size": event.field("size").cloned().unwrap_or(json!(0)),
            "contentType": event.str_field("content_type").unwrap_or_default(),
            "downloadUrl": event.str_field("download_url").unwrap_or_default(),
            "description": opt(event, "description"),
        }),
        EventKind::AskUser => json!({
            "promptId": event.str_field("prompt_id").unwrap_or_default(),
            "question": event.str_field("question").unwrap_or_default(),
            "options": opt(event, "options"),
        }),
        EventKind::Complete => json!({
            "success": event.field("success").and_then(Value::as_bool).unwrap_or(false),
            "answer": opt(event, "answer"),
            "totalTurns": event.field("total_turns").cloned().unwrap_or(json!(0)),
            "totalInputTokens": opt(event, "total_input_tokens"),
            "totalOutputTokens": opt(event, "total_output_tokens"),
        }),
        EventKind::Error => json!({ "message": error_text(event).unwrap_or_default() }),
        EventKind::SteeringReceived => json!({
            "message": event.str_field("message").unwrap_or_default(),
        }),
        EventKind::RunStarted | EventKind::TextDelta | EventKind::Internal | EventKind::Unknown => {
            return None
        }
    };

    Some(StreamEventRecord::new(event.event_type.clone(), data))
}

fn error_text(event: &WireEvent) -> Option<&str> {
    event
        .str_field("message")
        .or_else(|| event.str_field("error"))
}

/// Error to show on the assistant message for an `error` event
///
/// Same lookup as the display record, but never empty.
pub fn error_message(event: &WireEvent) -> String {
    error_text(event)
        .filter(|text| !text.is_empty())
        .unwrap_or("Unknown error")
        .to_string()
}

fn opt(event: &WireEvent, name: &str) -> Value {
    event.field(name).cloned().unwrap_or(Value::Null)
}

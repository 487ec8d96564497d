//! Adapter traits: the seams between the chat engine and its host
//!
//! The engine never owns the message list or the transport. The host
//! supplies a `MessageAdapter` (its message list and running flag) and a
//! `StreamAdapter` (how a turn is actually run), plus an optional
//! `SessionSource` for restoring history.

use crate::error::{ClientError, Result};
use crate::types::{ApiResponseMode, ChatMessage, EventKind, SessionRecord, SyncResponse, TurnRequest, WireEvent};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};

pub mod http;
pub mod scripted;

/// Ordered stream of events for one turn
pub type EventStream = BoxStream<'static, Result<WireEvent>>;

/// Access to the host's message list and running flag
///
/// Implementations use interior mutability; the engine calls these from
/// its own task while the host reads them for rendering.
pub trait MessageAdapter: Send + Sync {
    /// Snapshot of the current message list
    fn messages(&self) -> Vec<ChatMessage>;

    /// Append a message
    fn push(&self, message: ChatMessage);

    /// Mutate a message in place; returns false if no message has this id
    fn update(&self, id: &str, f: &mut dyn FnMut(&mut ChatMessage)) -> bool;

    /// Remove a message by id; returns false if absent
    fn remove(&self, id: &str) -> bool;

    /// Replace the whole list (restoration, new chat)
    fn replace_all(&self, messages: Vec<ChatMessage>);

    fn is_running(&self) -> bool;

    fn set_running(&self, running: bool);

    /// Whether a message with this id exists
    fn contains(&self, id: &str) -> bool {
        self.messages().iter().any(|m| m.id == id)
    }
}

/// Transport that runs agent turns
#[async_trait]
pub trait StreamAdapter: Send + Sync {
    /// Start a streaming turn
    ///
    /// Resolves once the server accepted the request; events follow on the
    /// returned stream. Dropping the stream aborts the request.
    async fn run_stream(&self, request: &TurnRequest) -> Result<EventStream>;

    /// Inject a message into a running turn
    async fn steer(&self, trace_id: &str, message: &str) -> Result<()>;

    /// Transport name (e.g., "http", "scripted")
    fn name(&self) -> &str;

    /// Whether turns should use `run_sync` instead of `run_stream`
    fn response_mode(&self) -> ApiResponseMode {
        ApiResponseMode::Streaming
    }

    /// Run a turn to completion and return the final answer
    ///
    /// Default implementation drains `run_stream()` and folds the events.
    /// Transports with a dedicated single-shot endpoint should override this.
    async fn run_sync(&self, request: &TurnRequest) -> Result<SyncResponse> {
        let mut events = self.run_stream(request).await?;
        let mut response = SyncResponse::default();
        let mut text = String::new();

        while let Some(event) = events.next().await {
            let event = event?;
            match event.kind() {
                EventKind::RunStarted => {
                    response.trace_id = event.str_field("trace_id").map(str::to_string);
                    response.session_id = event.str_field("session_id").map(str::to_string);
                }
                EventKind::TextDelta => text.push_str(event.str_field("text").unwrap_or_default()),
                EventKind::OutputFile => response.output_files.push(serde_json::Value::Object(event.data.clone())),
                EventKind::Complete => {
                    response.success = event
                        .field("success")
                        .and_then(serde_json::Value::as_bool)
                        .unwrap_or(false);
                    response.answer = event.str_field("answer").unwrap_or_default().to_string();
                    response.total_turns = event
                        .field("total_turns")
                        .and_then(serde_json::Value::as_u64)
                        .unwrap_or(0) as u32;
                }
                EventKind::Error => {
                    response.success = false;
                    response.error = Some(crate::display::error_message(&event));
                }
                _ => {}
            }
            if event.kind().is_terminal() {
                break;
            }
        }

        if response.answer.is_empty() {
            response.answer = text;
        }
        Ok(response)
    }
}

/// Read access to persisted server sessions
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// Fetch a session; unknown ids return `ClientError::NotFound`
    async fn fetch_session(&self, session_id: &str) -> Result<SessionRecord>;
}

/// Session source for surfaces without server-side history
pub struct NoSessions;

#[async_trait]
impl SessionSource for NoSessions {
    async fn fetch_session(&self, session_id: &str) -> Result<SessionRecord> {
        Err(ClientError::NotFound(format!("Session not found: {}", session_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::scripted::ScriptedAdapter;
    use super::*;
    use serde_json::json;

    fn request() -> TurnRequest {
        TurnRequest {
            request: "hi".to_string(),
            session_id: "s-1".to_string(),
            uploaded_files: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_default_run_sync_folds_stream() {
        let adapter = ScriptedAdapter::new();
        adapter.push_turn(vec![
            WireEvent::new("run_started", json!({"trace_id": "tr-1", "session_id": "s-1"})),
            WireEvent::new("text_delta", json!({"text": "Hel"})),
            WireEvent::new("text_delta", json!({"text": "lo"})),
            WireEvent::new("complete", json!({"success": true, "total_turns": 1})),
        ]);

        let response = adapter.run_sync(&request()).await.unwrap();
        assert!(response.success);
        assert_eq!(response.answer, "Hello");
        assert_eq!(response.trace_id.as_deref(), Some("tr-1"));
        assert_eq!(response.total_turns, 1);
    }

    #[tokio::test]
    async fn test_default_run_sync_error_event() {
        let adapter = ScriptedAdapter::new();
        adapter.push_turn(vec![WireEvent::new("error", json!({"message": "quota exceeded"}))]);

        let response = adapter.run_sync(&request()).await.unwrap();
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("quota exceeded"));
    }

    #[tokio::test]
    async fn test_no_sessions_is_not_found() {
        let err = NoSessions.fetch_session("abc").await.unwrap_err();
        assert!(err.is_not_found());
    }
}

//! Chat engine driving agent turns against injected adapters
//!
//! One engine serves one chat surface. A turn runs in its own task and
//! applies stream events to the host's message list strictly in arrival
//! order. The host's running flag is the mutual exclusion: while it is
//! set, submissions become steering messages and session changes are
//! refused.
//!
//! ```text
//! Idle → Submitting → Streaming → Completed | Cancelled | Errored
//!                        ↕
//!               AwaitingUserInput
//! ```

use crate::adapter::{MessageAdapter, NoSessions, SessionSource, StreamAdapter};
use crate::display;
use crate::error::{ClientError, Result};
use crate::restore;
use crate::session::SessionSlot;
use crate::types::{
    ApiResponseMode, ChatMessage, EventKind, SyncResponse, TurnRequest, UploadedFile, WireEvent,
};
use futures::StreamExt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};

/// Lifecycle phase of the current turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Submitting,
    Streaming,
    /// The agent asked a question and waits for `handle_respond`
    AwaitingUserInput,
    Completed,
    Cancelled,
    Errored,
}

impl TurnPhase {
    /// Whether a turn is in flight or waiting on the user
    pub fn is_active(self) -> bool {
        matches!(
            self,
            TurnPhase::Submitting | TurnPhase::Streaming | TurnPhase::AwaitingUserInput
        )
    }
}

/// What a submission did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A new turn was started
    Started,
    /// The text was injected into the running turn
    Steered { trace_id: String },
}

struct TurnState {
    phase: TurnPhase,

    /// Incremented per turn and on stop; events from older turns are dropped
    generation: u64,
    trace_id: Option<String>,
    assistant_id: Option<String>,
    pending_prompt: Option<String>,
    stream_open: bool,
    input: String,
    uploads: Vec<UploadedFile>,
    abort: Option<AbortHandle>,
    task: Option<JoinHandle<()>>,
}

impl TurnState {
    fn new() -> Self {
        Self {
            phase: TurnPhase::Idle,
            generation: 0,
            trace_id: None,
            assistant_id: None,
            pending_prompt: None,
            stream_open: false,
            input: String::new(),
            uploads: Vec::new(),
            abort: None,
            task: None,
        }
    }
}

struct Shared {
    messages: Arc<dyn MessageAdapter>,
    stream: Arc<dyn StreamAdapter>,
    state: Mutex<TurnState>,
    phase_tx: watch::Sender<TurnPhase>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, TurnState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_phase(&self, state: &mut TurnState, phase: TurnPhase) {
        state.phase = phase;
        self.phase_tx.send_replace(phase);
    }

    /// Id of the assistant message for this turn, creating it on first use
    fn ensure_assistant(&self, state: &mut TurnState) -> String {
        if let Some(id) = &state.assistant_id {
            if self.messages.contains(id) {
                return id.clone();
            }
        }
        let mut message = ChatMessage::assistant();
        message.trace_id = state.trace_id.clone();
        let id = message.id.clone();
        self.messages.push(message);
        state.assistant_id = Some(id.clone());
        id
    }

    fn with_assistant(&self, state: &mut TurnState, f: impl FnOnce(&mut ChatMessage)) {
        let id = self.ensure_assistant(state);
        let mut f = Some(f);
        self.messages.update(&id, &mut |message| {
            if let Some(f) = f.take() {
                f(message);
            }
        });
    }

    fn finish(&self, state: &mut TurnState, phase: TurnPhase) {
        state.stream_open = false;
        state.abort = None;
        self.set_phase(state, phase);
        self.messages.set_running(false);
    }

    fn mark_streaming(&self, generation: u64) {
        let mut state = self.state();
        if state.generation == generation && state.phase == TurnPhase::Submitting {
            self.set_phase(&mut state, TurnPhase::Streaming);
        }
    }

    /// Apply one event; returns false when the turn should stop reading
    fn apply(&self, generation: u64, event: &WireEvent) -> bool {
        let mut state = self.state();
        if state.generation != generation {
            return false;
        }

        let kind = event.kind();
        if matches!(kind, EventKind::Internal | EventKind::Unknown) {
            return true;
        }
        if state.phase == TurnPhase::Submitting {
            self.set_phase(&mut state, TurnPhase::Streaming);
        }

        match kind {
            EventKind::RunStarted => {
                if let Some(trace_id) = event.str_field("trace_id") {
                    tracing::debug!(trace_id = %trace_id, generation, "Run started");
                    state.trace_id = Some(trace_id.to_string());
                }
                let trace_id = state.trace_id.clone();
                self.with_assistant(&mut state, |m| m.trace_id = trace_id);
            }
            EventKind::TextDelta => {
                let text = event.str_field("text").unwrap_or_default();
                self.with_assistant(&mut state, |m| m.content.push_str(text));
            }
            EventKind::AskUser => {
                let record = display::to_record(event);
                self.with_assistant(&mut state, |m| m.stream_events.extend(record));
                state.pending_prompt = event.str_field("prompt_id").map(str::to_string);
                self.set_phase(&mut state, TurnPhase::AwaitingUserInput);
            }
            EventKind::Complete => {
                let answer = event.str_field("answer").unwrap_or_default().to_string();
                let record = display::to_record(event);
                self.with_assistant(&mut state, |m| {
                    if m.content.is_empty() {
                        m.content = answer;
                    }
                    m.stream_events.extend(record);
                });
                let phase = if state.pending_prompt.is_some() {
                    TurnPhase::AwaitingUserInput
                } else {
                    TurnPhase::Completed
                };
                self.finish(&mut state, phase);
                tracing::info!(generation, phase = ?phase, "Turn complete");
                return false;
            }
            EventKind::Error => {
                let message = display::error_message(event);
                let record = display::to_record(event);
                tracing::warn!(generation, error = %message, "Turn failed");
                self.with_assistant(&mut state, |m| {
                    m.stream_events.extend(record);
                    m.error = Some(message);
                });
                self.finish(&mut state, TurnPhase::Errored);
                return false;
            }
            _ => {
                let record = display::to_record(event);
                self.with_assistant(&mut state, |m| m.stream_events.extend(record));
            }
        }
        true
    }

    /// The stream ended without a terminal event
    fn finish_stream(&self, generation: u64) {
        let mut state = self.state();
        if state.generation != generation {
            return;
        }
        let phase = if state.phase == TurnPhase::AwaitingUserInput {
            TurnPhase::AwaitingUserInput
        } else {
            TurnPhase::Completed
        };
        self.finish(&mut state, phase);
        tracing::debug!(generation, phase = ?phase, "Stream closed");
    }

    fn apply_sync(&self, generation: u64, response: SyncResponse) {
        let mut state = self.state();
        if state.generation != generation {
            return;
        }
        if response.trace_id.is_some() {
            state.trace_id = response.trace_id.clone();
        }

        let failed = !response.success || response.error.is_some();
        let error = failed.then(|| {
            response
                .error
                .clone()
                .unwrap_or_else(|| "Agent run did not complete".to_string())
        });
        let records: Vec<_> = response
            .output_files
            .iter()
            .filter_map(|file| display::to_record(&WireEvent::new("output_file", file.clone())))
            .collect();
        let trace_id = state.trace_id.clone();

        self.with_assistant(&mut state, |m| {
            m.content = response.answer;
            m.trace_id = trace_id;
            m.stream_events.extend(records);
            m.error = error;
        });
        let phase = if failed {
            TurnPhase::Errored
        } else {
            TurnPhase::Completed
        };
        self.finish(&mut state, phase);
    }

    fn fail(&self, generation: u64, error: &ClientError) {
        let mut state = self.state();
        if state.generation != generation {
            return;
        }
        let message = failure_text(error);
        tracing::warn!(generation, error = %error, "Turn transport failed");
        self.with_assistant(&mut state, |m| m.error = Some(message));
        self.finish(&mut state, TurnPhase::Errored);
    }
}

fn failure_text(error: &ClientError) -> String {
    match error {
        ClientError::Api { detail, .. } => detail.clone(),
        ClientError::NotFound(detail) => detail.clone(),
        other => other.to_string(),
    }
}

async fn run_turn(shared: Arc<Shared>, generation: u64, request: TurnRequest) {
    match shared.stream.response_mode() {
        ApiResponseMode::Streaming => {
            let mut events = match shared.stream.run_stream(&request).await {
                Ok(events) => events,
                Err(e) => {
                    shared.fail(generation, &e);
                    return;
                }
            };
            shared.mark_streaming(generation);

            while let Some(item) = events.next().await {
                match item {
                    Ok(event) => {
                        if !shared.apply(generation, &event) {
                            return;
                        }
                    }
                    Err(e) => {
                        shared.fail(generation, &e);
                        return;
                    }
                }
            }
            shared.finish_stream(generation);
        }
        ApiResponseMode::NonStreaming => match shared.stream.run_sync(&request).await {
            Ok(response) => shared.apply_sync(generation, response),
            Err(e) => shared.fail(generation, &e),
        },
    }
}

enum Routed {
    Started,
    Steer { trace_id: String, message_id: String },
    Respond { prompt_id: String },
}

/// Client-side chat session driver
pub struct ChatEngine {
    shared: Arc<Shared>,
    sessions: Arc<dyn SessionSource>,
    slot: Mutex<SessionSlot>,
}

impl ChatEngine {
    pub fn new(
        messages: Arc<dyn MessageAdapter>,
        stream: Arc<dyn StreamAdapter>,
        slot: SessionSlot,
    ) -> Self {
        let (phase_tx, _) = watch::channel(TurnPhase::Idle);
        Self {
            shared: Arc::new(Shared {
                messages,
                stream,
                state: Mutex::new(TurnState::new()),
                phase_tx,
            }),
            sessions: Arc::new(NoSessions),
            slot: Mutex::new(slot),
        }
    }

    /// Restore history from this source on mount and session switch
    pub fn with_session_source(mut self, sessions: Arc<dyn SessionSource>) -> Self {
        self.sessions = sessions;
        self
    }

    fn slot(&self) -> MutexGuard<'_, SessionSlot> {
        self.slot.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn session_id(&self) -> String {
        self.slot().session_id().to_string()
    }

    pub fn phase(&self) -> TurnPhase {
        self.shared.state().phase
    }

    /// Receiver that observes every phase change
    pub fn watch_phase(&self) -> watch::Receiver<TurnPhase> {
        self.shared.phase_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.shared.messages.is_running()
    }

    /// Trace id of the current (or last) run, once the server announced it
    pub fn trace_id(&self) -> Option<String> {
        self.shared.state().trace_id.clone()
    }

    /// Prompt id the agent is waiting on, if any
    pub fn pending_prompt(&self) -> Option<String> {
        self.shared.state().pending_prompt.clone()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.shared.messages.messages()
    }

    pub fn input(&self) -> String {
        self.shared.state().input.clone()
    }

    /// Set the bound input field used by `submit(None)`
    pub fn set_input(&self, text: impl Into<String>) {
        self.shared.state().input = text.into();
    }

    /// Attach a file to the next submission
    pub fn attach_file(&self, file: UploadedFile) {
        self.shared.state().uploads.push(file);
    }

    pub fn detach_file(&self, file_id: &str) -> bool {
        let mut state = self.shared.state();
        let before = state.uploads.len();
        state.uploads.retain(|f| f.file_id != file_id);
        state.uploads.len() != before
    }

    pub fn uploaded_files(&self) -> Vec<UploadedFile> {
        self.shared.state().uploads.clone()
    }

    /// Submit text (or the bound input when `None`)
    ///
    /// Appends the user message immediately. Starts a turn when idle; while
    /// a turn runs with a known trace id the text is sent as steering
    /// instead. While the agent waits on an ask-user prompt the text
    /// answers it.
    pub async fn submit(&self, text: Option<&str>) -> Result<SubmitOutcome> {
        let (text, routed) = {
            let mut state = self.shared.state();
            let raw = match text {
                Some(t) => t.to_string(),
                None => state.input.clone(),
            };
            let trimmed = raw.trim().to_string();
            if trimmed.is_empty() {
                return Err(ClientError::Validation(
                    "Message must not be empty".to_string(),
                ));
            }

            let routed = if state.phase == TurnPhase::AwaitingUserInput
                && state.pending_prompt.is_some()
            {
                Routed::Respond {
                    prompt_id: state.pending_prompt.clone().unwrap_or_default(),
                }
            } else if self.shared.messages.is_running() {
                match state.trace_id.clone() {
                    Some(trace_id) if state.stream_open => {
                        let message = ChatMessage::user(trimmed.clone(), Vec::new());
                        let message_id = message.id.clone();
                        self.shared.messages.push(message);
                        Routed::Steer {
                            trace_id,
                            message_id,
                        }
                    }
                    _ => {
                        return Err(ClientError::Busy(
                            "Waiting for the run to start".to_string(),
                        ))
                    }
                }
            } else {
                self.start_turn(&mut state, trimmed.clone());
                Routed::Started
            };

            if text.is_none() {
                state.input.clear();
            }
            (trimmed, routed)
        };

        match routed {
            Routed::Started => Ok(SubmitOutcome::Started),
            Routed::Steer {
                trace_id,
                message_id,
            } => self.steer(trace_id, message_id, &text, None).await,
            Routed::Respond { prompt_id } => self.handle_respond(&prompt_id, &text).await,
        }
    }

    /// Answer the pending ask-user prompt
    ///
    /// The answer is appended as a user message. If the stream is still
    /// open it is delivered by steering; otherwise a new turn starts on the
    /// same session.
    pub async fn handle_respond(&self, prompt_id: &str, answer: &str) -> Result<SubmitOutcome> {
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(ClientError::Validation(
                "Answer must not be empty".to_string(),
            ));
        }

        let (trace_id, message_id) = {
            let mut state = self.shared.state();
            if state.pending_prompt.as_deref() != Some(prompt_id) {
                return Err(ClientError::PromptMismatch(prompt_id.to_string()));
            }
            state.pending_prompt = None;

            match state.trace_id.clone() {
                Some(trace_id) if state.stream_open && self.shared.messages.is_running() => {
                    let message = ChatMessage::user(answer, Vec::new());
                    let message_id = message.id.clone();
                    self.shared.messages.push(message);
                    self.shared.set_phase(&mut state, TurnPhase::Streaming);
                    (trace_id, message_id)
                }
                _ => {
                    self.start_turn(&mut state, answer.to_string());
                    return Ok(SubmitOutcome::Started);
                }
            }
        };

        self.steer(trace_id, message_id, answer, Some(prompt_id))
            .await
    }

    async fn steer(
        &self,
        trace_id: String,
        message_id: String,
        text: &str,
        prompt_id: Option<&str>,
    ) -> Result<SubmitOutcome> {
        let generation = self.shared.state().generation;

        match self.shared.stream.steer(&trace_id, text).await {
            Ok(()) => {
                tracing::info!(trace_id = %trace_id, "Steering message sent");
                Ok(SubmitOutcome::Steered { trace_id })
            }
            Err(e) => {
                tracing::warn!(trace_id = %trace_id, error = %e, "Steering failed");
                let detail = failure_text(&e);
                self.shared
                    .messages
                    .update(&message_id, &mut |m| m.error = Some(detail.clone()));

                // Put the prompt back so the answer can be retried
                if let Some(prompt_id) = prompt_id {
                    let mut state = self.shared.state();
                    if state.generation == generation && state.phase == TurnPhase::Streaming {
                        state.pending_prompt = Some(prompt_id.to_string());
                        self.shared
                            .set_phase(&mut state, TurnPhase::AwaitingUserInput);
                    }
                }
                Err(e)
            }
        }
    }

    fn start_turn(&self, state: &mut TurnState, text: String) {
        let session_id = self.session_id();
        let files = std::mem::take(&mut state.uploads);
        self.shared
            .messages
            .push(ChatMessage::user(text.clone(), files.clone()));

        state.generation += 1;
        state.trace_id = None;
        state.assistant_id = None;
        state.pending_prompt = None;
        state.stream_open = true;
        self.shared.set_phase(state, TurnPhase::Submitting);
        self.shared.messages.set_running(true);

        let request = TurnRequest {
            request: text,
            session_id: session_id.clone(),
            uploaded_files: files,
        };
        let generation = state.generation;
        let handle = tokio::spawn(run_turn(self.shared.clone(), generation, request));
        state.abort = Some(handle.abort_handle());
        state.task = Some(handle);

        tracing::info!(
            session_id = %session_id,
            generation,
            transport = self.shared.stream.name(),
            "Turn started"
        );
    }

    /// Abort the in-flight turn
    ///
    /// Partial assistant output stays as it is and is not marked as an
    /// error. Returns false when nothing was running.
    pub fn stop(&self) -> bool {
        let mut state = self.shared.state();
        if !state.phase.is_active() && !self.shared.messages.is_running() {
            return false;
        }

        if let Some(abort) = state.abort.take() {
            abort.abort();
        }
        state.generation += 1;
        state.pending_prompt = None;
        self.shared.finish(&mut state, TurnPhase::Cancelled);
        tracing::info!(trace_id = ?state.trace_id, "Turn stopped");
        true
    }

    /// Wait for the current turn task to finish
    pub async fn wait(&self) {
        let handle = self.shared.state().task.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Restore the current session's history into the message list
    ///
    /// Returns the number of restored messages. History that arrives after
    /// a turn has already started is discarded.
    pub async fn mount(&self) -> usize {
        let session_id = self.session_id();
        let messages = restore::restore(self.sessions.as_ref(), &session_id).await;

        let _state = self.shared.state();
        if self.shared.messages.is_running() || self.session_id() != session_id {
            return 0;
        }
        let count = messages.len();
        self.shared.messages.replace_all(messages);
        count
    }

    /// Start over with a fresh session id and an empty message list
    ///
    /// Refused (returns `Ok(false)`, nothing changes) while a turn runs.
    pub fn new_chat(&self) -> Result<bool> {
        let mut state = self.shared.state();
        if self.shared.messages.is_running() {
            tracing::debug!("New chat refused while a turn is running");
            return Ok(false);
        }

        let session_id = self.slot().renew()?.to_string();
        self.reset_turn(&mut state);
        self.shared.messages.replace_all(Vec::new());
        tracing::info!(session_id = %session_id, "New chat");
        Ok(true)
    }

    /// Switch to a historical session and restore it
    ///
    /// Refused (returns `Ok(false)`, no state change, no network call)
    /// while a turn runs.
    pub async fn switch_session(&self, session_id: &str) -> Result<bool> {
        {
            let mut state = self.shared.state();
            if self.shared.messages.is_running() {
                tracing::debug!(session_id = %session_id, "Session switch refused while a turn is running");
                return Ok(false);
            }
            self.slot().switch_to(session_id)?;
            self.reset_turn(&mut state);
            self.shared.messages.replace_all(Vec::new());
        }

        let count = self.mount().await;
        tracing::info!(session_id = %session_id, restored = count, "Switched session");
        Ok(true)
    }

    /// Remove one message by id
    pub fn remove_message(&self, id: &str) -> bool {
        let mut state = self.shared.state();
        if state.assistant_id.as_deref() == Some(id) {
            state.assistant_id = None;
        }
        self.shared.messages.remove(id)
    }

    /// Clear the message list, keeping the session id
    ///
    /// Refused while a turn runs.
    pub fn reset(&self) -> bool {
        let mut state = self.shared.state();
        if self.shared.messages.is_running() {
            return false;
        }
        self.reset_turn(&mut state);
        self.shared.messages.replace_all(Vec::new());
        true
    }

    fn reset_turn(&self, state: &mut TurnState) {
        state.generation += 1;
        state.trace_id = None;
        state.assistant_id = None;
        state.pending_prompt = None;
        state.stream_open = false;
        state.uploads.clear();
        state.abort = None;
        state.task = None;
        self.shared.set_phase(state, TurnPhase::Idle);
    }
}

impl Drop for ChatEngine {
    fn drop(&mut self) {
        if let Some(abort) = self.shared.state().abort.take() {
            abort.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::scripted::ScriptedAdapter;
    use crate::session::{ChatSurface, MemorySessionStore};
    use crate::store::ChatStore;
    use crate::types::Role;
    use serde_json::json;

    fn engine() -> (ChatEngine, Arc<ChatStore>, Arc<ScriptedAdapter>) {
        let store = Arc::new(ChatStore::new());
        let adapter = Arc::new(ScriptedAdapter::new());
        let slot = SessionSlot::open(
            ChatSurface::PublishedAgent("agent-1".into()),
            Arc::new(MemorySessionStore::default()),
        )
        .unwrap();
        let engine = ChatEngine::new(store.clone(), adapter.clone(), slot)
            .with_session_source(adapter.clone());
        (engine, store, adapter)
    }

    #[tokio::test]
    async fn test_empty_submit_rejected() {
        let (engine, store, adapter) = engine();
        let err = engine.submit(Some("   ")).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert!(store.is_empty());
        assert!(adapter.requests().is_empty());
        assert_eq!(engine.phase(), TurnPhase::Idle);
    }

    #[tokio::test]
    async fn test_submit_streams_into_assistant_message() {
        let (engine, store, adapter) = engine();
        adapter.push_turn(vec![
            WireEvent::new("run_started", json!({"trace_id": "tr-1"})),
            WireEvent::new("text_delta", json!({"text": "Hel"})),
            WireEvent::new("heartbeat", json!({})),
            WireEvent::new("text_delta", json!({"text": "lo"})),
            WireEvent::new("complete", json!({"success": true, "answer": "ignored"})),
        ]);

        assert_eq!(engine.submit(Some("hi")).await.unwrap(), SubmitOutcome::Started);
        engine.wait().await;

        let messages = store.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "hi");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "Hello");
        assert_eq!(messages[1].trace_id.as_deref(), Some("tr-1"));
        assert_eq!(messages[1].stream_events.len(), 1);
        assert_eq!(messages[1].stream_events[0].kind, "complete");
        assert!(!store.is_running());
        assert_eq!(engine.phase(), TurnPhase::Completed);
        assert_eq!(adapter.requests()[0].session_id, engine.session_id());
    }

    #[tokio::test]
    async fn test_bound_input_is_used_and_cleared() {
        let (engine, store, adapter) = engine();
        adapter.push_turn(vec![WireEvent::new("complete", json!({"answer": "ok"}))]);

        engine.set_input("  from the field ");
        engine.submit(None).await.unwrap();
        engine.wait().await;

        assert_eq!(engine.input(), "");
        assert_eq!(store.messages()[0].content, "from the field");
        assert_eq!(store.messages()[1].content, "ok");
    }

    #[tokio::test]
    async fn test_uploads_cleared_after_submit() {
        let (engine, store, adapter) = engine();
        adapter.push_turn(vec![WireEvent::new("complete", json!({}))]);

        engine.attach_file(UploadedFile::new("f1", "data.csv"));
        engine.submit(Some("analyze")).await.unwrap();
        engine.wait().await;

        assert!(engine.uploaded_files().is_empty());
        assert_eq!(store.messages()[0].attached_files[0].file_id, "f1");
        assert_eq!(adapter.requests()[0].uploaded_files.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_request_sets_error() {
        let (engine, store, adapter) = engine();
        adapter.push_rejection(ClientError::Api {
            status: 404,
            detail: "Published agent not found".to_string(),
        });

        engine.submit(Some("hi")).await.unwrap();
        engine.wait().await;

        let last = store.last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.error.as_deref(), Some("Published agent not found"));
        assert!(!store.is_running());
        assert_eq!(engine.phase(), TurnPhase::Errored);
    }

    #[tokio::test]
    async fn test_busy_before_trace_known() {
        let (engine, store, adapter) = engine();
        let _feed = adapter.push_live();

        engine.submit(Some("first")).await.unwrap();
        let err = engine.submit(Some("second")).await.unwrap_err();
        assert!(matches!(err, ClientError::Busy(_)));
        assert_eq!(store.len(), 1);
        engine.stop();
    }

    #[tokio::test]
    async fn test_stop_when_idle() {
        let (engine, _, _) = engine();
        assert!(!engine.stop());
    }

    #[tokio::test]
    async fn test_new_chat_renews_session() {
        let (engine, store, adapter) = engine();
        adapter.push_turn(vec![WireEvent::new("complete", json!({"answer": "a"}))]);
        engine.submit(Some("q")).await.unwrap();
        engine.wait().await;

        let before = engine.session_id();
        assert!(engine.new_chat().unwrap());
        assert_ne!(engine.session_id(), before);
        assert!(store.is_empty());
        assert_eq!(engine.phase(), TurnPhase::Idle);
        assert!(engine.trace_id().is_none());
    }

    #[tokio::test]
    async fn test_remove_and_reset() {
        let (engine, store, adapter) = engine();
        adapter.push_turn(vec![WireEvent::new("complete", json!({"answer": "a"}))]);
        engine.submit(Some("q")).await.unwrap();
        engine.wait().await;

        let user_id = store.messages()[0].id.clone();
        assert!(engine.remove_message(&user_id));
        assert_eq!(store.len(), 1);

        let session = engine.session_id();
        assert!(engine.reset());
        assert!(store.is_empty());
        assert_eq!(engine.session_id(), session);
    }

    #[tokio::test]
    async fn test_non_streaming_mode() {
        let store = Arc::new(ChatStore::new());
        let adapter = Arc::new(ScriptedAdapter::non_streaming());
        let slot = SessionSlot::open(ChatSurface::SkillFinder, Arc::new(MemorySessionStore::default()))
            .unwrap();
        let engine = ChatEngine::new(store.clone(), adapter.clone(), slot);

        adapter.push_turn(vec![
            WireEvent::new("run_started", json!({"trace_id": "tr-9"})),
            WireEvent::new("output_file", json!({"file_id": "f", "filename": "out.txt"})),
            WireEvent::new("complete", json!({"success": true, "answer": "All done"})),
        ]);

        engine.submit(Some("go")).await.unwrap();
        engine.wait().await;

        let last = store.last().unwrap();
        assert_eq!(last.content, "All done");
        assert_eq!(last.trace_id.as_deref(), Some("tr-9"));
        assert_eq!(last.stream_events[0].kind, "output_file");
        assert_eq!(last.stream_events[0].data["filename"], "out.txt");
        assert!(last.error.is_none());
        assert_eq!(engine.phase(), TurnPhase::Completed);
    }
}

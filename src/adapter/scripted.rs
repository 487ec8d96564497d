//! Scripted in-process stream adapter
//!
//! Plays back queued turns without any network. Turns are either a fixed
//! list of events or a live feed the caller pushes into while the engine
//! is consuming it. Useful for tests and offline demos.

use super::{EventStream, SessionSource, StreamAdapter};
use crate::error::{ClientError, Result};
use crate::types::{ApiResponseMode, SessionRecord, TurnRequest, WireEvent};
use async_trait::async_trait;
use futures::stream::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

enum ScriptedTurn {
    Events(Vec<Result<WireEvent>>),
    Live(mpsc::UnboundedReceiver<Result<WireEvent>>),
    Reject(ClientError),
}

/// Sender half of a live scripted turn
///
/// Dropping the feed (or calling `close`) ends the turn's stream.
pub struct LiveFeed {
    tx: mpsc::UnboundedSender<Result<WireEvent>>,
}

impl LiveFeed {
    /// Deliver an event; returns false once the consumer has gone away
    pub fn send(&self, event: WireEvent) -> bool {
        self.tx.send(Ok(event)).is_ok()
    }

    /// Deliver a transport failure
    pub fn fail(&self, message: &str) -> bool {
        self.tx
            .send(Err(ClientError::Transport(message.to_string())))
            .is_ok()
    }

    /// Whether the consumer dropped the stream (e.g., after stop)
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn close(self) {}
}

/// In-process adapter that replays queued turns
#[derive(Default)]
pub struct ScriptedAdapter {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    requests: Mutex<Vec<TurnRequest>>,
    steered: Mutex<Vec<(String, String)>>,
    steer_failures: Mutex<VecDeque<ClientError>>,
    sessions: Mutex<HashMap<String, SessionRecord>>,
    session_fetches: AtomicUsize,
    mode: ApiResponseMode,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapter whose turns run through `run_sync`
    pub fn non_streaming() -> Self {
        Self {
            mode: ApiResponseMode::NonStreaming,
            ..Self::default()
        }
    }

    /// Queue a turn that emits the given events and then ends
    pub fn push_turn(&self, events: Vec<WireEvent>) {
        lock(&self.turns).push_back(ScriptedTurn::Events(events.into_iter().map(Ok).collect()));
    }

    /// Queue a turn that emits the given events, then fails mid-stream
    pub fn push_failing_turn(&self, events: Vec<WireEvent>, message: &str) {
        let mut items: Vec<Result<WireEvent>> = events.into_iter().map(Ok).collect();
        items.push(Err(ClientError::Transport(message.to_string())));
        lock(&self.turns).push_back(ScriptedTurn::Events(items));
    }

    /// Queue a turn the caller feeds event by event
    pub fn push_live(&self) -> LiveFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.turns).push_back(ScriptedTurn::Live(rx));
        LiveFeed { tx }
    }

    /// Queue a turn whose request is rejected before streaming starts
    pub fn push_rejection(&self, error: ClientError) {
        lock(&self.turns).push_back(ScriptedTurn::Reject(error));
    }

    /// Make the next steer call fail
    pub fn fail_next_steer(&self, error: ClientError) {
        lock(&self.steer_failures).push_back(error);
    }

    pub fn insert_session(&self, record: SessionRecord) {
        lock(&self.sessions).insert(record.session_id.clone(), record);
    }

    /// Requests received so far, in order
    pub fn requests(&self) -> Vec<TurnRequest> {
        lock(&self.requests).clone()
    }

    /// Steering messages received so far as `(trace_id, message)`
    pub fn steered(&self) -> Vec<(String, String)> {
        lock(&self.steered).clone()
    }

    /// Number of `fetch_session` calls, found or not
    pub fn session_fetches(&self) -> usize {
        self.session_fetches.load(Ordering::SeqCst)
    }

    pub fn pending_turns(&self) -> usize {
        lock(&self.turns).len()
    }
}

#[async_trait]
impl StreamAdapter for ScriptedAdapter {
    async fn run_stream(&self, request: &TurnRequest) -> Result<EventStream> {
        lock(&self.requests).push(request.clone());

        let turn = lock(&self.turns).pop_front();
        match turn {
            Some(ScriptedTurn::Events(items)) => Ok(futures::stream::iter(items).boxed()),
            Some(ScriptedTurn::Live(rx)) => Ok(UnboundedReceiverStream::new(rx).boxed()),
            Some(ScriptedTurn::Reject(error)) => Err(error),
            None => Err(ClientError::Config(format!(
                "No scripted turn queued for request '{}'",
                request.request
            ))),
        }
    }

    async fn steer(&self, trace_id: &str, message: &str) -> Result<()> {
        if let Some(error) = lock(&self.steer_failures).pop_front() {
            return Err(error);
        }
        lock(&self.steered).push((trace_id.to_string(), message.to_string()));
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn response_mode(&self) -> ApiResponseMode {
        self.mode
    }
}

#[async_trait]
impl SessionSource for ScriptedAdapter {
    async fn fetch_session(&self, session_id: &str) -> Result<SessionRecord> {
        self.session_fetches.fetch_add(1, Ordering::SeqCst);
        lock(&self.sessions)
            .get(session_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("Session not found: {}", session_id)))
    }
}

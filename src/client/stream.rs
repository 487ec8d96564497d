//! Agent turn endpoints: SSE chat streams, single-shot runs and steering

use super::ApiClient;
use crate::adapter::EventStream;
use crate::error::Result;
use crate::sse;
use crate::types::{SyncResponse, TurnRequest};
use reqwest::header::ACCEPT;

/// Which chat endpoints a turn goes through
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEndpoint {
    /// Public chat of a published agent
    Published(String),
    /// Built-in panel agent (skill finder, agent builder, ...)
    Panel,
}

impl ChatEndpoint {
    fn stream_path(&self) -> String {
        match self {
            ChatEndpoint::Published(agent_id) => format!("/published/{}/chat", agent_id),
            ChatEndpoint::Panel => "/agent/run/stream".to_string(),
        }
    }

    fn sync_path(&self) -> String {
        match self {
            ChatEndpoint::Published(agent_id) => format!("/published/{}/chat/sync", agent_id),
            ChatEndpoint::Panel => "/agent/run".to_string(),
        }
    }

    fn steer_path(&self, trace_id: &str) -> String {
        match self {
            ChatEndpoint::Published(agent_id) => {
                format!("/published/{}/chat/{}/steer", agent_id, trace_id)
            }
            ChatEndpoint::Panel => format!("/agent/run/{}/steer", trace_id),
        }
    }
}

impl ApiClient {
    /// Start a streaming turn and decode its server-sent events
    ///
    /// No client-side timeout applies to the stream. Dropping the returned
    /// stream closes the connection.
    pub async fn open_chat_stream(
        &self,
        endpoint: &ChatEndpoint,
        request: &TurnRequest,
    ) -> Result<EventStream> {
        let path = endpoint.stream_path();
        let url = self.url(&path);
        let response = self
            .execute(&path, true, |http| {
                http.post(&url)
                    .header(ACCEPT, "text/event-stream")
                    .json(request)
            })
            .await?;

        tracing::debug!(path = %path, session_id = %request.session_id, "Chat stream opened");
        Ok(sse::decode(response.bytes_stream()))
    }

    /// Run a whole turn in one request
    pub async fn chat_sync(
        &self,
        endpoint: &ChatEndpoint,
        request: &TurnRequest,
    ) -> Result<SyncResponse> {
        self.post_json(&endpoint.sync_path(), request).await
    }

    /// Send a steering message to a running turn
    pub async fn steer(&self, endpoint: &ChatEndpoint, trace_id: &str, message: &str) -> Result<()> {
        let body = serde_json::json!({ "message": message });
        let _: serde_json::Value = self.post_json(&endpoint.steer_path(trace_id), &body).await?;
        tracing::debug!(trace_id = %trace_id, "Steering message delivered");
        Ok(())
    }
}

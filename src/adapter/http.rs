//! HTTP transport for chat turns
//!
//! Runs turns against the platform API through `ApiClient`: SSE for
//! streaming turns, the `/sync` endpoint for non-streaming published agents,
//! and the matching session endpoint for history.

use super::{EventStream, SessionSource, StreamAdapter};
use crate::client::stream::ChatEndpoint;
use crate::client::ApiClient;
use crate::error::Result;
use crate::types::{ApiResponseMode, SessionRecord, SyncResponse, TurnRequest};
use async_trait::async_trait;

/// Stream adapter backed by the platform HTTP API
#[derive(Clone)]
pub struct HttpStreamAdapter {
    client: ApiClient,
    endpoint: ChatEndpoint,
    mode: ApiResponseMode,
}

impl HttpStreamAdapter {
    /// Adapter for a published agent's public chat
    pub fn published(client: ApiClient, agent_id: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: ChatEndpoint::Published(agent_id.into()),
            mode: ApiResponseMode::Streaming,
        }
    }

    /// Adapter for the built-in panel agent
    pub fn panel(client: ApiClient) -> Self {
        Self {
            client,
            endpoint: ChatEndpoint::Panel,
            mode: ApiResponseMode::Streaming,
        }
    }

    /// Set the response mode, usually from the agent's published settings
    pub fn with_mode(mut self, mode: ApiResponseMode) -> Self {
        self.mode = mode;
        self
    }

    /// Look up the published agent and adopt its response mode
    ///
    /// Panel adapters are returned unchanged.
    pub async fn discover_mode(self) -> Result<Self> {
        let ChatEndpoint::Published(agent_id) = &self.endpoint else {
            return Ok(self);
        };
        let info = self.client.get_published_agent(agent_id).await?;
        let mode = info.api_response_mode.unwrap_or_default();
        tracing::debug!(agent_id = %agent_id, mode = ?mode, "Published agent mode");
        Ok(self.with_mode(mode))
    }

    pub fn endpoint(&self) -> &ChatEndpoint {
        &self.endpoint
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}

#[async_trait]
impl StreamAdapter for HttpStreamAdapter {
    async fn run_stream(&self, request: &TurnRequest) -> Result<EventStream> {
        self.client.open_chat_stream(&self.endpoint, request).await
    }

    async fn steer(&self, trace_id: &str, message: &str) -> Result<()> {
        self.client.steer(&self.endpoint, trace_id, message).await
    }

    fn name(&self) -> &str {
        "http"
    }

    fn response_mode(&self) -> ApiResponseMode {
        self.mode
    }

    async fn run_sync(&self, request: &TurnRequest) -> Result<SyncResponse> {
        self.client.chat_sync(&self.endpoint, request).await
    }
}

#[async_trait]
impl SessionSource for HttpStreamAdapter {
    async fn fetch_session(&self, session_id: &str) -> Result<SessionRecord> {
        match &self.endpoint {
            ChatEndpoint::Published(agent_id) => {
                self.client
                    .get_published_session(agent_id, session_id)
                    .await
            }
            ChatEndpoint::Panel => self.client.get_session(session_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;

    #[test]
    fn test_constructors() {
        let client = ApiClient::new(&ClientConfig::default()).unwrap();
        let adapter = HttpStreamAdapter::published(client.clone(), "agent-1")
            .with_mode(ApiResponseMode::NonStreaming);
        assert_eq!(adapter.name(), "http");
        assert_eq!(adapter.response_mode(), ApiResponseMode::NonStreaming);
        assert_eq!(
            adapter.endpoint(),
            &ChatEndpoint::Published("agent-1".to_string())
        );

        let panel = HttpStreamAdapter::panel(client);
        assert_eq!(panel.response_mode(), ApiResponseMode::Streaming);
    }
}

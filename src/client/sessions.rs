//! Session history endpoints

use super::ApiClient;
use crate::error::Result;
use crate::types::SessionRecord;

impl ApiClient {
    /// Chat-panel session by id
    pub async fn get_session(&self, session_id: &str) -> Result<SessionRecord> {
        self.get_json(&format!("/sessions/{}", session_id)).await
    }

    /// Session of a published agent's public chat
    pub async fn get_published_session(
        &self,
        agent_id: &str,
        session_id: &str,
    ) -> Result<SessionRecord> {
        self.get_json(&format!("/published/{}/sessions/{}", agent_id, session_id))
            .await
    }
}

//! Channel binding endpoints (`/channels`)
//!
//! A binding routes messages from an external chat (Feishu group, Telegram
//! chat, webhook) to an agent. Adapter endpoints report and restart the
//! server-side connections to those platforms.

use super::ApiClient;
use crate::error::{ClientError, Result};
use crate::types::deserialize_utc;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const MAX_NAME_LEN: usize = 128;
const MAX_EXTERNAL_ID_LEN: usize = 256;
const MAX_TRIGGER_LEN: usize = 512;
const DEFAULT_MESSAGES_LIMIT: u32 = 50;
const MAX_MESSAGES_LIMIT: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Feishu,
    Telegram,
    Webhook,
}

impl ChannelType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelType::Feishu => "feishu",
            ChannelType::Telegram => "telegram",
            ChannelType::Webhook => "webhook",
        }
    }
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelBinding {
    pub id: String,
    pub channel_type: ChannelType,
    pub external_id: String,
    pub name: String,
    pub agent_id: String,
    #[serde(default)]
    pub trigger_pattern: Option<String>,
    pub enabled: bool,
    #[serde(default)]
    pub config: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(deserialize_with = "deserialize_utc")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_utc")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelBindingList {
    pub bindings: Vec<ChannelBinding>,
    pub total: usize,
}

/// Fields for a new binding
#[derive(Debug, Clone, Serialize)]
pub struct NewChannelBinding {
    pub channel_type: ChannelType,
    pub external_id: String,
    pub name: String,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Map<String, serde_json::Value>>,
}

impl NewChannelBinding {
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        let len = self.external_id.chars().count();
        if len == 0 || len > MAX_EXTERNAL_ID_LEN {
            return Err(ClientError::Validation(format!(
                "external_id must be 1-{} characters",
                MAX_EXTERNAL_ID_LEN
            )));
        }
        if self.agent_id.trim().is_empty() {
            return Err(ClientError::Validation("agent_id is required".to_string()));
        }
        validate_trigger(self.trigger_pattern.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelBindingUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ChannelBindingUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        validate_trigger(self.trigger_pattern.as_deref())
    }
}

/// A message received from or sent to an external chat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub id: String,
    pub channel_binding_id: String,
    /// `inbound` or `outbound`
    pub direction: String,
    #[serde(default)]
    pub external_message_id: Option<String>,
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
    pub content: String,
    pub message_type: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(deserialize_with = "deserialize_utc")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelMessageList {
    pub messages: Vec<ChannelMessage>,
    pub total: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestartResponse {
    pub message: String,
    pub connected: bool,
}

fn validate_name(name: &str) -> Result<()> {
    let len = name.chars().count();
    if len == 0 || len > MAX_NAME_LEN {
        return Err(ClientError::Validation(format!(
            "Binding name must be 1-{} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(())
}

fn validate_trigger(pattern: Option<&str>) -> Result<()> {
    match pattern {
        Some(p) if p.chars().count() > MAX_TRIGGER_LEN => Err(ClientError::Validation(format!(
            "trigger_pattern must be at most {} characters",
            MAX_TRIGGER_LEN
        ))),
        _ => Ok(()),
    }
}

impl ApiClient {
    pub async fn list_bindings(
        &self,
        channel_type: Option<ChannelType>,
    ) -> Result<ChannelBindingList> {
        let query: Vec<(&str, String)> = channel_type
            .map(|t| vec![("channel_type", t.as_str().to_string())])
            .unwrap_or_default();
        self.get_json_query("/channels", &query).await
    }

    pub async fn get_binding(&self, binding_id: &str) -> Result<ChannelBinding> {
        self.get_json(&format!("/channels/{}", binding_id)).await
    }

    pub async fn create_binding(&self, binding: &NewChannelBinding) -> Result<ChannelBinding> {
        binding.validate()?;
        self.post_json("/channels", binding).await
    }

    pub async fn update_binding(
        &self,
        binding_id: &str,
        update: &ChannelBindingUpdate,
    ) -> Result<ChannelBinding> {
        update.validate()?;
        self.put_json(&format!("/channels/{}", binding_id), update)
            .await
    }

    pub async fn delete_binding(&self, binding_id: &str) -> Result<()> {
        self.delete(&format!("/channels/{}", binding_id)).await
    }

    /// Flip the binding between enabled and disabled
    pub async fn toggle_binding(&self, binding_id: &str) -> Result<ChannelBinding> {
        self.post_empty(&format!("/channels/{}/toggle", binding_id))
            .await
    }

    /// Message history, newest first
    pub async fn binding_messages(
        &self,
        binding_id: &str,
        limit: Option<u32>,
        offset: u32,
    ) -> Result<ChannelMessageList> {
        let limit = limit.unwrap_or(DEFAULT_MESSAGES_LIMIT);
        if limit == 0 || limit > MAX_MESSAGES_LIMIT {
            return Err(ClientError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_MESSAGES_LIMIT
            )));
        }
        self.get_json_query(
            &format!("/channels/{}/messages", binding_id),
            &[("limit", limit.to_string()), ("offset", offset.to_string())],
        )
        .await
    }

    /// Connection state of each server-side adapter, keyed by adapter name
    pub async fn adapter_status(&self) -> Result<HashMap<String, bool>> {
        self.get_json("/channels/adapters").await
    }

    pub async fn restart_adapter(&self, adapter: &str) -> Result<RestartResponse> {
        let response: RestartResponse = self
            .post_empty(&format!("/channels/adapters/{}/restart", adapter))
            .await?;
        tracing::info!(adapter = %adapter, connected = response.connected, "Adapter restarted");
        Ok(response)
    }
}

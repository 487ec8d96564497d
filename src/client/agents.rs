//! Agent preset endpoints (`/agents`) and public published-agent info

use super::ApiClient;
use crate::error::{ClientError, Result};
use crate::types::{deserialize_utc, ApiResponseMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MAX_NAME_LEN: usize = 128;
const MAX_TURNS_LIMIT: u32 = 60_000;

/// A configured agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPreset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub skill_ids: Option<Vec<String>>,
    #[serde(default)]
    pub mcp_servers: Option<Vec<String>>,
    #[serde(default)]
    pub builtin_tools: Option<Vec<String>>,
    pub max_turns: u32,
    #[serde(default)]
    pub model_provider: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub executor_name: Option<String>,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub api_response_mode: Option<ApiResponseMode>,
    #[serde(deserialize_with = "deserialize_utc")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_utc")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentPresetList {
    pub presets: Vec<AgentPreset>,
    pub total: usize,
}

/// Fields for a new agent preset
#[derive(Debug, Clone, Serialize)]
pub struct NewAgentPreset {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcp_servers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub builtin_tools: Option<Vec<String>>,
    pub max_turns: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_name: Option<String>,
}

impl NewAgentPreset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            system_prompt: None,
            skill_ids: None,
            mcp_servers: None,
            builtin_tools: None,
            max_turns: 60,
            model_provider: None,
            model_name: None,
            executor_name: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        validate_max_turns(self.max_turns)
    }
}

/// Partial update; unset fields are left unchanged
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentPresetUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcp_servers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub builtin_tools: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor_name: Option<String>,
}

impl AgentPresetUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(max_turns) = self.max_turns {
            validate_max_turns(max_turns)?;
        }
        Ok(())
    }
}

/// Public view of a published agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedAgentInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub api_response_mode: Option<ApiResponseMode>,
}

fn validate_name(name: &str) -> Result<()> {
    let len = name.trim().chars().count();
    if len == 0 || len > MAX_NAME_LEN {
        return Err(ClientError::Validation(format!(
            "Agent name must be 1-{} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(())
}

fn validate_max_turns(max_turns: u32) -> Result<()> {
    if max_turns == 0 || max_turns > MAX_TURNS_LIMIT {
        return Err(ClientError::Validation(format!(
            "max_turns must be between 1 and {}",
            MAX_TURNS_LIMIT
        )));
    }
    Ok(())
}

impl ApiClient {
    /// List agent presets, optionally only system (or only user) presets
    pub async fn list_agents(&self, is_system: Option<bool>) -> Result<AgentPresetList> {
        let query: Vec<(&str, String)> = is_system
            .map(|v| vec![("is_system", v.to_string())])
            .unwrap_or_default();
        self.get_json_query("/agents", &query).await
    }

    pub async fn get_agent(&self, preset_id: &str) -> Result<AgentPreset> {
        self.get_json(&format!("/agents/{}", preset_id)).await
    }

    pub async fn get_agent_by_name(&self, name: &str) -> Result<AgentPreset> {
        self.get_json(&format!("/agents/by-name/{}", name)).await
    }

    pub async fn create_agent(&self, preset: &NewAgentPreset) -> Result<AgentPreset> {
        preset.validate()?;
        self.post_json("/agents", preset).await
    }

    pub async fn update_agent(
        &self,
        preset_id: &str,
        update: &AgentPresetUpdate,
    ) -> Result<AgentPreset> {
        update.validate()?;
        self.put_json(&format!("/agents/{}", preset_id), update)
            .await
    }

    /// Delete a preset; system presets are rejected by the server
    pub async fn delete_agent(&self, preset_id: &str) -> Result<()> {
        self.delete(&format!("/agents/{}", preset_id)).await
    }

    /// Publish an agent for public chat with the given response mode
    pub async fn publish_agent(
        &self,
        preset_id: &str,
        mode: ApiResponseMode,
    ) -> Result<AgentPreset> {
        let body = serde_json::json!({ "api_response_mode": mode });
        let preset: AgentPreset = self
            .post_json(&format!("/agents/{}/publish", preset_id), &body)
            .await?;
        tracing::info!(agent_id = %preset_id, mode = ?mode, "Agent published");
        Ok(preset)
    }

    pub async fn unpublish_agent(&self, preset_id: &str) -> Result<AgentPreset> {
        self.post_empty(&format!("/agents/{}/unpublish", preset_id))
            .await
    }

    /// Public info for a published agent; unpublished agents are not found
    pub async fn get_published_agent(&self, agent_id: &str) -> Result<PublishedAgentInfo> {
        self.get_json(&format!("/published/{}", agent_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_preset_validation() {
        assert!(NewAgentPreset::new("Researcher").validate().is_ok());
        assert!(NewAgentPreset::new("  ").validate().is_err());
        assert!(NewAgentPreset::new("x".repeat(129)).validate().is_err());

        let mut preset = NewAgentPreset::new("Researcher");
        preset.max_turns = 0;
        assert!(preset.validate().is_err());
        preset.max_turns = 60_001;
        assert!(preset.validate().is_err());
    }

    #[test]
    fn test_update_serializes_only_set_fields() {
        let update = AgentPresetUpdate {
            max_turns: Some(10),
            ..Default::default()
        };
        assert!(update.validate().is_ok());
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            serde_json::json!({"max_turns": 10})
        );
    }

    #[test]
    fn test_preset_deserializes() {
        let preset: AgentPreset = serde_json::from_value(serde_json::json!({
            "id": "p1",
            "name": "Writer",
            "max_turns": 60,
            "is_system": false,
            "is_published": true,
            "api_response_mode": "non_streaming",
            "created_at": "2025-01-01T00:00:00.482913",
            "updated_at": "2025-01-02T00:00:00.001200"
        }))
        .unwrap();
        assert!(preset.is_published);
        assert_eq!(preset.api_response_mode, Some(ApiResponseMode::NonStreaming));
        assert!(preset.skill_ids.is_none());
        assert_eq!(preset.created_at.to_rfc3339(), "2025-01-01T00:00:00.482913+00:00");
    }
}

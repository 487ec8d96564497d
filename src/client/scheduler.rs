//! Scheduled task endpoints (`/scheduled-tasks`)
//!
//! Create and update requests are validated locally with the same rules the
//! platform applies, so a bad cron expression never costs a round trip.

use super::ApiClient;
use crate::error::{ClientError, Result};
use crate::schedule::{Schedule, ScheduleType};
use crate::types::{deserialize_utc, deserialize_utc_opt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MAX_NAME_LEN: usize = 128;
const DEFAULT_RUNS_LIMIT: u32 = 50;
const MAX_RUNS_LIMIT: u32 = 200;

/// Whether each run starts fresh or continues a shared session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    #[default]
    Isolated,
    Session,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Paused,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Active => "active",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,
    pub name: String,
    pub agent_id: String,
    #[serde(default)]
    pub agent_name: Option<String>,
    pub prompt: String,
    pub schedule_type: ScheduleType,
    pub schedule_value: String,
    #[serde(default)]
    pub context_mode: ContextMode,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub channel_binding_id: Option<String>,
    pub status: TaskStatus,
    #[serde(default, deserialize_with = "deserialize_utc_opt")]
    pub next_run: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_utc_opt")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_runs: Option<u32>,
    #[serde(default)]
    pub run_count: u32,
    #[serde(deserialize_with = "deserialize_utc")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_utc")]
    pub updated_at: DateTime<Utc>,
}

/// Fields for a new scheduled task
#[derive(Debug, Clone, Serialize)]
pub struct NewScheduledTask {
    pub name: String,
    pub agent_id: String,
    pub prompt: String,
    pub schedule_type: ScheduleType,
    pub schedule_value: String,
    pub context_mode: ContextMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_binding_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_runs: Option<u32>,
}

impl NewScheduledTask {
    pub fn new(
        name: impl Into<String>,
        agent_id: impl Into<String>,
        prompt: impl Into<String>,
        schedule_type: ScheduleType,
        schedule_value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            agent_id: agent_id.into(),
            prompt: prompt.into(),
            schedule_type,
            schedule_value: schedule_value.into(),
            context_mode: ContextMode::default(),
            channel_binding_id: None,
            max_runs: None,
        }
    }

    /// Check every field and return the parsed schedule
    pub fn validate(&self) -> Result<Schedule> {
        validate_name(&self.name)?;
        if self.agent_id.trim().is_empty() {
            return Err(ClientError::Validation("agent_id is required".to_string()));
        }
        validate_prompt(&self.prompt)?;
        validate_max_runs(self.max_runs)?;
        Schedule::parse(self.schedule_type, &self.schedule_value)
    }
}

/// Partial update; unset fields are left unchanged
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScheduledTaskUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_type: Option<ScheduleType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_mode: Option<ContextMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_binding_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_runs: Option<u32>,
}

impl ScheduledTaskUpdate {
    /// Validate the fields being changed
    ///
    /// A new schedule value needs its type: either set here or taken from
    /// `current`, the task's existing type.
    pub fn validate(&self, current: Option<ScheduleType>) -> Result<()> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(prompt) = &self.prompt {
            validate_prompt(prompt)?;
        }
        validate_max_runs(self.max_runs)?;

        match (&self.schedule_value, self.schedule_type.or(current)) {
            (Some(value), Some(kind)) => Schedule::parse(kind, value).map(|_| ()),
            (Some(_), None) => Err(ClientError::Validation(
                "schedule_type is required to change schedule_value".to_string(),
            )),
            (None, Some(_)) if self.schedule_type.is_some() => Err(ClientError::Validation(
                "schedule_value is required to change schedule_type".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// One execution of a scheduled task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRunLog {
    pub id: String,
    pub task_id: String,
    #[serde(deserialize_with = "deserialize_utc")]
    pub started_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_utc_opt")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    pub status: String,
    #[serde(default)]
    pub result_summary: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(deserialize_with = "deserialize_utc")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunNowResponse {
    pub message: String,
    #[serde(default)]
    pub run_log_id: Option<String>,
}

fn validate_name(name: &str) -> Result<()> {
    let len = name.trim().chars().count();
    if len == 0 || len > MAX_NAME_LEN {
        return Err(ClientError::Validation(format!(
            "Task name must be 1-{} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(())
}

fn validate_prompt(prompt: &str) -> Result<()> {
    if prompt.trim().is_empty() {
        return Err(ClientError::Validation("prompt must not be empty".to_string()));
    }
    Ok(())
}

fn validate_max_runs(max_runs: Option<u32>) -> Result<()> {
    if max_runs == Some(0) {
        return Err(ClientError::Validation(
            "max_runs must be at least 1".to_string(),
        ));
    }
    Ok(())
}

impl ApiClient {
    /// List tasks, optionally filtered by status
    pub async fn list_tasks(&self, status: Option<TaskStatus>) -> Result<Vec<ScheduledTask>> {
        let query: Vec<(&str, String)> = status
            .map(|s| vec![("status", s.as_str().to_string())])
            .unwrap_or_default();
        self.get_json_query("/scheduled-tasks", &query).await
    }

    pub async fn get_task(&self, task_id: &str) -> Result<ScheduledTask> {
        self.get_json(&format!("/scheduled-tasks/{}", task_id)).await
    }

    pub async fn create_task(&self, task: &NewScheduledTask) -> Result<ScheduledTask> {
        let schedule = task.validate()?;
        tracing::debug!(
            name = %task.name,
            next_run = ?schedule.next_after(Utc::now()),
            "Creating scheduled task"
        );
        self.post_json("/scheduled-tasks", task).await
    }

    /// Update a task; a changed schedule value is validated against its type
    pub async fn update_task(
        &self,
        task_id: &str,
        update: &ScheduledTaskUpdate,
    ) -> Result<ScheduledTask> {
        let current = if update.schedule_value.is_some() && update.schedule_type.is_none() {
            Some(self.get_task(task_id).await?.schedule_type)
        } else {
            None
        };
        update.validate(current)?;
        self.put_json(&format!("/scheduled-tasks/{}", task_id), update)
            .await
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<()> {
        self.delete(&format!("/scheduled-tasks/{}", task_id)).await
    }

    /// Pause an active task
    pub async fn pause_task(&self, task_id: &str) -> Result<ScheduledTask> {
        self.post_empty(&format!("/scheduled-tasks/{}/pause", task_id))
            .await
    }

    /// Resume a paused task
    pub async fn resume_task(&self, task_id: &str) -> Result<ScheduledTask> {
        self.post_empty(&format!("/scheduled-tasks/{}/resume", task_id))
            .await
    }

    /// Trigger a run immediately, outside the schedule
    pub async fn run_task_now(&self, task_id: &str) -> Result<RunNowResponse> {
        let response: RunNowResponse = self
            .post_empty(&format!("/scheduled-tasks/{}/run-now", task_id))
            .await?;
        tracing::info!(task_id = %task_id, run_log_id = ?response.run_log_id, "Task run triggered");
        Ok(response)
    }

    /// Most recent runs first; `limit` defaults to 50 and may be 1-200
    pub async fn task_runs(&self, task_id: &str, limit: Option<u32>) -> Result<Vec<TaskRunLog>> {
        let limit = limit.unwrap_or(DEFAULT_RUNS_LIMIT);
        if limit == 0 || limit > MAX_RUNS_LIMIT {
            return Err(ClientError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_RUNS_LIMIT
            )));
        }
        self.get_json_query(
            &format!("/scheduled-tasks/{}/runs", task_id),
            &[("limit", limit.to_string())],
        )
        .await
    }
}

//! Core chat types
//!
//! Display-facing types (`ChatMessage`, `StreamEventRecord`) use camelCase
//! JSON, matching what the platform stores in session history. Wire types
//! coming off the event stream keep the backend's snake_case.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single message in the host's message list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Unique message identifier
    pub id: String,

    pub role: Role,

    /// Plain-text content; grows token by token while a turn streams
    pub content: String,

    /// Unix timestamp in milliseconds
    pub timestamp: u64,

    /// Display markers (tool calls, tool results, files, prompts) in arrival order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stream_events: Vec<StreamEventRecord>,

    /// Files uploaded alongside a user message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attached_files: Vec<UploadedFile>,

    /// Trace of the run that produced this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    /// Error surfaced by the run, if it failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatMessage {
    /// Create a user message with a fresh id and timestamp
    pub fn user(content: impl Into<String>, attached_files: Vec<UploadedFile>) -> Self {
        Self {
            id: format!("msg-{}", uuid::Uuid::new_v4()),
            role: Role::User,
            content: content.into(),
            timestamp: now_millis(),
            stream_events: Vec::new(),
            attached_files,
            trace_id: None,
            error: None,
        }
    }

    /// Create an empty assistant message ready to receive stream output
    pub fn assistant() -> Self {
        Self {
            id: format!("msg-{}", uuid::Uuid::new_v4()),
            role: Role::Assistant,
            content: String::new(),
            timestamp: now_millis(),
            stream_events: Vec::new(),
            attached_files: Vec::new(),
            trace_id: None,
            error: None,
        }
    }
}

/// Display record for a non-text stream event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEventRecord {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub timestamp: u64,

    /// Event type (e.g., "tool_call", "output_file")
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub data: serde_json::Value,
}

impl StreamEventRecord {
    /// Create a record with a fresh id and timestamp
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: format!("evt-{}", uuid::Uuid::new_v4()),
            timestamp: now_millis(),
            kind: kind.into(),
            data,
        }
    }
}

/// A file uploaded for the next turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub file_id: String,
    pub filename: String,

    /// Server-side path, when the upload endpoint returned one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl UploadedFile {
    pub fn new(file_id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            filename: filename.into(),
            path: None,
        }
    }
}

/// Message as persisted in server-side session history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    pub role: Role,

    pub content: RawContent,

    #[serde(default, rename = "streamEvents", alias = "stream_events")]
    pub stream_events: Vec<StreamEventRecord>,

    #[serde(default, rename = "attachedFiles", alias = "attached_files")]
    pub attached_files: Vec<UploadedFile>,
}

/// Stored message content: a plain string or an ordered list of blocks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// Typed content block within a stored message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    ToolResult {
        #[serde(default)]
        tool_use_id: String,
        #[serde(default)]
        content: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

/// Server-side session as returned by the session endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(alias = "id")]
    pub session_id: String,

    #[serde(default)]
    pub agent_id: Option<String>,

    #[serde(default)]
    pub messages: Vec<RawMessage>,
}

/// A single event decoded from the chat stream
///
/// The backend sends flat JSON objects: `{"event_type": ..., "turn": n, ...fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    pub event_type: String,

    #[serde(default)]
    pub turn: u32,

    #[serde(flatten)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl WireEvent {
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        let data = match data {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self {
            event_type: event_type.into(),
            turn: 0,
            data,
        }
    }

    /// Classify the event type
    pub fn kind(&self) -> EventKind {
        EventKind::from_name(&self.event_type)
    }

    /// String field, or `None` if absent or not a string
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.data.get(name).and_then(|v| v.as_str())
    }

    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.data.get(name)
    }
}

/// Known stream event types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    RunStarted,
    TurnStart,
    TextDelta,
    Assistant,
    ToolCall,
    ToolResult,
    OutputFile,
    AskUser,
    SteeringReceived,
    Complete,
    Error,
    /// Bookkeeping events with no display (trace_saved, heartbeat, ...)
    Internal,
    Unknown,
}

impl EventKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "run_started" => Self::RunStarted,
            "turn_start" => Self::TurnStart,
            "text_delta" => Self::TextDelta,
            "assistant" => Self::Assistant,
            "tool_call" => Self::ToolCall,
            "tool_result" => Self::ToolResult,
            "output_file" => Self::OutputFile,
            "ask_user" => Self::AskUser,
            "steering_received" => Self::SteeringReceived,
            "complete" => Self::Complete,
            "error" => Self::Error,
            "trace_saved" | "heartbeat" | "turn_complete" | "context_compressed" => Self::Internal,
            _ => Self::Unknown,
        }
    }

    /// Whether the event ends the turn
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

/// How a published agent answers chat requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiResponseMode {
    #[default]
    Streaming,
    NonStreaming,
}

/// Request for one agent turn
#[derive(Debug, Clone, Serialize)]
pub struct TurnRequest {
    pub request: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub uploaded_files: Vec<UploadedFile>,
}

/// Single-shot response for non-streaming turns
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub total_turns: u32,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub output_files: Vec<serde_json::Value>,
}

/// Current time as Unix milliseconds
pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Parse an ISO 8601 datetime; values without an offset are taken as UTC
///
/// The platform stores naive UTC columns, so its responses carry
/// timestamps like `2025-03-01T09:00:00.123456` with no `Z`.
pub fn parse_utc_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// `deserialize_with` for API timestamps (offset or naive UTC)
pub(crate) fn deserialize_utc<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_utc_datetime(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid datetime: {}", raw)))
}

/// Nullable variant of [`deserialize_utc`]; pair with `#[serde(default)]`
pub(crate) fn deserialize_utc_opt<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_utc_datetime(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid datetime: {}", raw))),
        None => Ok(None),
    }
}

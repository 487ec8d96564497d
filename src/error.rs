//! Error types for skill-compose

use thiserror::Error;

/// Errors that can occur while talking to the platform or driving a chat turn
#[derive(Debug, Error)]
pub enum ClientError {
    /// Input rejected before any network call was made
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource does not exist (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Non-success API response with the server-provided detail
    #[error("API error ({status}): {detail}")]
    Api { status: u16, detail: String },

    /// Missing or rejected credentials (HTTP 401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Connection, DNS, TLS or body read failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed server-sent event stream
    #[error("Stream error: {0}")]
    Stream(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A turn is running and the operation cannot proceed
    #[error("Turn in progress: {0}")]
    Busy(String),

    /// Answer does not match the pending ask-user prompt
    #[error("No pending prompt with id '{0}'")]
    PromptMismatch(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session or auth storage failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ClientError {
    /// HTTP status carried by this error, if it came from an API response
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::NotFound(_) => Some(404),
            ClientError::Unauthorized(_) => Some(401),
            _ => None,
        }
    }

    /// Whether this error means the resource does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Transport(e.to_string())
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let api = ClientError::Api {
            status: 409,
            detail: "Run already completed".to_string(),
        };
        assert_eq!(api.status(), Some(409));
        assert_eq!(ClientError::NotFound("x".into()).status(), Some(404));
        assert_eq!(ClientError::Validation("x".into()).status(), None);
    }

    #[test]
    fn test_display_includes_detail() {
        let err = ClientError::Api {
            status: 400,
            detail: "Interval must be >= 10 seconds".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "API error (400): Interval must be >= 10 seconds"
        );
        assert!(ClientError::NotFound("session".into()).is_not_found());
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in shipdeck operations
#[derive(Debug, Error)]
pub enum ShipdeckError {
    #[error("Invalid deployment: {0}")]
    Validation(#[from] ValidationError),

    #[error("Deployment failed: {0}")]
    Attempt(#[from] AttemptFailure),

    #[error("Server error: {0}")]
    Api(#[from] ApiError),

    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    #[error("Not logged in to GitHub. Run 'shipdeck login' first")]
    NotAuthenticated,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Client-side check that failed before anything was sent
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("project name is required")]
    MissingProjectName,

    #[error("repository URL is required")]
    MissingRepositoryUrl,

    #[error("no repository selected")]
    MissingSelectedRepository,

    #[error("no archive attached")]
    MissingArchive,

    #[error("publish directory is required for static sites")]
    MissingPublishDir,

    #[error("entry file is required for web services")]
    MissingEntryFile,

    #[error("port is required for web services")]
    MissingPort,

    #[error("invalid port '{0}'")]
    InvalidPort(String),

    #[error("environment variable with an empty key")]
    EmptyEnvKey,
}

/// A stream line that carried the event prefix but could not be turned into an event.
/// Recovered locally; the stream keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("malformed event payload ({reason}): {line}")]
    Malformed { line: String, reason: String },

    #[error("unknown event type '{0}'")]
    UnknownType(String),

    #[error("line exceeds {limit} bytes without a newline")]
    LineTooLong { limit: usize },
}

/// Why a deployment attempt ended in `failed`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptFailure {
    /// Non-2xx or network failure before the event stream opened
    #[error("request failed: {0}")]
    Transport(String),

    /// The stream ended without a `done` event
    #[error("connection closed unexpectedly")]
    StreamTerminatedEarly,

    /// The server sent `done` with `success: false`
    #[error("{0}")]
    RemoteDeployFailure(String),
}

/// API error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Human-readable error message
    pub error: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }

    /// Fallback when the body is not a JSON error object
    pub fn from_status(status: u16) -> Self {
        Self::new(format!("HTTP {}", status))
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_parses_backend_body() {
        let err: ApiError = serde_json::from_str(r#"{"error":"Deployment not found"}"#).unwrap();
        assert_eq!(err.to_string(), "Deployment not found");
    }

    #[test]
    fn remote_failure_displays_server_text_verbatim() {
        let failure = AttemptFailure::RemoteDeployFailure("Build exited with code 1".into());
        assert_eq!(failure.to_string(), "Build exited with code 1");
    }
}

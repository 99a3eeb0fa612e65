//! Error types for skillgate-remote

use skillgate_core::SkillgateError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    /// Required credential or setting missing
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Request timed out
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Non-success status from the remote
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Response body did not have the expected shape
    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout(err.to_string())
        } else {
            RemoteError::Http(err.to_string())
        }
    }
}

impl From<RemoteError> for SkillgateError {
    fn from(err: RemoteError) -> Self {
        SkillgateError::Collaborator(err.to_string())
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

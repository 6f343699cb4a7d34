//! Errors from agent runtime calls.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("runtime returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode runtime payload: {0}")]
    Decode(String),

    #[error("event stream closed")]
    StreamClosed,
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::Decode(e.to_string())
    }
}

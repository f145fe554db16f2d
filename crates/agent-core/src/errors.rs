use thiserror::Error;

/// Errors emitted by the agent-core crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// Raised when a request is malformed or missing required fields.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Transport failure or non-success status from the model endpoint.
    #[error("llm provider failed: {0}")]
    Provider(String),

    /// The model answered but the reply could not be decoded.
    #[error("llm reply could not be decoded: {0}")]
    Decode(String),

    #[error("sample data unreadable: {0}")]
    Sample(String),
}

impl AgentError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }
}

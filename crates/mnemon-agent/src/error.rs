//! Agent error types.
//!
//! All agent subsystems surface errors through [`AgentError`].  Tool failures
//! never appear here: they are folded into tool-result messages inside the
//! loop so the model can adapt.

/// Unified error type for the agent runtime.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// An HTTP request to the LLM endpoint failed.
    #[error("llm request failed: {reason}")]
    LlmRequestFailed { reason: String },

    /// The LLM response could not be parsed into the expected format.
    #[error("llm response parse error: {reason}")]
    LlmParseFailed { reason: String },

    /// The API key is missing for an endpoint that requires one.
    #[error("missing api key for llm endpoint")]
    MissingApiKey,

    /// An agent id was requested that the descriptor table does not declare.
    #[error("unknown agent: {agent_id}")]
    UnknownAgent { agent_id: String },

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the agent crate.
pub type Result<T> = std::result::Result<T, AgentError>;

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        Self::LlmRequestFailed {
            reason: err.to_string(),
        }
    }
}

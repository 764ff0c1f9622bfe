//! Backend error taxonomy.
//!
//! Every call through the backend client resolves to one of five classified
//! failures.  Callers branch on the classification: the tool registry falls
//! back to local handlers on [`BackendError::Unavailable`], the agent loop
//! surfaces everything else to the LLM as tool errors.

use std::collections::BTreeMap;

/// Classified failure from the knowledge backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend answered 404 for the requested resource.
    #[error("backend resource not found: {resource}")]
    NotFound { resource: String },

    /// The backend rejected the credentials (401 or 403).
    #[error("backend rejected credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    /// The backend rejected the request body with field-level errors.
    #[error("backend validation failed: {}", format_field_errors(field_errors))]
    Validation {
        field_errors: BTreeMap<String, String>,
    },

    /// The backend could not be reached: connection refused, DNS failure,
    /// 5xx, or timeout.
    #[error("backend unavailable: {reason}")]
    Unavailable { reason: String },

    /// The backend answered with a body that could not be interpreted.
    #[error("backend response malformed: {reason}")]
    Malformed { reason: String },
}

impl BackendError {
    /// Whether local fallbacks should be consulted for this failure.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

fn format_field_errors(errors: &BTreeMap<String, String>) -> String {
    if errors.is_empty() {
        return "invalid request".to_owned();
    }
    errors
        .iter()
        .map(|(field, reason)| format!("{field}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience alias used throughout the backend crate.
pub type Result<T> = std::result::Result<T, BackendError>;

//! Kernel error types.
//!
//! All kernel subsystems surface errors through [`KernelError`].  Each variant
//! carries enough context for callers to decide how to handle the failure.

/// Unified error type for the kernel.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// A regex pattern failed to compile when building an agent profile.
    #[error("invalid routing pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A router was built with no agent profiles, or with no default agent.
    #[error("router misconfigured: {reason}")]
    RouterMisconfigured { reason: String },

    /// An agent id was referenced that no profile declares.
    #[error("unknown agent: {agent_id}")]
    UnknownAgent { agent_id: String },
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, KernelError>;

//! Tool registry error types.

/// Unified error type for the tool registry.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The requested tool name is not registered.
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    /// A tool's input schema failed to compile at registration time.
    #[error("schema for tool `{name}` failed to compile: {reason}")]
    SchemaCompile { name: String, reason: String },

    /// Arguments were rejected by the tool's input schema.
    #[error("invalid arguments: {}", errors.join("; "))]
    InvalidArguments { errors: Vec<String> },

    /// A local handler failed.
    #[error("local handler failed: {reason}")]
    Local { reason: String },
}

/// Convenience alias used throughout the tools crate.
pub type Result<T> = std::result::Result<T, ToolError>;

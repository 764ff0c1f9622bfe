//! Web server error types.

/// Unified error type for the gateway server.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    /// The listener could not be bound, after any permitted recovery
    /// attempts.
    #[error("failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    /// The server loop failed.
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the web crate.
pub type Result<T> = std::result::Result<T, WebError>;

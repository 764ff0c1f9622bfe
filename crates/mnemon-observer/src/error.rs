//! Observer error types.

/// Unified error type for the shadow observer.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// A backend write failed during the observation pipeline.
    #[error("observation write failed: {0}")]
    Write(#[from] mnemon_backend::BackendError),

    /// The observation exceeded its deadline.
    #[error("observation timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

/// Convenience alias used throughout the observer crate.
pub type Result<T> = std::result::Result<T, ObserverError>;

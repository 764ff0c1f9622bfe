//! Valve subsystem error types.

use std::path::PathBuf;

/// Unified error type for the valve manager.
#[derive(Debug, thiserror::Error)]
pub enum ValveError {
    /// The persisted valve store could not be written.
    #[error("failed to persist valve store to {path}: {reason}")]
    Persist { path: PathBuf, reason: String },

    /// A catalogue was declared with duplicate valve names.
    #[error("duplicate valve name in catalogue: {name}")]
    DuplicateValve { name: String },

    /// A valve references an unknown category.
    #[error("valve `{valve}` references unknown category `{category}`")]
    UnknownCategory { valve: String, category: String },
}

/// Convenience alias used throughout the valves crate.
pub type Result<T> = std::result::Result<T, ValveError>;

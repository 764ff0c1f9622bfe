//! Mnemon kernel.
//!
//! This crate provides the foundational services shared by every part of the
//! Mnemon gateway:
//!
//! - **[`router`]** -- Deterministic agent router: keyword matching via
//!   [`aho_corasick`], pattern matching via compiled [`regex`] sets, weighted
//!   scoring with tie-breaking and collaborator detection.
//! - **[`logbuf`]** -- Ring-buffered structured log store fed by a
//!   [`tracing_subscriber::Layer`], projected over the admin surface.
//! - **[`diagnostics`]** -- Error-signature scanning over the recent log
//!   window with actionable suggestions and per-state turn counters.
//! - **[`context`]** -- Per-request user identity propagated to every
//!   downstream call.
//! - **[`turn`]** -- The transient turn record, tool-invocation outcomes, and
//!   the turn state machine tracker.
//! - **[`error`]** -- Unified kernel error types via [`thiserror`].
//!
//! All public types are `Send + Sync` and designed for use within a
//! multi-threaded tokio runtime.

pub mod context;
pub mod diagnostics;
pub mod error;
pub mod logbuf;
pub mod router;
pub mod turn;

// Re-export the most commonly used types at the crate root for convenience.
pub use context::UserContext;
pub use error::{KernelError, Result};
pub use logbuf::{BufferLayer, LogBuffer, LogLevel, LogRecord};
pub use router::{AgentProfile, Complexity, Router, RoutingDecision};
pub use turn::{
    InvocationErrorKind, InvocationOutcome, InvocationSource, ToolInvocation, TurnRecord,
    TurnState, TurnTracker,
};

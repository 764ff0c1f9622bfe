//! HTTP bridge to the Mnemon knowledge backend.
//!
//! The backend is an external REST service (memory search, entity CRUD,
//! profile and status updates, conversation analysis, tool execution) that
//! this crate exposes as typed async operations:
//!
//! - **[`client`]** -- [`BackendClient`] with bearer auth, `X-User-*` context
//!   propagation, per-operation timeouts, and error classification.
//! - **[`error`]** -- the five-way [`BackendError`] taxonomy callers branch
//!   on (`NotFound`, `Unauthorized`, `Validation`, `Unavailable`,
//!   `Malformed`).
//!
//! The client never retries and never falls back on its own; the tool
//! registry owns the local-fallback policy.

pub mod client;
pub mod error;

pub use client::{build_headers, BackendClient, BackendConfig, RemoteExecutor, DEFAULT_TIMEOUT};
pub use error::{BackendError, Result};

//! HTTP gateway for Mnemon.
//!
//! The external surface of the system: an OpenAI-compatible chat-completions
//! endpoint backed by the agent runtime, model listing, the pipeline
//! manifest, valve administration, and the logs/status/diagnostics surfaces.
//!
//! - **[`state`]** -- shared [`AppState`] handed to every handler.
//! - **[`openai`]** -- the chat-completions wire types.
//! - **[`api`]** -- manifest, health, models, and the turn pipeline.
//! - **[`admin`]** -- valve admin and observability endpoints.
//! - **[`server`]** -- router composition and startup, including the opt-in
//!   port-reclaim path.

pub mod admin;
pub mod api;
pub mod error;
pub mod openai;
pub mod server;
pub mod state;

pub use error::{Result, WebError};
pub use server::{build_router, GatewayServer, WebConfig};
pub use state::{AppState, PipelineInfo};

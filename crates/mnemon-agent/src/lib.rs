//! Agent runtime for the Mnemon gateway.
//!
//! An agent is a named bundle of system prompt, tool allowlist, and budget,
//! driven by an LLM in a bounded tool-use loop:
//!
//! - **[`llm`]** -- OpenAI-compatible non-streaming [`LlmClient`], the
//!   [`CompletionClient`] seam, and the message/tool-call types.
//! - **[`descriptor`]** -- the static [`AgentDescriptor`] table (personal
//!   assistant + shadow observer).
//! - **[`runtime`]** -- [`run_agent`]: the loop itself, with nested
//!   deadlines, bounded-concurrency tool dispatch, call-order result
//!   injection, and distinguishable termination reasons.

pub mod descriptor;
pub mod error;
pub mod llm;
pub mod runtime;

pub use descriptor::{find, standard_descriptors, AgentDescriptor};
pub use error::{AgentError, Result};
pub use llm::{
    ChatRequest, CompletionClient, LlmClient, LlmClientConfig, LlmResponse, Message, Role,
    ToolCall, ToolDefinition, Usage,
};
pub use runtime::{
    run_agent, AgentDeps, AgentOutcome, Termination, DEADLINE_MESSAGE, LLM_FAILURE_APOLOGY,
};

//! LLM client and shared types.

pub mod client;
pub mod types;

pub use client::{CompletionClient, LlmClient, LlmClientConfig};
pub use types::{ChatRequest, LlmResponse, Message, Role, ToolCall, ToolDefinition, Usage};

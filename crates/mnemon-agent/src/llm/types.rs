//! Core types for LLM interaction.
//!
//! These types model the data flowing between the agent runtime and the LLM
//! endpoint.  They are wire-agnostic at this layer; [`super::client`]
//! translates them into the OpenAI chat-completions format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// The role of a participant in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions that shape model behavior.
    System,
    /// Input from the human user.
    User,
    /// Output from the LLM.
    Assistant,
    /// Result of a tool invocation, fed back to the model.
    Tool,
}

/// A single message in a conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Who produced this message.
    pub role: Role,

    /// The textual content.  For [`Role::Tool`] messages this is the
    /// serialized tool result; for assistant messages that only carry tool
    /// calls it may be empty.
    #[serde(default)]
    pub content: String,

    /// Tool calls requested by the assistant.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Which tool call this message answers (tool messages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// The tool name, carried on tool-result messages for readability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    /// Create an assistant text message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    /// Create an assistant message that carries tool calls.
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            tool_calls,
            tool_call_id: None,
            tool_name: None,
        }
    }

    /// Create a tool result message.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            tool_name: Some(tool_name.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tool calls
// ---------------------------------------------------------------------------

/// A tool invocation requested by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier assigned by the LLM for correlating results.
    pub id: String,

    /// The name of the tool to invoke (must match a registered tool).
    pub name: String,

    /// Arguments as a JSON value.  The structure depends on the tool's
    /// schema.
    pub arguments: Value,
}

/// A tool definition advertised to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,

    /// Human-readable description of what the tool does.
    pub description: String,

    /// JSON Schema describing the tool's input parameters.
    pub input_schema: Value,
}

// ---------------------------------------------------------------------------
// LLM request / response
// ---------------------------------------------------------------------------

/// A full request to send to the LLM endpoint.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model identifier; empty selects the client's default.
    pub model: String,

    /// The conversation transcript.
    pub messages: Vec<Message>,

    /// Tool definitions the model may invoke.
    pub tools: Vec<ToolDefinition>,

    /// Sampling temperature.
    pub temperature: Option<f32>,

    /// Maximum tokens the model may generate in this turn.
    pub max_tokens: Option<u32>,
}

/// The high-level response from the LLM after one completion.
#[derive(Debug, Clone)]
pub enum LlmResponse {
    /// The model produced a final text answer.
    Text(String),

    /// The model wants to invoke one or more tools before continuing.
    ToolCalls(Vec<ToolCall>),
}

/// Token usage reported by the endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt.
    #[serde(default)]
    pub prompt_tokens: u32,
    /// Tokens generated by the model.
    #[serde(default)]
    pub completion_tokens: u32,
    /// Sum of the above.
    #[serde(default)]
    pub total_tokens: u32,
}

//! OpenAI chat-completions wire types.
//!
//! The gateway's external surface mirrors the widely used chat-completions
//! schema.  Only the non-streaming shape is supported; the `stream` flag is
//! accepted and ignored.  Token counts are whitespace-split approximations;
//! the fields are always present, a tokenizer is not.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Incoming chat-completions request body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    /// Requested model: `auto`, an agent id, or the pipeline id.
    #[serde(default)]
    pub model: Option<String>,

    /// Conversation so far.
    #[serde(default)]
    pub messages: Vec<IncomingMessage>,

    /// Accepted for compatibility; streaming is not supported.
    #[serde(default)]
    pub stream: bool,
}

/// One message in the incoming conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    /// `system`, `user`, `assistant`, or `tool`.
    pub role: String,

    /// Message text.
    #[serde(default)]
    pub content: String,
}

/// The trailing user message, which is what the gateway acts on.
pub fn trailing_user_message(messages: &[IncomingMessage]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .filter(|c| !c.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Outgoing chat-completions response body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

/// One response choice; the gateway always emits exactly one.
#[derive(Debug, Clone, Serialize)]
pub struct Choice {
    pub index: u32,
    pub message: OutgoingMessage,
    pub finish_reason: &'static str,
}

/// The assistant message inside a choice.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingMessage {
    pub role: &'static str,
    pub content: String,
}

/// Approximated token usage.
#[derive(Debug, Clone, Serialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl ChatCompletionResponse {
    /// Build the single-choice envelope for a completed turn.
    pub fn new(model: impl Into<String>, content: impl Into<String>, finish_reason: &'static str, prompt: &str) -> Self {
        let content = content.into();
        let usage = approximate_usage(prompt, &content);
        Self {
            id: format!("chatcmpl-{}", Uuid::now_v7().simple()),
            object: "chat.completion",
            created: Utc::now().timestamp(),
            model: model.into(),
            choices: vec![Choice {
                index: 0,
                message: OutgoingMessage {
                    role: "assistant",
                    content,
                },
                finish_reason,
            }],
            usage,
        }
    }
}

/// Whitespace-split token approximation.
pub fn approximate_usage(prompt: &str, completion: &str) -> Usage {
    let prompt_tokens = prompt.split_whitespace().count() as u32;
    let completion_tokens = completion.split_whitespace().count() as u32;
    Usage {
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens + completion_tokens,
    }
}

// ---------------------------------------------------------------------------
// Model listing
// ---------------------------------------------------------------------------

/// One entry in the model listing.
#[derive(Debug, Clone, Serialize)]
pub struct ModelEntry {
    pub id: String,
    pub name: String,
    pub object: &'static str,
    pub created: i64,
    pub owned_by: &'static str,
}

impl ModelEntry {
    /// Build a listing entry.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            object: "model",
            created: Utc::now().timestamp(),
            owned_by: "mnemon",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: &str, content: &str) -> IncomingMessage {
        IncomingMessage {
            role: role.to_owned(),
            content: content.to_owned(),
        }
    }

    #[test]
    fn trailing_user_message_skips_assistant_turns() {
        let messages = vec![
            msg("system", "be helpful"),
            msg("user", "first question"),
            msg("assistant", "first answer"),
            msg("user", "second question"),
        ];
        assert_eq!(trailing_user_message(&messages), Some("second question"));
    }

    #[test]
    fn missing_or_blank_user_message_is_none() {
        assert_eq!(trailing_user_message(&[]), None);
        assert_eq!(
            trailing_user_message(&[msg("assistant", "hello")]),
            None
        );
        assert_eq!(trailing_user_message(&[msg("user", "   ")]), None);
    }

    #[test]
    fn usage_is_whitespace_split() {
        let usage = approximate_usage("what time is it", "it is noon");
        assert_eq!(usage.prompt_tokens, 4);
        assert_eq!(usage.completion_tokens, 3);
        assert_eq!(usage.total_tokens, 7);
    }

    #[test]
    fn envelope_always_has_one_choice() {
        let response =
            ChatCompletionResponse::new("auto", "hello there", "stop", "hi");
        assert_eq!(response.object, "chat.completion");
        assert_eq!(response.choices.len(), 1);
        assert_eq!(response.choices[0].index, 0);
        assert_eq!(response.choices[0].message.role, "assistant");
        assert!(response.id.starts_with("chatcmpl-"));
    }
}

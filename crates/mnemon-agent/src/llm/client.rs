//! OpenAI-compatible LLM client.
//!
//! Speaks the non-streaming `/v1/chat/completions` wire format against any
//! compatible runtime (vLLM, Ollama, llama.cpp, hosted endpoints).  The
//! runtime is a black box to the gateway: one request in, one parsed
//! [`LlmResponse`] out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{AgentError, Result};
use crate::llm::types::{ChatRequest, LlmResponse, Message, Role, ToolCall};

/// The seam the runtime drives completions through.
///
/// Production code uses [`LlmClient`]; tests substitute scripted mocks.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Run one completion and parse the first choice.
    async fn complete(&self, request: &ChatRequest) -> Result<LlmResponse>;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for connecting to one LLM endpoint.
#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    /// API key; may be empty for unauthenticated local runtimes.
    pub api_key: String,
    /// Base URL (e.g. `http://localhost:11434/v1`), no trailing slash.
    pub base_url: String,
    /// Default model identifier.
    pub default_model: String,
    /// Default maximum tokens per response.
    pub max_tokens: u32,
    /// HTTP timeout for one completion.
    pub timeout: Duration,
}

impl LlmClientConfig {
    /// Create a configuration with library defaults.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            api_key: api_key.into(),
            base_url,
            default_model: model.into(),
            max_tokens: 4096,
            timeout: Duration::from_secs(120),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// An LLM client speaking the OpenAI chat-completions wire format.
#[derive(Debug, Clone)]
pub struct LlmClient {
    config: Arc<LlmClientConfig>,
    http: reqwest::Client,
}

impl LlmClient {
    /// Create a new client with the given configuration.
    pub fn new(config: LlmClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AgentError::LlmRequestFailed {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            config: Arc::new(config),
            http,
        })
    }

    /// The configured default model.
    pub fn default_model(&self) -> &str {
        &self.config.default_model
    }

    // -----------------------------------------------------------------------
    // Internal: request building
    // -----------------------------------------------------------------------

    fn build_request_body(&self, request: &ChatRequest) -> Value {
        let messages: Vec<Value> = request.messages.iter().map(wire_message).collect();

        let mut body = json!({
            "model": if request.model.is_empty() {
                &self.config.default_model
            } else {
                &request.model
            },
            "messages": messages,
            "max_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
            "stream": false,
        });

        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(tools);
            body["tool_choice"] = json!("auto");
        }

        body
    }

    // -----------------------------------------------------------------------
    // Internal: response parsing
    // -----------------------------------------------------------------------

    fn parse_response(&self, v: &Value) -> Result<LlmResponse> {
        let message = v
            .pointer("/choices/0/message")
            .ok_or_else(|| AgentError::LlmParseFailed {
                reason: "response has no choices[0].message".to_owned(),
            })?;

        if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
            if !calls.is_empty() {
                let parsed: Vec<ToolCall> = calls
                    .iter()
                    .map(parse_tool_call)
                    .collect::<Result<Vec<_>>>()?;
                return Ok(LlmResponse::ToolCalls(parsed));
            }
        }

        let content = message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        Ok(LlmResponse::Text(content))
    }
}

#[async_trait]
impl CompletionClient for LlmClient {
    async fn complete(&self, request: &ChatRequest) -> Result<LlmResponse> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let body = self.build_request_body(request);

        tracing::debug!(
            url = %url,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "llm completion request"
        );

        let mut req = self.http.post(&url).json(&body);
        if !self.config.api_key.is_empty() {
            req = req.bearer_auth(&self.config.api_key);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| AgentError::LlmRequestFailed {
            reason: format!("failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            return Err(AgentError::LlmRequestFailed {
                reason: format!("API returned {status}: {text}"),
            });
        }

        let v: Value = serde_json::from_str(&text).map_err(|e| AgentError::LlmParseFailed {
            reason: format!("invalid JSON response: {e}"),
        })?;

        self.parse_response(&v)
    }
}

// ---------------------------------------------------------------------------
// Wire helpers
// ---------------------------------------------------------------------------

/// Render one transcript message in the OpenAI wire shape.
fn wire_message(message: &Message) -> Value {
    match message.role {
        Role::Assistant if !message.tool_calls.is_empty() => {
            let calls: Vec<Value> = message
                .tool_calls
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "type": "function",
                        "function": {
                            "name": c.name,
                            "arguments": c.arguments.to_string(),
                        }
                    })
                })
                .collect();
            json!({
                "role": "assistant",
                "content": message.content,
                "tool_calls": calls,
            })
        }
        Role::Tool => json!({
            "role": "tool",
            "content": message.content,
            "tool_call_id": message.tool_call_id,
        }),
        role => json!({
            "role": role_name(role),
            "content": message.content,
        }),
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

/// Parse one wire tool call.  Arguments arrive as a JSON-encoded string; a
/// string that fails to parse is kept verbatim so the tool's schema check can
/// report it.
fn parse_tool_call(v: &Value) -> Result<ToolCall> {
    let id = v
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::LlmParseFailed {
            reason: "tool call missing id".to_owned(),
        })?
        .to_owned();

    let function = v
        .get("function")
        .ok_or_else(|| AgentError::LlmParseFailed {
            reason: format!("tool call {id} missing function"),
        })?;

    let name = function
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::LlmParseFailed {
            reason: format!("tool call {id} missing function name"),
        })?
        .to_owned();

    let arguments = match function.get("arguments") {
        Some(Value::String(s)) if !s.is_empty() => {
            serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone()))
        }
        Some(Value::Object(map)) => Value::Object(map.clone()),
        _ => json!({}),
    };

    Ok(ToolCall {
        id,
        name,
        arguments,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ToolDefinition;

    fn client() -> LlmClient {
        LlmClient::new(LlmClientConfig::new(
            "http://localhost:11434/v1",
            "",
            "llama3.2",
        ))
        .unwrap()
    }

    #[test]
    fn body_includes_tools_as_functions() {
        let request = ChatRequest {
            model: String::new(),
            messages: vec![Message::system("be helpful"), Message::user("hi")],
            tools: vec![ToolDefinition {
                name: "search_memory".into(),
                description: "Search memory".into(),
                input_schema: json!({"type": "object"}),
            }],
            temperature: Some(0.0),
            max_tokens: None,
        };

        let body = client().build_request_body(&request);
        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["stream"], false);
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["function"]["name"], "search_memory");
        assert_eq!(body["messages"][0]["role"], "system");
    }

    #[test]
    fn explicit_model_overrides_default() {
        let request = ChatRequest {
            model: "mixtral".into(),
            messages: vec![Message::user("hi")],
            tools: Vec::new(),
            temperature: None,
            max_tokens: Some(64),
        };
        let body = client().build_request_body(&request);
        assert_eq!(body["model"], "mixtral");
        assert_eq!(body["max_tokens"], 64);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn assistant_tool_calls_round_trip_on_the_wire() {
        let message = Message::assistant_tool_calls(vec![ToolCall {
            id: "call_1".into(),
            name: "get_current_time".into(),
            arguments: json!({"timezone": "UTC"}),
        }]);

        let wire = wire_message(&message);
        assert_eq!(wire["tool_calls"][0]["id"], "call_1");
        assert_eq!(
            wire["tool_calls"][0]["function"]["arguments"],
            "{\"timezone\":\"UTC\"}"
        );
    }

    #[test]
    fn text_response_is_parsed() {
        let v = json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "hello"}}]
        });
        match client().parse_response(&v).unwrap() {
            LlmResponse::Text(text) => assert_eq!(text, "hello"),
            other => panic!("expected Text, got {other:?}"),
        }
    }

    #[test]
    fn tool_call_response_is_parsed_with_string_arguments() {
        let v = json!({
            "choices": [{"message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_9",
                    "type": "function",
                    "function": {"name": "search_memory", "arguments": "{\"query\": \"sarah\"}"}
                }]
            }}]
        });

        match client().parse_response(&v).unwrap() {
            LlmResponse::ToolCalls(calls) => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].id, "call_9");
                assert_eq!(calls[0].arguments["query"], "sarah");
            }
            other => panic!("expected ToolCalls, got {other:?}"),
        }
    }

    #[test]
    fn malformed_response_is_rejected() {
        let v = json!({"error": "overloaded"});
        assert!(client().parse_response(&v).is_err());
    }

    #[test]
    fn unparseable_arguments_survive_as_strings() {
        let v = json!({
            "choices": [{"message": {
                "role": "assistant",
                "tool_calls": [{
                    "id": "call_1",
                    "function": {"name": "x", "arguments": "not json"}
                }]
            }}]
        });

        match client().parse_response(&v).unwrap() {
            LlmResponse::ToolCalls(calls) => {
                assert_eq!(calls[0].arguments, json!("not json"));
            }
            other => panic!("expected ToolCalls, got {other:?}"),
        }
    }
}

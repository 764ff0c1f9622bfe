//! The bounded tool-use loop.
//!
//! Drives an LLM with a tool-enabled prompt until it produces a final text
//! answer or a budget runs out.  Budgets nest: the per-tool timeout lives in
//! the backend client, the loop enforces the agent's wall-clock deadline, and
//! the web layer enforces the request deadline around everything.
//!
//! Tool calls emitted together by the LLM run concurrently, bounded by a
//! semaphore; results are injected into the transcript in the LLM's
//! originating call order regardless of completion order.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::time::Instant;
use uuid::Uuid;

use mnemon_kernel::{
    InvocationOutcome, ToolInvocation, TurnState, TurnTracker, UserContext,
};
use mnemon_tools::ToolRegistry;

use crate::descriptor::AgentDescriptor;
use crate::llm::client::CompletionClient;
use crate::llm::types::{ChatRequest, LlmResponse, Message, ToolCall, ToolDefinition};

/// User-visible text when the LLM endpoint fails.  Internal error detail
/// stays in the logs.
pub const LLM_FAILURE_APOLOGY: &str =
    "I'm sorry — I ran into a problem while generating a response. Please try again in a moment.";

/// User-visible text when the agent deadline expires.
pub const DEADLINE_MESSAGE: &str =
    "I couldn't finish within the time limit for this request. Please try again, or simplify the request.";

// ---------------------------------------------------------------------------
// Dependencies and outcome
// ---------------------------------------------------------------------------

/// Everything the loop needs besides the descriptor and the turn itself.
#[derive(Clone)]
pub struct AgentDeps {
    /// The completion endpoint.
    pub llm: Arc<dyn CompletionClient>,

    /// The tool registry invocations dispatch through.
    pub registry: ToolRegistry,

    /// Parallel tool calls allowed within one iteration.
    pub max_concurrent_tools: usize,

    /// Whether tools are advertised at all (`enable_tool_execution` valve).
    pub tools_enabled: bool,

    /// Optional turn tracker for per-iteration state transitions.
    pub tracker: Option<Arc<TurnTracker>>,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The model produced a final text answer.
    NaturalStop,
    /// The iteration budget ran out.
    IterationCap,
    /// The wall-clock deadline expired.
    Deadline,
    /// The LLM endpoint failed.
    FatalError,
}

impl Termination {
    /// The `finish_reason` value reported on the chat surface.
    pub fn finish_reason(&self) -> &'static str {
        match self {
            Self::NaturalStop => "stop",
            Self::IterationCap => "length",
            Self::Deadline => "timeout",
            Self::FatalError => "error",
        }
    }
}

/// The final result of one agent execution.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    /// The assistant text returned to the user.  Never empty.
    pub text: String,

    /// Why the loop stopped.
    pub termination: Termination,

    /// Number of LLM calls made.
    pub iterations_used: u32,

    /// Every tool invocation performed, in dispatch order.
    pub invocations: Vec<ToolInvocation>,
}

// ---------------------------------------------------------------------------
// The loop
// ---------------------------------------------------------------------------

/// Execute one agent over one user turn.
///
/// Performs at most `descriptor.max_iterations` LLM calls and finishes within
/// `descriptor.max_wall_time`, whichever comes first.  Tool failures are
/// surfaced to the model as tool-result messages and never abort the loop;
/// only an LLM failure terminates early, with a fixed apology text.
pub async fn run_agent(
    descriptor: &AgentDescriptor,
    turn_id: Uuid,
    user_message: &str,
    user_ctx: &UserContext,
    deps: &AgentDeps,
) -> AgentOutcome {
    let deadline = Instant::now() + descriptor.max_wall_time;

    let tools: Vec<ToolDefinition> = if deps.tools_enabled {
        deps.registry
            .specs_for(descriptor.tool_allowlist.iter().map(String::as_str))
            .into_iter()
            .map(|spec| ToolDefinition {
                name: spec.name,
                description: spec.description,
                input_schema: spec.input_schema,
            })
            .collect()
    } else {
        Vec::new()
    };

    let system_prompt = format!("{}\n\n{}", descriptor.system_prompt, user_ctx.prompt_block());
    let mut messages = vec![Message::system(system_prompt), Message::user(user_message)];
    let mut invocations: Vec<ToolInvocation> = Vec::new();

    tracing::info!(
        turn_id = %turn_id,
        agent = %descriptor.id,
        max_iterations = descriptor.max_iterations,
        tool_count = tools.len(),
        "agent loop starting"
    );

    for iteration in 0..descriptor.max_iterations {
        if Instant::now() >= deadline {
            return finish(
                turn_id,
                descriptor,
                DEADLINE_MESSAGE.to_owned(),
                Termination::Deadline,
                iteration,
                invocations,
            );
        }

        if let Some(ref tracker) = deps.tracker {
            tracker.record_iteration(turn_id, TurnState::Executing, Some(iteration));
        }

        let request = ChatRequest {
            model: descriptor.model_hint.clone().unwrap_or_default(),
            messages: messages.clone(),
            tools: tools.clone(),
            temperature: Some(0.0),
            max_tokens: None,
        };

        let response = match tokio::time::timeout_at(deadline, deps.llm.complete(&request)).await
        {
            Err(_elapsed) => {
                tracing::warn!(turn_id = %turn_id, iteration, "agent deadline expired during llm call");
                return finish(
                    turn_id,
                    descriptor,
                    DEADLINE_MESSAGE.to_owned(),
                    Termination::Deadline,
                    iteration + 1,
                    invocations,
                );
            }
            Ok(Err(e)) => {
                tracing::error!(turn_id = %turn_id, iteration, error = %e, "llm call failed");
                return finish(
                    turn_id,
                    descriptor,
                    LLM_FAILURE_APOLOGY.to_owned(),
                    Termination::FatalError,
                    iteration + 1,
                    invocations,
                );
            }
            Ok(Ok(response)) => response,
        };

        match response {
            LlmResponse::Text(text) => {
                let text = if text.trim().is_empty() {
                    // The envelope must always carry non-empty content.
                    "I don't have anything further to add.".to_owned()
                } else {
                    text
                };
                return finish(
                    turn_id,
                    descriptor,
                    text,
                    Termination::NaturalStop,
                    iteration + 1,
                    invocations,
                );
            }

            LlmResponse::ToolCalls(calls) => {
                tracing::info!(
                    turn_id = %turn_id,
                    iteration,
                    tool_count = calls.len(),
                    tools = ?calls.iter().map(|c| &c.name).collect::<Vec<_>>(),
                    "llm requested tool calls"
                );

                messages.push(Message::assistant_tool_calls(calls.clone()));

                let batch = match tokio::time::timeout_at(
                    deadline,
                    execute_tool_calls(&calls, user_ctx, deps),
                )
                .await
                {
                    Ok(batch) => batch,
                    Err(_elapsed) => {
                        // In-flight invocations are dropped with the future,
                        // aborting their HTTP calls.
                        tracing::warn!(
                            turn_id = %turn_id,
                            iteration,
                            "agent deadline expired during tool execution"
                        );
                        return finish(
                            turn_id,
                            descriptor,
                            DEADLINE_MESSAGE.to_owned(),
                            Termination::Deadline,
                            iteration + 1,
                            invocations,
                        );
                    }
                };

                for invocation in batch {
                    messages.push(Message::tool_result(
                        &invocation.call_id,
                        &invocation.tool_name,
                        render_result(&invocation),
                    ));
                    invocations.push(invocation);
                }
            }
        }
    }

    let summary = cap_summary(&invocations);
    finish(
        turn_id,
        descriptor,
        summary,
        Termination::IterationCap,
        descriptor.max_iterations,
        invocations,
    )
}

/// Execute one batch of tool calls concurrently, bounded by the configured
/// semaphore.  Results come back in the originating call order.
async fn execute_tool_calls(
    calls: &[ToolCall],
    user_ctx: &UserContext,
    deps: &AgentDeps,
) -> Vec<ToolInvocation> {
    let semaphore = Arc::new(Semaphore::new(deps.max_concurrent_tools.max(1)));

    let futures = calls.iter().map(|call| {
        let registry = deps.registry.clone();
        let semaphore = Arc::clone(&semaphore);
        let ctx = user_ctx.clone();
        async move {
            let _permit = semaphore.acquire().await;
            registry
                .invoke(&call.id, &call.name, call.arguments.clone(), Some(&ctx))
                .await
        }
    });

    futures::future::join_all(futures).await
}

/// Render an invocation outcome as the tool-result message content.
fn render_result(invocation: &ToolInvocation) -> String {
    match &invocation.outcome {
        InvocationOutcome::Ok { value } => value.to_string(),
        InvocationOutcome::Err { kind, message } => {
            format!("Error ({kind:?}): {message}")
        }
    }
}

/// Transcript-aware fallback when the iteration budget runs out.
fn cap_summary(invocations: &[ToolInvocation]) -> String {
    if invocations.is_empty() {
        return "I reached my step limit before finishing. Could you narrow the request \
                and try again?"
            .to_owned();
    }

    let mut tools: Vec<&str> = invocations.iter().map(|i| i.tool_name.as_str()).collect();
    tools.sort_unstable();
    tools.dedup();

    format!(
        "I reached my step limit before finishing. I made {} tool call(s) ({}) but \
         still needed more steps — ask me to continue, or narrow the request.",
        invocations.len(),
        tools.join(", ")
    )
}

fn finish(
    turn_id: Uuid,
    descriptor: &AgentDescriptor,
    text: String,
    termination: Termination,
    iterations_used: u32,
    invocations: Vec<ToolInvocation>,
) -> AgentOutcome {
    tracing::info!(
        turn_id = %turn_id,
        agent = %descriptor.id,
        termination = ?termination,
        iterations_used,
        invocations = invocations.len(),
        "agent loop finished"
    );

    AgentOutcome {
        text,
        termination,
        iterations_used,
        invocations,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

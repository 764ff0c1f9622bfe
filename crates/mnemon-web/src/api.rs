//! Core API route handlers: manifest, health, model listing, and the
//! OpenAI-compatible chat-completions endpoint.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use mnemon_agent::{find, run_agent, AgentDeps, AgentDescriptor, Termination};
use mnemon_kernel::{TurnRecord, TurnState, UserContext};
use mnemon_observer::{ObservationInput, Scheduled};

use crate::openai::{
    trailing_user_message, ChatCompletionRequest, ChatCompletionResponse, ModelEntry,
};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Error envelope
// ---------------------------------------------------------------------------

/// Build a client-error response in the conventional error envelope.
fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = json!({
        "error": {
            "message": message.into(),
            "type": "invalid_request_error",
        }
    });
    (status, Json(body)).into_response()
}

// ---------------------------------------------------------------------------
// GET / -- manifest
// ---------------------------------------------------------------------------

/// Pipeline manifest for the front-end.
pub async fn manifest(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "id": state.pipeline.id,
        "name": state.pipeline.name,
        "version": state.pipeline.version,
        "type": "manifold",
        "description": state.pipeline.description,
        "license": "MIT",
        "models": model_entries(&state),
    }))
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

/// Liveness probe.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "pipeline": state.pipeline.name,
        "version": state.pipeline.version,
        "models": state.descriptors.len() + 1,
    }))
}

// ---------------------------------------------------------------------------
// GET /models, GET /v1/models
// ---------------------------------------------------------------------------

/// Model listing: every agent plus the `auto` pseudo-model.
pub async fn models(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "object": "list",
        "data": model_entries(&state),
        "pipelines": true,
    }))
}

fn model_entries(state: &AppState) -> Vec<ModelEntry> {
    let mut entries = vec![ModelEntry::new("auto", format!("🧠 {}", state.pipeline.name))];
    for descriptor in &state.descriptors {
        entries.push(ModelEntry::new(
            &descriptor.id,
            format!("🎯 {}", descriptor.name),
        ));
    }
    entries
}

// ---------------------------------------------------------------------------
// POST /v1/chat/completions
// ---------------------------------------------------------------------------

/// The chat-completions pipeline: extract the trailing user message, derive
/// the user context, route, execute the agent, emit the envelope, and
/// schedule the shadow observation.
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ChatCompletionRequest>,
) -> Response {
    let started = Instant::now();
    let requested_model = body.model.clone().unwrap_or_else(|| "auto".to_owned());

    let Some(message) = trailing_user_message(&body.messages).map(ToOwned::to_owned) else {
        return error_response(StatusCode::BAD_REQUEST, "No user message found");
    };

    let user_ctx = user_context_from_headers(&headers);
    let mut turn = TurnRecord::new(user_ctx, message.clone());
    state.tracker.record(turn.turn_id, TurnState::Received);

    tracing::info!(
        turn_id = %turn.turn_id.to_string(),
        model = %requested_model,
        message_len = message.len(),
        user = %turn.user_ctx.id,
        "chat completion received"
    );

    // Agent selection: routed for `auto`, direct otherwise.
    let descriptor = match select_agent(&state, &requested_model, &message, &mut turn) {
        Ok(descriptor) => descriptor,
        Err(response) => return response,
    };
    state.tracker.record(turn.turn_id, TurnState::Routed);

    // Response cache, keyed on the normalised request.
    let caching = state.valves.get_bool("enable_caching");
    let cache_key = format!(
        "{}|{}|{}",
        descriptor.id,
        turn.user_ctx.id,
        message.trim().to_lowercase()
    );
    if caching {
        if let Some(cached) = state.cache.get(&cache_key).await {
            tracing::debug!(turn_id = %turn.turn_id.to_string(), "cache hit");
            state.tracker.record(turn.turn_id, TurnState::Responded);
            let response =
                ChatCompletionResponse::new(&requested_model, cached, "stop", &message);
            return Json(response).into_response();
        }
    }

    // Apply valve budgets and execute.
    let mut budgeted = descriptor.with_budget(
        state.valves.get_i64("max_agent_iterations", 25).max(1) as u32,
        Duration::from_secs(state.valves.get_i64("agent_wall_time_secs", 120).max(1) as u64),
    );
    if !state.valves.get_bool("enable_memory_search") {
        budgeted.tool_allowlist.remove("search_memory");
        budgeted.tool_allowlist.remove("search_conversations");
    }

    let deps = AgentDeps {
        llm: Arc::clone(&state.llm),
        registry: state.registry.clone(),
        max_concurrent_tools: state.valves.get_i64("max_concurrent_tools", 4).max(1) as usize,
        tools_enabled: state.valves.get_bool("enable_tool_execution"),
        tracker: Some(Arc::clone(&state.tracker)),
    };

    let outcome = run_agent(&budgeted, turn.turn_id, &message, &turn.user_ctx, &deps).await;

    turn.tool_invocations = outcome.invocations.clone();
    turn.final_text = Some(outcome.text.clone());
    turn.elapsed = Some(started.elapsed());
    state.tracker.record(turn.turn_id, TurnState::Responded);

    if caching && outcome.termination == Termination::NaturalStop {
        state.cache.insert(cache_key, outcome.text.clone()).await;
    }

    // Fire-and-forget shadow observation; the client never waits on it.
    let observer_enabled = state.valves.get_bool("enable_shadow_observer")
        && state.valves.get_str("memory_persistence", "automatic") != "disabled";
    let scheduled = state.observer.schedule(
        ObservationInput {
            turn_id: turn.turn_id,
            user_message: message.clone(),
            assistant_message: outcome.text.clone(),
            primary_agent: budgeted.id.clone(),
            user_ctx: turn.user_ctx.clone(),
        },
        observer_enabled,
        Duration::from_secs(state.valves.get_i64("observer_timeout_secs", 30).max(1) as u64),
    );
    if let Scheduled::Spawned(task_id) = scheduled {
        turn.shadow_task_id = Some(task_id);
    }

    tracing::info!(
        turn_id = %turn.turn_id.to_string(),
        agent = %budgeted.id,
        finish_reason = outcome.termination.finish_reason(),
        iterations = outcome.iterations_used,
        tool_calls = turn.tool_invocations.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "chat completion finished"
    );

    let response = ChatCompletionResponse::new(
        &requested_model,
        outcome.text,
        outcome.termination.finish_reason(),
        &message,
    );
    Json(response).into_response()
}

/// Resolve the agent for a request: router for `auto`, direct selection
/// otherwise.  Passive agents and unknown ids are client errors.
fn select_agent<'a>(
    state: &'a AppState,
    requested_model: &str,
    message: &str,
    turn: &mut TurnRecord,
) -> Result<&'a AgentDescriptor, Response> {
    let auto = requested_model == "auto" || requested_model == state.pipeline.id;

    if !auto {
        return match find(&state.descriptors, requested_model) {
            None => Err(error_response(
                StatusCode::BAD_REQUEST,
                format!("Unknown model: {requested_model}"),
            )),
            Some(descriptor) if descriptor.passive => Err(error_response(
                StatusCode::BAD_REQUEST,
                format!("Model {requested_model} cannot answer directly"),
            )),
            Some(descriptor) => Ok(descriptor),
        };
    }

    let primary = if state.valves.get_bool("enable_intelligent_routing") {
        let decision = state.router.decide(message);
        if state.valves.get_bool("log_agent_decisions") {
            tracing::info!(
                turn_id = %turn.turn_id.to_string(),
                primary = %decision.primary,
                confidence = decision.confidence,
                rationale = %decision.rationale,
                "routing decision"
            );
        }
        // A low-confidence win falls back to the default agent rather than
        // committing to a weakly supported specialist.
        let threshold = state.valves.get_f64("routing_confidence_threshold", 0.7);
        let primary = if decision.confidence > 0.0
            && decision.confidence < threshold
            && decision.primary != state.router.default_agent()
        {
            state.router.default_agent().to_owned()
        } else {
            decision.primary.clone()
        };
        turn.routing = Some(decision);
        primary
    } else {
        let configured = state.valves.get_str("default_agent", "auto");
        if configured == "auto" {
            state.router.default_agent().to_owned()
        } else {
            configured
        }
    };

    find(&state.descriptors, &primary)
        .filter(|d| !d.passive)
        .or_else(|| state.descriptors.iter().find(|d| !d.passive))
        .ok_or_else(|| {
            error_response(
                StatusCode::BAD_REQUEST,
                "No agent available for this request",
            )
        })
}

/// Derive the user context from recognised `X-User-*` headers.  Requests
/// without an `X-User-ID` run anonymously.
pub fn user_context_from_headers(headers: &HeaderMap) -> UserContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned)
    };

    let Some(id) = header("x-user-id").filter(|v| !v.is_empty()) else {
        return UserContext::anonymous();
    };

    let mut ctx = UserContext::new(
        id,
        header("x-user-name").unwrap_or_else(|| "Unknown User".to_owned()),
        header("x-user-role").unwrap_or_else(|| "user".to_owned()),
        header("x-user-authenticated")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false),
    );
    if let Some(email) = header("x-user-email") {
        ctx = ctx.with_email(email);
    }
    ctx
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn headers_produce_a_full_context() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("u-7"));
        headers.insert("x-user-name", HeaderValue::from_static("Grace Hopper"));
        headers.insert("x-user-email", HeaderValue::from_static("grace@example.com"));
        headers.insert("x-user-role", HeaderValue::from_static("admin"));
        headers.insert("x-user-authenticated", HeaderValue::from_static("true"));

        let ctx = user_context_from_headers(&headers);
        assert_eq!(ctx.id, "u-7");
        assert_eq!(ctx.display_name, "Grace Hopper");
        assert_eq!(ctx.email.as_deref(), Some("grace@example.com"));
        assert_eq!(ctx.role, "admin");
        assert!(ctx.authenticated);
    }

    #[test]
    fn missing_id_header_means_anonymous() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-name", HeaderValue::from_static("Nameless"));

        let ctx = user_context_from_headers(&headers);
        assert!(ctx.is_anonymous());
        assert!(!ctx.authenticated);
    }

    #[test]
    fn partial_headers_fill_defaults() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("u-1"));

        let ctx = user_context_from_headers(&headers);
        assert_eq!(ctx.id, "u-1");
        assert_eq!(ctx.display_name, "Unknown User");
        assert_eq!(ctx.role, "user");
        assert!(ctx.email.is_none());
    }
}

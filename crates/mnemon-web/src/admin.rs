//! Admin surface: valve management, logs, status, and diagnostics.
//!
//! All routes are keyed on the pipeline id (`/{pipeline_id}/...`); an id this
//! instance does not serve answers 404.  Log content is gated behind the
//! `expose_logs_ui` valve.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use mnemon_kernel::diagnostics::build_report;
use mnemon_kernel::LogLevel;

use crate::state::AppState;

/// Ceiling for the `lines` query parameter.
const MAX_LOG_LINES: usize = 1000;

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"detail": "Pipeline not found"})),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Valves
// ---------------------------------------------------------------------------

/// `GET /{pipeline_id}/valves/spec` -- the full catalogue for UI rendering.
pub async fn valves_spec(
    State(state): State<Arc<AppState>>,
    Path(pipeline_id): Path<String>,
) -> Response {
    if !state.owns_pipeline(&pipeline_id) {
        return not_found();
    }
    tracing::info!(pipeline_id = %pipeline_id, "valve spec requested");
    Json(state.valves.spec()).into_response()
}

/// `GET /{pipeline_id}/valves` -- current values.
pub async fn valves_current(
    State(state): State<Arc<AppState>>,
    Path(pipeline_id): Path<String>,
) -> Response {
    if !state.owns_pipeline(&pipeline_id) {
        return not_found();
    }
    Json(json!(state.valves.current())).into_response()
}

/// `POST /{pipeline_id}/valves` -- validated batch update.
pub async fn valves_update(
    State(state): State<Arc<AppState>>,
    Path(pipeline_id): Path<String>,
    Json(updates): Json<BTreeMap<String, Value>>,
) -> Response {
    if !state.owns_pipeline(&pipeline_id) {
        return not_found();
    }

    let outcome = state.valves.update(&updates);

    tracing::info!(
        pipeline_id = %pipeline_id,
        updated = outcome.updated.len(),
        rejected = outcome.validation.len() - outcome.updated.len(),
        restart_required = outcome.restart_required,
        "valves updated"
    );

    Json(json!({
        "success": true,
        "updated": outcome.updated,
        "validation": outcome.validation,
        "restart_required": outcome.restart_required,
        "current_values": outcome.current_values,
    }))
    .into_response()
}

/// `POST /{pipeline_id}/valves/reset` -- restore defaults.
pub async fn valves_reset(
    State(state): State<Arc<AppState>>,
    Path(pipeline_id): Path<String>,
) -> Response {
    if !state.owns_pipeline(&pipeline_id) {
        return not_found();
    }

    let outcome = state.valves.reset();
    tracing::info!(pipeline_id = %pipeline_id, "all valves reset to defaults");

    Json(json!({
        "success": true,
        "message": "All valves reset to default values",
        "current_values": outcome.current_values,
    }))
    .into_response()
}

// ---------------------------------------------------------------------------
// Logs
// ---------------------------------------------------------------------------

/// Query parameters for the logs endpoint.
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    /// Maximum lines to return.
    #[serde(default = "default_lines")]
    pub lines: usize,
    /// Minimum level to include.
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_lines() -> usize {
    100
}

fn default_level() -> String {
    "INFO".to_owned()
}

/// `GET /{pipeline_id}/logs` -- recent log records from the ring buffer.
pub async fn logs(
    State(state): State<Arc<AppState>>,
    Path(pipeline_id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Response {
    if !state.owns_pipeline(&pipeline_id) {
        return not_found();
    }

    if !state.valves.get_bool("expose_logs_ui") {
        return Json(json!({
            "pipeline_id": pipeline_id,
            "logs": [],
            "message": "Logs are disabled. Enable 'Expose Logs in UI' in pipeline settings.",
            "timestamp": Utc::now().to_rfc3339(),
        }))
        .into_response();
    }

    let level = LogLevel::parse(&query.level).unwrap_or(LogLevel::Info);
    let retention_hours = state.valves.get_i64("log_retention_hours", 24);
    let cutoff = Utc::now() - ChronoDuration::hours(retention_hours);
    let lines = query.lines.min(MAX_LOG_LINES);

    let records = state.logs.tail(level, cutoff, lines);
    let total_lines = records.len();

    Json(json!({
        "pipeline_id": pipeline_id,
        "logs": records,
        "total_lines": total_lines,
        "timestamp": Utc::now().to_rfc3339(),
    }))
    .into_response()
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// `GET /{pipeline_id}/status` -- feature flags, budgets, and observer
/// counters.
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(pipeline_id): Path<String>,
) -> Response {
    if !state.owns_pipeline(&pipeline_id) {
        return not_found();
    }

    let valves = &state.valves;
    let stats = state.observer.stats();

    Json(json!({
        "pipeline_id": pipeline_id,
        "status": "running",
        "timestamp": Utc::now().to_rfc3339(),
        "uptime_secs": (Utc::now() - state.started_at).num_seconds(),
        "agents": {
            "total": state.descriptors.len(),
            "available": state.descriptors.iter().map(|d| d.id.clone()).collect::<Vec<_>>(),
        },
        "features": {
            "intelligent_routing": valves.get_bool("enable_intelligent_routing"),
            "shadow_observer": valves.get_bool("enable_shadow_observer"),
            "memory_search": valves.get_bool("enable_memory_search"),
            "tool_execution": valves.get_bool("enable_tool_execution"),
            "response_caching": valves.get_bool("enable_caching"),
            "valve_management": true,
        },
        "debugging": {
            "debug_mode": valves.get_bool("debug_mode"),
            "log_level": valves.get_str("log_level", "INFO"),
            "logs_ui_enabled": valves.get_bool("expose_logs_ui"),
            "log_agent_decisions": valves.get_bool("log_agent_decisions"),
        },
        "configuration": {
            "max_iterations": valves.get_i64("max_agent_iterations", 25),
            "agent_wall_time_secs": valves.get_i64("agent_wall_time_secs", 120),
            "tool_timeout_secs": valves.get_i64("tool_timeout_secs", 30),
            "backend_api_url": valves.get_str("backend_api_url", "http://localhost:8000"),
            "routing_confidence_threshold": valves.get_f64("routing_confidence_threshold", 0.7),
        },
        "shadow_observer": {
            "completed": stats.completed(),
            "failed": stats.failed(),
            "dropped": stats.dropped(),
            "active": state.observer.active_count(),
        },
        "tools": {
            "registered": state.registry.names().len(),
        },
    }))
    .into_response()
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// `GET /{pipeline_id}/diagnostics` -- signature scan over the recent log
/// window plus turn state counters.
pub async fn diagnostics(
    State(state): State<Arc<AppState>>,
    Path(pipeline_id): Path<String>,
) -> Response {
    if !state.owns_pipeline(&pipeline_id) {
        return not_found();
    }

    let retention_hours = state.valves.get_i64("log_retention_hours", 24);
    let report = build_report(&state.logs, &state.tracker, retention_hours);
    let stats = state.observer.stats();

    Json(json!({
        "pipeline_id": pipeline_id,
        "timestamp": Utc::now().to_rfc3339(),
        "health_check": {
            "status": report.status,
            "issues": report.suggestions.iter().map(|s| json!({
                "type": "error",
                "description": s.issue,
            })).collect::<Vec<_>>(),
        },
        "recent_errors": report.recent_errors,
        "suggestions": report.suggestions,
        "turn_states": report.turn_states,
        "shadow_observer": {
            "completed": stats.completed(),
            "failed": stats.failed(),
            "dropped": stats.dropped(),
        },
    }))
    .into_response()
}

//! Diagnostics over the recent log window.
//!
//! Scans the tail of the [`LogBuffer`] for known error signatures, attaches
//! actionable suggestions, and summarises turn state-machine counters from
//! the [`TurnTracker`].  The web layer projects the resulting report on the
//! `/{pipeline_id}/diagnostics` endpoint.

use std::collections::HashMap;

use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;

use crate::logbuf::{LogBuffer, LogLevel, LogRecord};
use crate::turn::TurnTracker;

/// How many trailing records the signature scan inspects.
const SCAN_WINDOW_LINES: usize = 200;

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

/// A known failure fingerprint and how to act on it.
struct ErrorSignature {
    /// Substring matched against record messages.
    pattern: &'static str,
    /// What the match means.
    description: &'static str,
    /// What an operator should do about it.
    solution: &'static str,
    /// Triage priority.
    priority: &'static str,
}

const SIGNATURES: &[ErrorSignature] = &[
    ErrorSignature {
        pattern: "401",
        description: "backend rejected the API credentials",
        solution: "verify MNEMON_BACKEND_API_KEY and the backend authentication configuration",
        priority: "high",
    },
    ErrorSignature {
        pattern: "connection refused",
        description: "the knowledge backend is unreachable",
        solution: "check that the backend is running at the configured backend_api_url",
        priority: "high",
    },
    ErrorSignature {
        pattern: "timed out",
        description: "a downstream call exceeded its deadline",
        solution: "raise tool_timeout_secs or investigate backend latency",
        priority: "medium",
    },
    ErrorSignature {
        pattern: "schema validation",
        description: "an agent produced tool arguments that failed validation",
        solution: "inspect the tool schemas and recent agent decisions in the logs",
        priority: "medium",
    },
    ErrorSignature {
        pattern: "shadow observation failed",
        description: "the shadow observer pipeline raised during analysis",
        solution: "check observer deadline and backend write endpoints; failures never reach users",
        priority: "low",
    },
    ErrorSignature {
        pattern: "observation dropped",
        description: "shadow observations are being shed under load",
        solution: "raise max_concurrent_observers if the drop counter keeps climbing",
        priority: "low",
    },
];

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// One matched signature occurrence.
#[derive(Debug, Clone, Serialize)]
pub struct DetectedIssue {
    /// The fingerprint that matched.
    pub pattern: String,
    /// What the match means.
    pub description: String,
    /// The offending log line.
    pub line: String,
    /// `warning` or `error`, taken from the record level.
    pub severity: &'static str,
}

/// An operator-facing recommendation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Suggestion {
    /// The underlying issue.
    pub issue: String,
    /// What to do.
    pub solution: String,
    /// Triage priority.
    pub priority: String,
}

/// The full diagnostics payload.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    /// `healthy`, `degraded`, or `unhealthy`.
    pub status: &'static str,
    /// Every signature hit in the scanned window.
    pub recent_errors: Vec<DetectedIssue>,
    /// Deduplicated recommendations.
    pub suggestions: Vec<Suggestion>,
    /// Turn state-machine transition counts within the retention window.
    pub turn_states: HashMap<&'static str, u64>,
}

// ---------------------------------------------------------------------------
// Report builder
// ---------------------------------------------------------------------------

/// Build a diagnostics report from the recent log window and turn counters.
///
/// `retention_hours` bounds both the log scan and the state counters.
pub fn build_report(
    buffer: &LogBuffer,
    tracker: &TurnTracker,
    retention_hours: i64,
) -> DiagnosticsReport {
    let cutoff = Utc::now() - ChronoDuration::hours(retention_hours);
    let window = buffer.tail(LogLevel::Warning, cutoff, SCAN_WINDOW_LINES);

    let mut recent_errors = Vec::new();
    let mut suggestions: Vec<Suggestion> = Vec::new();

    for record in &window {
        for signature in SIGNATURES {
            if record_matches(record, signature.pattern) {
                recent_errors.push(DetectedIssue {
                    pattern: signature.pattern.to_owned(),
                    description: signature.description.to_owned(),
                    line: record.message.clone(),
                    severity: if record.level >= LogLevel::Error {
                        "error"
                    } else {
                        "warning"
                    },
                });

                let suggestion = Suggestion {
                    issue: signature.description.to_owned(),
                    solution: signature.solution.to_owned(),
                    priority: signature.priority.to_owned(),
                };
                if !suggestions.contains(&suggestion) {
                    suggestions.push(suggestion);
                }
            }
        }
    }

    let status = match suggestions.len() {
        0 => "healthy",
        1..=2 => "degraded",
        _ => "unhealthy",
    };

    DiagnosticsReport {
        status,
        recent_errors,
        suggestions,
        turn_states: tracker.counts_since(cutoff),
    }
}

/// Case-insensitive substring match over message and serialised fields.
fn record_matches(record: &LogRecord, pattern: &str) -> bool {
    let pattern = pattern.to_lowercase();
    if record.message.to_lowercase().contains(&pattern) {
        return true;
    }
    record
        .fields
        .values()
        .any(|v| v.to_string().to_lowercase().contains(&pattern))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

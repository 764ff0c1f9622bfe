//! Turn records and the per-turn state machine.
//!
//! A [`TurnRecord`] is the transient bookkeeping for one user→assistant
//! exchange.  It exists only for the lifetime of the request; nothing here is
//! persisted.  The [`TurnTracker`] records state-machine transitions for the
//! diagnostics surface:
//!
//! ```text
//! received → routed → executing[iteration n] → responded
//!          → shadow-scheduled → shadow-complete | shadow-dropped | shadow-failed
//! ```

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::context::UserContext;
use crate::router::RoutingDecision;

// ---------------------------------------------------------------------------
// Tool invocations
// ---------------------------------------------------------------------------

/// Where a tool invocation was ultimately dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvocationSource {
    /// The invocation went to the knowledge backend over HTTP.
    Remote,
    /// The backend was unavailable and a registered local handler answered.
    LocalFallback,
}

/// Classified failure kinds for a tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationErrorKind {
    /// The tool name is not registered, or the backend returned 404.
    NotFound,
    /// The arguments failed schema validation.
    Validation,
    /// The backend rejected the credentials.
    Unauthorized,
    /// The backend could not be reached (connect, DNS, 5xx, timeout).
    Unavailable,
    /// The backend answered with a body that could not be interpreted.
    Malformed,
    /// Anything else.
    Internal,
}

/// The outcome of a single tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvocationOutcome {
    /// The tool produced a value.
    Ok { value: Value },
    /// The tool failed.
    Err {
        kind: InvocationErrorKind,
        message: String,
    },
}

impl InvocationOutcome {
    /// Whether the invocation succeeded.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

/// One executed tool call within a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// The call id assigned by the LLM, used to correlate results.
    pub call_id: String,

    /// The registered tool name that was dispatched.
    pub tool_name: String,

    /// The arguments as received (post-normalisation).
    pub arguments: Value,

    /// What happened.
    pub outcome: InvocationOutcome,

    /// Wall-clock duration of the dispatch.
    pub latency: Duration,

    /// Remote or local-fallback.
    pub source: InvocationSource,
}

// ---------------------------------------------------------------------------
// Turn record
// ---------------------------------------------------------------------------

/// Transient bookkeeping for one chat turn.
#[derive(Debug, Clone)]
pub struct TurnRecord {
    /// Unique id for this turn.
    pub turn_id: Uuid,

    /// Who is asking.
    pub user_ctx: UserContext,

    /// The trailing user message content.
    pub incoming: String,

    /// The routing decision, when `model = auto` was used.
    pub routing: Option<RoutingDecision>,

    /// Every tool invocation made while executing the turn.
    pub tool_invocations: Vec<ToolInvocation>,

    /// The final assistant text, once produced.
    pub final_text: Option<String>,

    /// Total elapsed time, stamped when the response is emitted.
    pub elapsed: Option<Duration>,

    /// Id of the shadow observation task, if one was scheduled.
    pub shadow_task_id: Option<Uuid>,
}

impl TurnRecord {
    /// Start a new record for an incoming message.
    pub fn new(user_ctx: UserContext, incoming: impl Into<String>) -> Self {
        Self {
            turn_id: Uuid::now_v7(),
            user_ctx,
            incoming: incoming.into(),
            routing: None,
            tool_invocations: Vec::new(),
            final_text: None,
            elapsed: None,
            shadow_task_id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Turn state machine
// ---------------------------------------------------------------------------

/// States a turn passes through, as surfaced by diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TurnState {
    Received,
    Routed,
    Executing,
    Responded,
    ShadowScheduled,
    ShadowComplete,
    ShadowDropped,
    ShadowFailed,
}

impl TurnState {
    /// Stable name used in log records and diagnostics counters.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Routed => "routed",
            Self::Executing => "executing",
            Self::Responded => "responded",
            Self::ShadowScheduled => "shadow-scheduled",
            Self::ShadowComplete => "shadow-complete",
            Self::ShadowDropped => "shadow-dropped",
            Self::ShadowFailed => "shadow-failed",
        }
    }
}

/// One recorded transition.
#[derive(Debug, Clone, Serialize)]
pub struct TurnEvent {
    /// When the transition happened.
    pub ts: DateTime<Utc>,
    /// Which turn transitioned.
    pub turn_id: Uuid,
    /// The state entered.
    pub state: TurnState,
    /// For [`TurnState::Executing`], the loop iteration number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
}

/// Bounded store of turn transitions, shared across requests.
///
/// Writes are constant-time; the buffer drops the oldest event once capacity
/// is reached.
pub struct TurnTracker {
    events: Mutex<std::collections::VecDeque<TurnEvent>>,
    capacity: usize,
}

impl TurnTracker {
    /// Create a tracker bounded to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(std::collections::VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Record a transition and emit a log line for it.
    pub fn record(&self, turn_id: Uuid, state: TurnState) {
        self.record_iteration(turn_id, state, None);
    }

    /// Record an `executing` transition with its iteration number.
    pub fn record_iteration(&self, turn_id: Uuid, state: TurnState, iteration: Option<u32>) {
        tracing::debug!(
            turn_id = %turn_id,
            state = state.as_str(),
            iteration,
            "turn state transition"
        );

        let event = TurnEvent {
            ts: Utc::now(),
            turn_id,
            state,
            iteration,
        };

        let mut events = self.events.lock().expect("turn tracker lock poisoned");
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Count transitions per state since `cutoff`.
    pub fn counts_since(&self, cutoff: DateTime<Utc>) -> HashMap<&'static str, u64> {
        let events = self.events.lock().expect("turn tracker lock poisoned");
        let mut counts: HashMap<&'static str, u64> = HashMap::new();
        for event in events.iter().filter(|e| e.ts >= cutoff) {
            *counts.entry(event.state.as_str()).or_default() += 1;
        }
        counts
    }

    /// Total events currently retained.
    pub fn len(&self) -> usize {
        self.events.lock().expect("turn tracker lock poisoned").len()
    }

    /// Whether no events are retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TurnTracker {
    fn default() -> Self {
        Self::new(4096)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn tracker_counts_states_within_window() {
        let tracker = TurnTracker::new(16);
        let turn = Uuid::now_v7();

        tracker.record(turn, TurnState::Received);
        tracker.record(turn, TurnState::Routed);
        tracker.record_iteration(turn, TurnState::Executing, Some(0));
        tracker.record(turn, TurnState::Responded);
        tracker.record(turn, TurnState::ShadowScheduled);
        tracker.record(turn, TurnState::ShadowFailed);

        let cutoff = Utc::now() - ChronoDuration::hours(1);
        let counts = tracker.counts_since(cutoff);
        assert_eq!(counts.get("received"), Some(&1));
        assert_eq!(counts.get("shadow-failed"), Some(&1));
        assert_eq!(counts.get("shadow-complete"), None);
    }

    #[test]
    fn tracker_drops_oldest_at_capacity() {
        let tracker = TurnTracker::new(2);
        let turn = Uuid::now_v7();

        tracker.record(turn, TurnState::Received);
        tracker.record(turn, TurnState::Routed);
        tracker.record(turn, TurnState::Responded);

        assert_eq!(tracker.len(), 2);
        let counts = tracker.counts_since(Utc::now() - ChronoDuration::hours(1));
        assert_eq!(counts.get("received"), None);
        assert_eq!(counts.get("responded"), Some(&1));
    }

    #[test]
    fn outcome_ok_predicate() {
        let ok = InvocationOutcome::Ok {
            value: serde_json::json!({"x": 1}),
        };
        let err = InvocationOutcome::Err {
            kind: InvocationErrorKind::Unavailable,
            message: "connection refused".into(),
        };
        assert!(ok.is_ok());
        assert!(!err.is_ok());
    }
}

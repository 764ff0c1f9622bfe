//! The shadow observer.
//!
//! After every completed turn the gateway hands the exchange to
//! [`ShadowObserver::schedule`].  Scheduling is non-blocking: the observation
//! runs on its own task under its own deadline, bounded by a semaphore across
//! turns.  When the semaphore is saturated the observation is dropped and
//! counted, never queued.  Failures are logged and counted; nothing from
//! here ever reaches the user.
//!
//! The pipeline per observation: entity extraction → intent classification →
//! durability judgment → conditional writes through the backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

use mnemon_backend::BackendClient;
use mnemon_kernel::{TurnState, TurnTracker, UserContext};

use crate::error::{ObserverError, Result};
use crate::extract::{extract_entities, Entity, EntityKind};
use crate::intent::{classify_intent, IntentClassification};

/// Heuristic person matches below this confidence are never written back.
const PERSON_WRITE_CONFIDENCE: f64 = 0.7;

/// Minimum intent confidence before the raw message is stored as a fact.
const FACT_WRITE_CONFIDENCE: f64 = 0.2;

// ---------------------------------------------------------------------------
// Inputs and outcomes
// ---------------------------------------------------------------------------

/// Everything the observer sees about one completed turn.
#[derive(Debug, Clone)]
pub struct ObservationInput {
    /// The turn this observation belongs to.
    pub turn_id: Uuid,
    /// The user's message.
    pub user_message: String,
    /// The assistant's final answer.
    pub assistant_message: String,
    /// Which agent answered.
    pub primary_agent: String,
    /// The user behind the turn.
    pub user_ctx: UserContext,
}

/// What `schedule` did with an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduled {
    /// A background task was spawned; carries its task id.
    Spawned(Uuid),
    /// The concurrency cap was saturated; the observation was shed.
    Dropped,
    /// The observer is disabled by valve; scheduling was a no-op.
    Disabled,
}

/// Monotonic counters for the diagnostics surface.
#[derive(Debug, Default)]
pub struct ObserverStats {
    completed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl ObserverStats {
    /// Observations that ran to completion.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Observations that raised or timed out.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Observations shed at the semaphore.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Write seam
// ---------------------------------------------------------------------------

/// The backend writes the observation pipeline may perform.
///
/// Production code uses [`BackendClient`]; tests substitute recording mocks.
#[async_trait]
pub trait ObservationSink: Send + Sync {
    async fn create_person(
        &self,
        person: &Value,
        ctx: Option<&UserContext>,
    ) -> mnemon_backend::Result<Value>;

    async fn add_fact(
        &self,
        fact: &Value,
        ctx: Option<&UserContext>,
    ) -> mnemon_backend::Result<Value>;

    async fn update_status(
        &self,
        updates: &Value,
        ctx: Option<&UserContext>,
    ) -> mnemon_backend::Result<Value>;

    async fn store_analysis(
        &self,
        analysis: &Value,
        ctx: Option<&UserContext>,
    ) -> mnemon_backend::Result<Value>;
}

#[async_trait]
impl ObservationSink for BackendClient {
    async fn create_person(
        &self,
        person: &Value,
        ctx: Option<&UserContext>,
    ) -> mnemon_backend::Result<Value> {
        BackendClient::create_person(self, person, ctx).await
    }

    async fn add_fact(
        &self,
        fact: &Value,
        ctx: Option<&UserContext>,
    ) -> mnemon_backend::Result<Value> {
        BackendClient::add_fact(self, fact, ctx).await
    }

    async fn update_status(
        &self,
        updates: &Value,
        ctx: Option<&UserContext>,
    ) -> mnemon_backend::Result<Value> {
        BackendClient::update_status(self, updates, ctx).await
    }

    async fn store_analysis(
        &self,
        analysis: &Value,
        ctx: Option<&UserContext>,
    ) -> mnemon_backend::Result<Value> {
        BackendClient::store_analysis(self, analysis, ctx).await
    }
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

/// Bounded fire-and-forget observation scheduler.
pub struct ShadowObserver {
    sink: Arc<dyn ObservationSink>,
    semaphore: Arc<Semaphore>,
    tracker: Arc<TurnTracker>,
    stats: Arc<ObserverStats>,
    handles: Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>,
}

impl ShadowObserver {
    /// Create an observer writing through `sink`, allowing
    /// `max_concurrent` observations in flight.
    pub fn new(
        sink: Arc<dyn ObservationSink>,
        max_concurrent: usize,
        tracker: Arc<TurnTracker>,
    ) -> Self {
        Self {
            sink,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            tracker,
            stats: Arc::new(ObserverStats::default()),
            handles: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The shared counters.
    pub fn stats(&self) -> Arc<ObserverStats> {
        Arc::clone(&self.stats)
    }

    /// Schedule one observation.  Never blocks and never surfaces errors.
    ///
    /// `enabled` reflects the `enable_shadow_observer` valve; when false the
    /// call is a no-op.  `deadline` is the observation's own budget,
    /// unrelated to any request deadline.
    pub fn schedule(
        &self,
        input: ObservationInput,
        enabled: bool,
        deadline: Duration,
    ) -> Scheduled {
        if !enabled {
            return Scheduled::Disabled;
        }

        let turn_id = input.turn_id;

        let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            self.tracker.record(turn_id, TurnState::ShadowDropped);
            tracing::warn!(turn_id = %turn_id, "observation dropped: concurrency cap saturated");
            return Scheduled::Dropped;
        };

        let task_id = Uuid::now_v7();
        self.tracker.record(turn_id, TurnState::ShadowScheduled);

        let sink = Arc::clone(&self.sink);
        let tracker = Arc::clone(&self.tracker);
        let stats = Arc::clone(&self.stats);
        let handles = Arc::clone(&self.handles);

        let handle = tokio::spawn(async move {
            let _permit = permit;

            let result = match tokio::time::timeout(deadline, observe(&*sink, &input)).await {
                Ok(result) => result,
                Err(_elapsed) => Err(ObserverError::Timeout {
                    seconds: deadline.as_secs(),
                }),
            };

            match result {
                Ok(writes) => {
                    stats.completed.fetch_add(1, Ordering::Relaxed);
                    tracker.record(turn_id, TurnState::ShadowComplete);
                    tracing::debug!(turn_id = %turn_id, writes, "shadow observation complete");
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    tracker.record(turn_id, TurnState::ShadowFailed);
                    tracing::warn!(turn_id = %turn_id, error = %e, "shadow observation failed");
                }
            }

            handles.lock().expect("handle table lock poisoned").remove(&task_id);
        });

        self.handles
            .lock()
            .expect("handle table lock poisoned")
            .insert(task_id, handle);

        Scheduled::Spawned(task_id)
    }

    /// Number of observations currently in flight.
    pub fn active_count(&self) -> usize {
        self.handles.lock().expect("handle table lock poisoned").len()
    }

    /// Await every in-flight observation.  Used in tests and at shutdown.
    pub async fn join_all(&self) {
        loop {
            let handle = {
                let mut handles = self.handles.lock().expect("handle table lock poisoned");
                let Some(key) = handles.keys().next().copied() else {
                    return;
                };
                handles.remove(&key)
            };
            if let Some(handle) = handle {
                let _ = handle.await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Run the observation pipeline, returning how many writes were made.
async fn observe(sink: &dyn ObservationSink, input: &ObservationInput) -> Result<u64> {
    let ctx = Some(&input.user_ctx);
    let entities = extract_entities(&input.user_message, 0.5);
    let intent = classify_intent(&input.user_message);

    tracing::debug!(
        turn_id = %input.turn_id,
        entities = entities.len(),
        intent = %intent.primary,
        confidence = intent.confidence,
        "observation analysis"
    );

    let mut writes = 0u64;

    // Durable person entities become contacts when the conversation is about
    // people or remembering.
    if matches!(intent.primary.as_str(), "add_contact" | "save_info") {
        for person in entities
            .iter()
            .filter(|e| e.kind == EntityKind::Person && e.confidence >= PERSON_WRITE_CONFIDENCE)
        {
            let record = person_record(person, &entities, input);
            sink.create_person(&record, ctx).await?;
            writes += 1;
        }
    }

    // Explicit save/update intent preserves the raw statement as a fact.
    if matches!(intent.primary.as_str(), "save_info" | "update_info")
        && intent.confidence >= FACT_WRITE_CONFIDENCE
    {
        let fact = json!({
            "fact": input.user_message,
            "confidence": intent.confidence,
            "source": format!("conversation:{}", input.turn_id),
        });
        sink.add_fact(&fact, ctx).await?;
        writes += 1;
    }

    // Event language nudges the current status.
    if intent.primary == "record_event" && intent.confidence >= FACT_WRITE_CONFIDENCE {
        let updates = json!({
            "updates": {
                "recent_activity": input.user_message,
            }
        });
        sink.update_status(&updates, ctx).await?;
        writes += 1;
    }

    // The analysis document is always stored; it is the observer's record of
    // what it saw.
    let analysis = analysis_record(input, &entities, &intent);
    sink.store_analysis(&analysis, ctx).await?;
    writes += 1;

    Ok(writes)
}

/// Build the person payload, attaching the first co-mentioned email/phone.
fn person_record(person: &Entity, entities: &[Entity], input: &ObservationInput) -> Value {
    let email = entities
        .iter()
        .find(|e| e.kind == EntityKind::Email)
        .map(|e| e.text.clone());
    let phone = entities
        .iter()
        .find(|e| e.kind == EntityKind::Phone)
        .map(|e| e.text.clone());

    let mut record = json!({
        "name": person.text,
        "confidence": person.confidence,
        "source": format!("conversation:{}", input.turn_id),
    });
    if let Some(email) = email {
        record["email"] = json!(email);
    }
    if let Some(phone) = phone {
        record["phone"] = json!(phone);
    }
    record
}

fn analysis_record(
    input: &ObservationInput,
    entities: &[Entity],
    intent: &IntentClassification,
) -> Value {
    json!({
        "conversation_id": input.turn_id.to_string(),
        "conversation_text": input.user_message,
        "analysis": {
            "primary_agent": input.primary_agent,
            "assistant_message": input.assistant_message,
            "entities": entities,
            "intent": intent,
            "observed_at": chrono::Utc::now().to_rfc3339(),
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use mnemon_backend::BackendError;

    #[derive(Default)]
    struct RecordingSink {
        persons: Mutex<Vec<Value>>,
        facts: Mutex<Vec<Value>>,
        statuses: Mutex<Vec<Value>>,
        analyses: Mutex<Vec<Value>>,
        delay: Option<Duration>,
        fail_analysis: bool,
    }

    #[async_trait]
    impl ObservationSink for RecordingSink {
        async fn create_person(
            &self,
            person: &Value,
            _ctx: Option<&UserContext>,
        ) -> mnemon_backend::Result<Value> {
            self.persons.lock().unwrap().push(person.clone());
            Ok(json!({"created": true}))
        }

        async fn add_fact(
            &self,
            fact: &Value,
            _ctx: Option<&UserContext>,
        ) -> mnemon_backend::Result<Value> {
            self.facts.lock().unwrap().push(fact.clone());
            Ok(json!({"added": true}))
        }

        async fn update_status(
            &self,
            updates: &Value,
            _ctx: Option<&UserContext>,
        ) -> mnemon_backend::Result<Value> {
            self.statuses.lock().unwrap().push(updates.clone());
            Ok(json!({"updated": true}))
        }

        async fn store_analysis(
            &self,
            analysis: &Value,
            _ctx: Option<&UserContext>,
        ) -> mnemon_backend::Result<Value> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_analysis {
                return Err(BackendError::Unavailable {
                    reason: "backend down".into(),
                });
            }
            self.analyses.lock().unwrap().push(analysis.clone());
            Ok(json!({"stored": true}))
        }
    }

    fn input(message: &str) -> ObservationInput {
        ObservationInput {
            turn_id: Uuid::now_v7(),
            user_message: message.to_owned(),
            assistant_message: "noted".to_owned(),
            primary_agent: "personal_assistant".to_owned(),
            user_ctx: UserContext::anonymous(),
        }
    }

    fn observer_with(sink: Arc<RecordingSink>, max_concurrent: usize) -> ShadowObserver {
        ShadowObserver::new(sink, max_concurrent, Arc::new(TurnTracker::new(64)))
    }

    #[tokio::test]
    async fn contact_mention_writes_person_and_analysis() {
        let sink = Arc::new(RecordingSink::default());
        let observer = observer_with(Arc::clone(&sink), 2);

        let scheduled = observer.schedule(
            input("I met Sarah Connor today, her email is sarah@example.com"),
            true,
            Duration::from_secs(5),
        );
        assert!(matches!(scheduled, Scheduled::Spawned(_)));
        observer.join_all().await;

        let persons = sink.persons.lock().unwrap();
        assert_eq!(persons.len(), 1);
        assert_eq!(persons[0]["name"], "Sarah Connor");
        assert_eq!(persons[0]["email"], "sarah@example.com");
        assert_eq!(sink.analyses.lock().unwrap().len(), 1);
        assert_eq!(observer.stats().completed(), 1);
    }

    #[tokio::test]
    async fn save_intent_writes_a_fact() {
        let sink = Arc::new(RecordingSink::default());
        let observer = observer_with(Arc::clone(&sink), 2);

        observer.schedule(
            input("please remember that I prefer morning meetings"),
            true,
            Duration::from_secs(5),
        );
        observer.join_all().await;

        let facts = sink.facts.lock().unwrap();
        assert_eq!(facts.len(), 1);
        assert!(facts[0]["fact"]
            .as_str()
            .unwrap()
            .contains("morning meetings"));
    }

    #[tokio::test]
    async fn disabled_observer_is_a_no_op() {
        let sink = Arc::new(RecordingSink::default());
        let observer = observer_with(Arc::clone(&sink), 2);

        let scheduled = observer.schedule(input("remember this"), false, Duration::from_secs(5));
        assert_eq!(scheduled, Scheduled::Disabled);
        observer.join_all().await;

        assert!(sink.analyses.lock().unwrap().is_empty());
        assert_eq!(observer.stats().completed(), 0);
    }

    #[tokio::test]
    async fn saturation_drops_and_counts() {
        let sink = Arc::new(RecordingSink {
            delay: Some(Duration::from_millis(200)),
            ..RecordingSink::default()
        });
        let observer = observer_with(Arc::clone(&sink), 1);

        let first = observer.schedule(input("slow one"), true, Duration::from_secs(5));
        let second = observer.schedule(input("shed me"), true, Duration::from_secs(5));

        assert!(matches!(first, Scheduled::Spawned(_)));
        assert_eq!(second, Scheduled::Dropped);
        assert_eq!(observer.stats().dropped(), 1);

        observer.join_all().await;
        assert_eq!(observer.stats().completed(), 1);
    }

    #[tokio::test]
    async fn pipeline_failure_is_counted_not_raised() {
        let sink = Arc::new(RecordingSink {
            fail_analysis: true,
            ..RecordingSink::default()
        });
        let tracker = Arc::new(TurnTracker::new(64));
        let observer = ShadowObserver::new(Arc::clone(&sink) as Arc<dyn ObservationSink>, 2, Arc::clone(&tracker));

        observer.schedule(input("anything at all"), true, Duration::from_secs(5));
        observer.join_all().await;

        assert_eq!(observer.stats().failed(), 1);
        assert_eq!(observer.stats().completed(), 0);

        let counts = tracker.counts_since(chrono::Utc::now() - chrono::Duration::hours(1));
        assert_eq!(counts.get("shadow-failed"), Some(&1));
    }

    #[tokio::test]
    async fn deadline_expiry_counts_as_failure() {
        let sink = Arc::new(RecordingSink {
            delay: Some(Duration::from_secs(30)),
            ..RecordingSink::default()
        });
        let observer = observer_with(Arc::clone(&sink), 2);

        observer.schedule(input("too slow"), true, Duration::from_millis(50));
        observer.join_all().await;

        assert_eq!(observer.stats().failed(), 1);
    }
}

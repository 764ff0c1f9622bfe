//! Ring-buffered structured log store.
//!
//! Log records flow to stdout through the normal [`tracing_subscriber`]
//! stack; [`BufferLayer`] tees every event into a shared [`LogBuffer`] so the
//! admin endpoints can project recent logs as JSON without touching files.
//! Writes are constant-time: the ring drops its oldest record at capacity.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Log severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Parse the level names accepted by the `log_level` valve.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "TRACE" => Some(Self::Trace),
            "DEBUG" => Some(Self::Debug),
            "INFO" => Some(Self::Info),
            "WARNING" | "WARN" => Some(Self::Warning),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    /// Stable display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Self::Trace,
            tracing::Level::DEBUG => Self::Debug,
            tracing::Level::INFO => Self::Info,
            tracing::Level::WARN => Self::Warning,
            tracing::Level::ERROR => Self::Error,
        }
    }
}

/// One structured log record.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    /// When the record was emitted.
    pub ts: DateTime<Utc>,

    /// Severity.
    pub level: LogLevel,

    /// The emitting module path (tracing target).
    pub source: String,

    /// The formatted message.
    pub message: String,

    /// The turn this record belongs to, when the event carried a `turn_id`
    /// field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<Uuid>,

    /// All remaining structured fields.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Buffer
// ---------------------------------------------------------------------------

/// Lock-protected ring buffer of log records.
pub struct LogBuffer {
    inner: Mutex<VecDeque<LogRecord>>,
    capacity: usize,
}

impl LogBuffer {
    /// Create a buffer bounded to `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a record, evicting the oldest at capacity.
    pub fn push(&self, record: LogRecord) {
        let mut inner = self.inner.lock().expect("log buffer lock poisoned");
        if inner.len() == self.capacity {
            inner.pop_front();
        }
        inner.push_back(record);
    }

    /// Project the most recent records: at least `min_level`, emitted at or
    /// after `since`, newest-last, clamped to `max_lines`.
    pub fn tail(
        &self,
        min_level: LogLevel,
        since: DateTime<Utc>,
        max_lines: usize,
    ) -> Vec<LogRecord> {
        let inner = self.inner.lock().expect("log buffer lock poisoned");
        let mut selected: Vec<LogRecord> = inner
            .iter()
            .rev()
            .filter(|r| r.level >= min_level && r.ts >= since)
            .take(max_lines)
            .cloned()
            .collect();
        selected.reverse();
        selected
    }

    /// Number of records currently retained.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("log buffer lock poisoned").len()
    }

    /// Whether the buffer holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(8192)
    }
}

// ---------------------------------------------------------------------------
// Tracing layer
// ---------------------------------------------------------------------------

/// A [`tracing_subscriber::Layer`] that copies every event into a shared
/// [`LogBuffer`].  Install it alongside the stdout formatting layer.
pub struct BufferLayer {
    buffer: Arc<LogBuffer>,
}

impl BufferLayer {
    /// Create a layer writing into `buffer`.
    pub fn new(buffer: Arc<LogBuffer>) -> Self {
        Self { buffer }
    }
}

impl<S: Subscriber> Layer<S> for BufferLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        self.buffer.push(LogRecord {
            ts: Utc::now(),
            level: LogLevel::from(*event.metadata().level()),
            source: event.metadata().target().to_owned(),
            message: visitor.message.unwrap_or_default(),
            turn_id: visitor.turn_id,
            fields: visitor.fields,
        });
    }
}

/// Visitor that splits the `message` and `turn_id` fields out of an event and
/// collects everything else as JSON.
#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    turn_id: Option<Uuid>,
    fields: Map<String, Value>,
}

impl FieldVisitor {
    fn record_value(&mut self, field: &Field, value: Value) {
        match field.name() {
            "message" => {
                self.message = Some(match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                });
            }
            "turn_id" => {
                self.turn_id = value.as_str().and_then(|s| Uuid::parse_str(s).ok());
                if self.turn_id.is_none() {
                    self.fields.insert("turn_id".to_owned(), value);
                }
            }
            name => {
                self.fields.insert(name.to_owned(), value);
            }
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_value(field, Value::String(value.to_owned()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_value(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_value(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.record_value(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_value(field, Value::Bool(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.record_value(field, Value::String(format!("{value:?}")));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn record(level: LogLevel, message: &str) -> LogRecord {
        LogRecord {
            ts: Utc::now(),
            level,
            source: "test".into(),
            message: message.into(),
            turn_id: None,
            fields: Map::new(),
        }
    }

    #[test]
    fn ring_evicts_oldest() {
        let buffer = LogBuffer::new(2);
        buffer.push(record(LogLevel::Info, "first"));
        buffer.push(record(LogLevel::Info, "second"));
        buffer.push(record(LogLevel::Info, "third"));

        let tail = buffer.tail(
            LogLevel::Trace,
            Utc::now() - ChronoDuration::hours(1),
            10,
        );
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].message, "second");
        assert_eq!(tail[1].message, "third");
    }

    #[test]
    fn tail_filters_by_level() {
        let buffer = LogBuffer::new(16);
        buffer.push(record(LogLevel::Debug, "noise"));
        buffer.push(record(LogLevel::Warning, "signal"));
        buffer.push(record(LogLevel::Error, "loud"));

        let tail = buffer.tail(
            LogLevel::Warning,
            Utc::now() - ChronoDuration::hours(1),
            10,
        );
        assert_eq!(tail.len(), 2);
        assert!(tail.iter().all(|r| r.level >= LogLevel::Warning));
    }

    #[test]
    fn tail_respects_max_lines_keeping_newest() {
        let buffer = LogBuffer::new(16);
        for i in 0..5 {
            buffer.push(record(LogLevel::Info, &format!("msg-{i}")));
        }

        let tail = buffer.tail(LogLevel::Trace, Utc::now() - ChronoDuration::hours(1), 2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].message, "msg-3");
        assert_eq!(tail[1].message, "msg-4");
    }

    #[test]
    fn tail_excludes_records_before_cutoff() {
        let buffer = LogBuffer::new(16);
        let mut old = record(LogLevel::Info, "old");
        old.ts = Utc::now() - ChronoDuration::hours(48);
        buffer.push(old);
        buffer.push(record(LogLevel::Info, "fresh"));

        let tail = buffer.tail(
            LogLevel::Trace,
            Utc::now() - ChronoDuration::hours(24),
            10,
        );
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].message, "fresh");
    }

    #[test]
    fn level_parsing_accepts_valve_options() {
        assert_eq!(LogLevel::parse("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("info"), Some(LogLevel::Info));
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warning));
        assert_eq!(LogLevel::parse("bogus"), None);
    }

    #[test]
    fn layer_captures_events() {
        use tracing_subscriber::layer::SubscriberExt;

        let buffer = Arc::new(LogBuffer::new(16));
        let subscriber =
            tracing_subscriber::registry().with(BufferLayer::new(Arc::clone(&buffer)));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(turn_id = %Uuid::now_v7(), count = 3, "captured message");
        });

        let tail = buffer.tail(LogLevel::Trace, Utc::now() - ChronoDuration::hours(1), 10);
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].message, "captured message");
        assert!(tail[0].turn_id.is_some());
        assert_eq!(tail[0].fields.get("count"), Some(&Value::from(3)));
    }
}

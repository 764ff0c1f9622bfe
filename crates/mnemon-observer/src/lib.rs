//! Shadow observer for the Mnemon gateway.
//!
//! A background pipeline that mines each completed turn for durable
//! information and writes it back to the knowledge backend without ever
//! touching the user-facing response path:
//!
//! - **[`extract`]** -- regex entity extraction (emails, phones, person
//!   names).
//! - **[`intent`]** -- keyword intent classification.
//! - **[`observer`]** -- [`ShadowObserver`]: semaphore-bounded scheduling,
//!   per-observation deadlines, drop/complete/fail counters, and the
//!   conditional-write pipeline.

pub mod error;
pub mod extract;
pub mod intent;
pub mod observer;

pub use error::{ObserverError, Result};
pub use extract::{extract_entities, Entity, EntityKind};
pub use intent::{classify_intent, IntentClassification};
pub use observer::{ObservationInput, ObservationSink, ObserverStats, Scheduled, ShadowObserver};

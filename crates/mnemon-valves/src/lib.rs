//! Configuration valves for the Mnemon gateway.
//!
//! A *valve* is one named configuration knob with a declared type,
//! validation, category, and persistence.  The gateway consults valves
//! throughout a turn (feature gates, limits, timeouts) and exposes them over
//! the admin surface:
//!
//! - **[`spec`]** -- valve and category declarations with the three-stage
//!   validation pipeline (type → range/enum → custom).
//! - **[`catalog`]** -- the shipped valve set across the seven standard
//!   categories.
//! - **[`manager`]** -- [`ValveManager`]: per-field-atomic batch updates,
//!   atomic JSON persistence, synchronous panic-isolated change listeners,
//!   restart-required surfacing.

pub mod catalog;
pub mod error;
pub mod manager;
pub mod spec;

pub use error::{Result, ValveError};
pub use manager::{ChangeListener, FieldValidation, UpdateOutcome, ValveManager};
pub use spec::{ValveCategory, ValveSpec, ValveType};

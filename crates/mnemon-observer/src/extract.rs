//! Entity extraction over conversation text.
//!
//! Lightweight regex extraction for the entity kinds the observer writes
//! back: email addresses, phone numbers, and probable person names
//! (consecutive capitalised words).  Confidence reflects how unambiguous the
//! pattern is; name-pair detection is a heuristic and scores lower.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Kinds of extracted entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Email,
    Phone,
    Person,
}

/// One extracted entity.
#[derive(Debug, Clone, Serialize)]
pub struct Entity {
    /// The matched text.
    pub text: String,
    /// What kind of entity it is.
    pub kind: EntityKind,
    /// Extraction confidence in `[0, 1]`.
    pub confidence: f64,
}

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("email regex")
});

static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\+?1[-.\s]?)?\(?[0-9]{3}\)?[-.\s]?[0-9]{3}[-.\s]?[0-9]{4}\b")
        .expect("phone regex")
});

static NAME_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z][a-z]{2,}\s+[A-Z][a-z]{2,}\b").expect("name regex")
});

/// Extract entities above `min_confidence` from `text`.
pub fn extract_entities(text: &str, min_confidence: f64) -> Vec<Entity> {
    let mut entities = Vec::new();

    for m in EMAIL.find_iter(text) {
        entities.push(Entity {
            text: m.as_str().to_owned(),
            kind: EntityKind::Email,
            confidence: 0.9,
        });
    }

    for m in PHONE.find_iter(text) {
        entities.push(Entity {
            text: m.as_str().to_owned(),
            kind: EntityKind::Phone,
            confidence: 0.9,
        });
    }

    for m in NAME_PAIR.find_iter(text) {
        // Emails matched above can contain capitalised fragments; keep name
        // detection disjoint from them.
        if entities
            .iter()
            .any(|e| e.kind == EntityKind::Email && e.text.contains(m.as_str()))
        {
            continue;
        }
        entities.push(Entity {
            text: m.as_str().to_owned(),
            kind: EntityKind::Person,
            confidence: 0.7,
        });
    }

    entities.retain(|e| e.confidence >= min_confidence);
    entities
}

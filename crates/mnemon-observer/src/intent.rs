//! Intent classification over conversation text.
//!
//! Keyword-scored classification into the five intent classes the observer
//! acts on.  Scores are the fraction of a class's keywords present in the
//! lowercased text; the winner becomes the primary intent.

use std::collections::BTreeMap;

use serde::Serialize;

/// The intent classes the observer recognises.
pub const INTENT_CLASSES: &[(&str, &[&str])] = &[
    ("add_contact", &["contact", "person", "meet", "met", "introduce", "know", "friend"]),
    ("update_info", &["update", "change", "modify", "correct", "new"]),
    ("record_event", &["event", "meeting", "appointment", "schedule", "plan"]),
    ("save_info", &["remember", "save", "store", "keep", "note"]),
    ("search_info", &["find", "search", "look", "what", "where", "when", "who"]),
];

/// The outcome of classifying one piece of text.
#[derive(Debug, Clone, Serialize)]
pub struct IntentClassification {
    /// The winning class, or `unknown` when nothing matched.
    pub primary: String,

    /// The winning score in `[0, 1]`.
    pub confidence: f64,

    /// Per-class scores.
    pub scores: BTreeMap<String, f64>,
}

/// Classify `text` against the standard intent classes.
pub fn classify_intent(text: &str) -> IntentClassification {
    let lowered = text.to_lowercase();

    let mut scores = BTreeMap::new();
    for (class, keywords) in INTENT_CLASSES {
        let matched = keywords.iter().filter(|k| lowered.contains(**k)).count();
        scores.insert(
            (*class).to_owned(),
            matched as f64 / keywords.len() as f64,
        );
    }

    let (primary, confidence) = scores
        .iter()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(class, score)| (class.clone(), *score))
        .unwrap_or_else(|| ("unknown".to_owned(), 0.0));

    let primary = if confidence == 0.0 {
        "unknown".to_owned()
    } else {
        primary
    };

    IntentClassification {
        primary,
        confidence,
        scores,
    }
}

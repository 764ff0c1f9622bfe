//! Agent descriptors.
//!
//! An agent is a named bundle of system prompt, tool allowlist, and budget.
//! Descriptors are built once at startup from the static table below and
//! never mutated; per-request budget overrides come from valves and are
//! applied to a clone.

use std::collections::BTreeSet;
use std::time::Duration;

/// Immutable declaration of one agent.
#[derive(Debug, Clone)]
pub struct AgentDescriptor {
    /// Stable agent id, also the model id on the chat surface.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Short description shown in model listings.
    pub description: String,

    /// The tools this agent may invoke, by registered name.
    pub tool_allowlist: BTreeSet<String>,

    /// Base system prompt; the user-context block is appended per turn.
    pub system_prompt: String,

    /// Preferred model; `None` uses the LLM client default.
    pub model_hint: Option<String>,

    /// Maximum LLM iterations per turn.
    pub max_iterations: u32,

    /// Hard wall-clock deadline per turn.
    pub max_wall_time: Duration,

    /// Whether this agent may hand work to collaborators.
    pub allow_delegation: bool,

    /// Passive agents observe but never answer users directly.
    pub passive: bool,
}

impl AgentDescriptor {
    /// Apply valve-driven budget overrides to a clone of this descriptor.
    pub fn with_budget(&self, max_iterations: u32, max_wall_time: Duration) -> Self {
        let mut out = self.clone();
        out.max_iterations = max_iterations;
        out.max_wall_time = max_wall_time;
        out
    }
}

/// The standard two-agent table: the comprehensive personal assistant and
/// the passive shadow observer.
pub fn standard_descriptors() -> Vec<AgentDescriptor> {
    vec![personal_assistant(), shadow_observer()]
}

/// Look up a descriptor by id within a table.
pub fn find<'a>(table: &'a [AgentDescriptor], id: &str) -> Option<&'a AgentDescriptor> {
    table.iter().find(|d| d.id == id)
}

fn personal_assistant() -> AgentDescriptor {
    AgentDescriptor {
        id: "personal_assistant".to_owned(),
        name: "Personal Assistant".to_owned(),
        description: "Comprehensive assistant for scheduling, memory, research, health, \
                      finance, and general productivity"
            .to_owned(),
        tool_allowlist: [
            "search_memory",
            "create_person",
            "add_memory_fact",
            "get_user_profile",
            "update_user_profile",
            "get_current_status",
            "update_user_status",
            "search_conversations",
            "get_current_time",
        ]
        .into_iter()
        .map(ToOwned::to_owned)
        .collect(),
        system_prompt: "\
You are the user's comprehensive personal assistant.

Handle every kind of request: time and scheduling, weather, calendar planning, \
memory and contact management, document analysis and research, health tracking, \
and financial questions.  Combine tools when it helps — check the time before \
planning a meeting, search memory before answering questions about people, and \
cross-reference stored facts with the current conversation.

When the user mentions durable facts (names, contact details, relationships, \
preferences), store them so future conversations benefit.  Answer directly and \
concisely once you have what you need; do not narrate tool usage."
            .to_owned(),
        model_hint: None,
        max_iterations: 25,
        max_wall_time: Duration::from_secs(120),
        allow_delegation: false,
        passive: false,
    }
}

fn shadow_observer() -> AgentDescriptor {
    AgentDescriptor {
        id: "shadow_observer".to_owned(),
        name: "Shadow Observer".to_owned(),
        description: "Silently mines completed turns for durable information; never a \
                      primary responder"
            .to_owned(),
        tool_allowlist: [
            "extract_conversation_entities",
            "infer_conversation_intent",
            "store_conversation_analysis",
            "create_person",
            "add_memory_fact",
            "update_user_status",
        ]
        .into_iter()
        .map(ToOwned::to_owned)
        .collect(),
        system_prompt: "\
You are a background observer analysing a completed exchange.

Extract durable information: people mentioned, contact details, stated \
preferences, and status changes.  Judge whether each item is worth remembering \
before writing it.  You are never the primary responder; keep any textual \
output to a brief analytic note."
            .to_owned(),
        model_hint: None,
        max_iterations: 5,
        max_wall_time: Duration::from_secs(30),
        allow_delegation: false,
        passive: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_declares_both_agents() {
        let table = standard_descriptors();
        assert_eq!(table.len(), 2);
        assert!(find(&table, "personal_assistant").is_some());
        assert!(find(&table, "shadow_observer").is_some());
        assert!(find(&table, "memory_librarian").is_none());
    }

    #[test]
    fn only_the_shadow_observer_is_passive() {
        for descriptor in standard_descriptors() {
            assert_eq!(descriptor.passive, descriptor.id == "shadow_observer");
        }
    }

    #[test]
    fn budget_override_leaves_original_untouched() {
        let table = standard_descriptors();
        let assistant = find(&table, "personal_assistant").unwrap();
        let tight = assistant.with_budget(2, Duration::from_secs(5));

        assert_eq!(tight.max_iterations, 2);
        assert_eq!(assistant.max_iterations, 25);
    }
}

//! Deterministic agent router.
//!
//! The router scores an incoming user message against each agent's declared
//! keyword set and pattern bundle, then selects a primary agent:
//!
//! | Signal | Technique | Weight |
//! |--------|-----------|--------|
//! | Keyword | substring match via [`aho_corasick`] | 2 |
//! | Pattern | compiled [`regex::RegexSet`] | 3 |
//!
//! A per-agent `priority_multiplier` scales the score; the shadow observer
//! carries `0.0` so it can never win.  Ties prefer the default agent, then
//! declaration order.  A zero winning score falls back to the default agent.
//! The router is a pure function of its inputs: identical messages always
//! produce identical decisions.
//!
//! # Example
//!
//! ```rust
//! # use mnemon_kernel::router::{AgentProfile, Router};
//! let profiles = vec![
//!     AgentProfile::new("personal_assistant")
//!         .with_keywords(["weather", "schedule"])
//!         .as_default(),
//!     AgentProfile::new("shadow_observer")
//!         .with_keywords(["pattern", "behavior"])
//!         .with_priority_multiplier(0.0),
//! ];
//! let router = Router::new(profiles).unwrap();
//!
//! let decision = router.decide("what is the weather today?");
//! assert_eq!(decision.primary, "personal_assistant");
//! ```

use aho_corasick::AhoCorasick;
use regex::RegexSet;
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};

/// Score contributed by each matched keyword.
const WEIGHT_KEYWORD: u32 = 2;

/// Score contributed by each matched pattern.
const WEIGHT_PATTERN: u32 = 3;

/// Collaborators are agents scoring at least this fraction of the winner.
const COLLABORATION_RATIO: f64 = 0.7;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Message complexity estimate derived from the winning score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    /// Winning score below 5.
    Simple,
    /// Winning score 5 or above.
    Complex,
}

/// The outcome of routing one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// The agent that should handle the turn.  Never a passive agent.
    pub primary: String,

    /// Normalised confidence in `[0, 1]`.
    pub confidence: f64,

    /// Human-readable explanation of the selection.
    pub rationale: String,

    /// Simple vs complex, for downstream budget decisions.
    pub complexity: Complexity,

    /// Other agents that scored close enough to be worth consulting.
    pub collaborators: Vec<String>,

    /// Whether any collaborators were found.
    pub requires_collaboration: bool,
}

/// Routing configuration for one agent: keywords, patterns, and priority.
#[derive(Debug)]
pub struct AgentProfile {
    /// The agent id this profile routes to.
    pub id: String,

    /// Declared keywords (lowercased at build time).
    keywords: Vec<String>,

    /// Compiled automaton over the keyword set (absent when empty).
    automaton: Option<AhoCorasick>,

    /// Raw pattern sources, kept for diagnostics.
    pattern_sources: Vec<String>,

    /// Compiled pattern set (absent when empty).
    patterns: Option<RegexSet>,

    /// Scales the raw score.  `0.0` makes the agent passive: it can never
    /// be selected as primary.
    pub priority_multiplier: f64,

    /// Whether this agent wins ties and absorbs zero-score messages.
    pub is_default: bool,
}

impl AgentProfile {
    /// Create a profile with no keywords or patterns and multiplier `1.0`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            keywords: Vec::new(),
            automaton: None,
            pattern_sources: Vec::new(),
            patterns: None,
            priority_multiplier: 1.0,
            is_default: false,
        }
    }

    /// Declare the keyword set.  Matching is case-insensitive substring
    /// containment; each distinct keyword counts once per message.
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords
            .into_iter()
            .map(|k| k.into().to_lowercase())
            .collect();
        self.automaton = if self.keywords.is_empty() {
            None
        } else {
            AhoCorasick::new(&self.keywords).ok()
        };
        self
    }

    /// Declare the regex pattern bundle.  Patterns are matched against the
    /// lowercased message; each distinct pattern counts once.
    ///
    /// Returns an error if any pattern fails to compile.
    pub fn with_patterns<I, S>(mut self, patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pattern_sources = patterns.into_iter().map(Into::into).collect();
        if self.pattern_sources.is_empty() {
            self.patterns = None;
            return Ok(self);
        }
        let set = RegexSet::new(&self.pattern_sources).map_err(|e| {
            KernelError::InvalidPattern {
                pattern: self.pattern_sources.join(" | "),
                reason: e.to_string(),
            }
        })?;
        self.patterns = Some(set);
        Ok(self)
    }

    /// Override the priority multiplier.
    pub fn with_priority_multiplier(mut self, multiplier: f64) -> Self {
        self.priority_multiplier = multiplier;
        self
    }

    /// Mark this agent as the default.
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Number of distinct keywords found in the lowercased message.
    fn keyword_matches(&self, lowered: &str) -> u32 {
        let Some(ref ac) = self.automaton else {
            return 0;
        };
        let mut seen = vec![false; self.keywords.len()];
        for mat in ac.find_overlapping_iter(lowered) {
            seen[mat.pattern().as_usize()] = true;
        }
        seen.iter().filter(|s| **s).count() as u32
    }

    /// Number of distinct patterns that match the lowercased message.
    fn pattern_matches(&self, lowered: &str) -> u32 {
        self.patterns
            .as_ref()
            .map(|set| set.matches(lowered).iter().count() as u32)
            .unwrap_or(0)
    }

    /// Raw weighted score, scaled by the priority multiplier.
    fn score(&self, lowered: &str) -> f64 {
        let raw = self.keyword_matches(lowered) * WEIGHT_KEYWORD
            + self.pattern_matches(lowered) * WEIGHT_PATTERN;
        f64::from(raw) * self.priority_multiplier
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Scores messages against agent profiles and picks a primary agent.
///
/// The router holds compiled automata and is **not** `Clone`; wrap in `Arc`
/// for shared access.  `decide` takes `&self` and performs no I/O.
pub struct Router {
    profiles: Vec<AgentProfile>,
    default_index: usize,
}

impl Router {
    /// Build a router from agent profiles.
    ///
    /// Requires at least one profile.  The default agent is the first profile
    /// flagged with [`AgentProfile::as_default`], falling back to the first
    /// profile in declaration order; it must not be passive (multiplier 0).
    pub fn new(profiles: Vec<AgentProfile>) -> Result<Self> {
        if profiles.is_empty() {
            return Err(KernelError::RouterMisconfigured {
                reason: "no agent profiles declared".into(),
            });
        }

        let default_index = profiles.iter().position(|p| p.is_default).unwrap_or(0);

        if profiles[default_index].priority_multiplier == 0.0 {
            return Err(KernelError::RouterMisconfigured {
                reason: format!(
                    "default agent `{}` is passive and can never respond",
                    profiles[default_index].id
                ),
            });
        }

        Ok(Self {
            profiles,
            default_index,
        })
    }

    /// The id of the default agent.
    pub fn default_agent(&self) -> &str {
        &self.profiles[self.default_index].id
    }

    /// Route one message.  Pure and deterministic.
    pub fn decide(&self, message: &str) -> RoutingDecision {
        let lowered = message.to_lowercase();

        let scores: Vec<f64> = self.profiles.iter().map(|p| p.score(&lowered)).collect();

        let winning_score = scores.iter().copied().fold(0.0_f64, f64::max);

        let winner_index = if winning_score == 0.0 {
            self.default_index
        } else {
            // Collect ties at the max and break them: default first, then
            // declaration order.
            let tied: Vec<usize> = scores
                .iter()
                .enumerate()
                .filter(|(_, s)| **s == winning_score)
                .map(|(i, _)| i)
                .collect();
            if tied.contains(&self.default_index) {
                self.default_index
            } else {
                tied[0]
            }
        };

        let winner = &self.profiles[winner_index];

        let rationale = if winning_score == 0.0 {
            format!("no patterns matched; defaulting to {}", winner.id)
        } else {
            format!(
                "selected {} by keyword/pattern match (score {})",
                winner.id, winning_score
            )
        };

        let collaborators: Vec<String> = if winning_score > 0.0 {
            self.profiles
                .iter()
                .enumerate()
                .filter(|(i, _)| {
                    *i != winner_index
                        && scores[*i] > 0.0
                        && scores[*i] >= winning_score * COLLABORATION_RATIO
                })
                .map(|(_, p)| p.id.clone())
                .collect()
        } else {
            Vec::new()
        };

        let decision = RoutingDecision {
            primary: winner.id.clone(),
            confidence: (winning_score / 10.0).min(1.0),
            rationale,
            complexity: if winning_score < 5.0 {
                Complexity::Simple
            } else {
                Complexity::Complex
            },
            requires_collaboration: !collaborators.is_empty(),
            collaborators,
        };

        tracing::debug!(
            primary = %decision.primary,
            confidence = decision.confidence,
            complexity = ?decision.complexity,
            "routing decision"
        );

        decision
    }
}

// ---------------------------------------------------------------------------
// Standard profiles
// ---------------------------------------------------------------------------

/// The standard two-agent profile set: the comprehensive personal assistant
/// (default) and the passive shadow observer.
pub fn standard_profiles() -> Result<Vec<AgentProfile>> {
    let assistant = AgentProfile::new("personal_assistant")
        .with_keywords([
            // Calendar and time
            "calendar", "schedule", "appointment", "meeting", "time", "date", "weather",
            "temperature", "forecast", "remind", "task", "todo", "organize", "plan", "event",
            "deadline",
            // Contact and memory management
            "remember", "contact", "person", "email", "phone", "address", "save", "store",
            "update", "delete", "information", "database", "knowledge", "entity",
            "relationship",
            // Research and analysis
            "research", "analyze", "document", "text", "sentiment", "language", "summarize",
            "extract", "study", "investigate", "report", "paper", "article", "analysis",
            "insights",
            // Health tracking
            "health", "fitness", "exercise", "sleep", "steps", "heart", "blood", "medical",
            "wellness", "workout", "activity", "calories",
            // Finance management
            "money", "expense", "cost", "budget", "spending", "transaction", "financial",
            "price", "payment", "bank", "account", "dollar", "finance",
        ])
        .with_patterns([
            // Time and weather
            r"what.*time|current.*time|time.*now",
            r"weather|temperature|forecast",
            r"schedule|calendar|appointment",
            r"remind.*me|set.*reminder",
            r"what.*date|today.*date",
            // Contact and entity patterns
            r"\b\w+@\w+\.\w+\b",
            r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b",
            r"works at|employed by|job at|company|organization",
            r"lives in|address|location|located at",
            // Analysis patterns
            r"analyze.*sentiment|sentiment.*analysis",
            r"summarize|summary",
            r"extract.*from|parse.*document",
            r"research.*topic|investigate",
            r"what.*language|detect.*language",
            // Health patterns
            r"health.*data|fitness.*data",
            r"sleep.*pattern|sleep.*quality",
            r"exercise|workout|physical.*activity",
            r"heart.*rate|blood.*pressure",
            r"steps|calories|weight",
            // Finance patterns
            r"\$\d+|\d+.*dollar",
            r"expense|spending|cost",
            r"budget|financial|transaction",
            r"paid|payment|bank|account",
        ])?
        .as_default();

    let shadow = AgentProfile::new("shadow_observer")
        .with_keywords([
            "pattern", "behavior", "preference", "learn", "observe", "track", "monitor",
            "understanding", "insights",
        ])
        .with_patterns([
            r"learn.*about.*me|understand.*me|analyze.*behavior",
            r"what.*pattern|behavioral.*pattern",
            r"preference|how.*i.*usually|my.*habit",
            r"observe|monitor.*behavior|track.*pattern",
            r"insight.*about|understand.*better",
        ])?
        .with_priority_multiplier(0.0);

    Ok(vec![assistant, shadow])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn standard_router() -> Router {
        Router::new(standard_profiles().unwrap()).unwrap()
    }

    #[test]
    fn plain_greeting_falls_back_to_default() {
        let router = standard_router();
        let decision = router.decide("hello there");

        assert_eq!(decision.primary, "personal_assistant");
        assert!(decision.confidence >= 0.0);
        assert!(decision.rationale.contains("no patterns"));
        assert_ne!(decision.primary, "shadow_observer");
        assert!(!decision.collaborators.iter().any(|c| c == "shadow_observer"));
    }

    #[test]
    fn sentiment_request_scores_complex() {
        let router = standard_router();
        let decision = router.decide("analyze the sentiment of this paragraph");

        assert_eq!(decision.primary, "personal_assistant");
        assert_eq!(decision.complexity, Complexity::Complex);
        assert!(decision.collaborators.is_empty());
        assert!(!decision.requires_collaboration);
    }

    #[test]
    fn shadow_observer_never_wins() {
        let router = standard_router();
        // A message stuffed with shadow keywords still routes to the default.
        let decision = router.decide("observe my behavior patterns and learn my preferences");
        assert_eq!(decision.primary, "personal_assistant");
    }

    #[test]
    fn identical_inputs_yield_identical_decisions() {
        let router = standard_router();
        let a = router.decide("what time is my meeting with Sarah tomorrow?");
        let b = router.decide("what time is my meeting with Sarah tomorrow?");
        assert_eq!(a, b);
    }

    #[test]
    fn confidence_is_clamped_to_one() {
        let router = standard_router();
        let decision = router.decide(
            "analyze the sentiment of this document, summarize my health data, \
             track my budget and expenses, and schedule a meeting about my calendar",
        );
        assert!(decision.confidence <= 1.0);
        assert_eq!(decision.complexity, Complexity::Complex);
    }

    #[test]
    fn tie_break_prefers_default_agent() {
        let profiles = vec![
            AgentProfile::new("first").with_keywords(["alpha"]),
            AgentProfile::new("preferred")
                .with_keywords(["alpha"])
                .as_default(),
        ];
        let router = Router::new(profiles).unwrap();
        let decision = router.decide("alpha");
        assert_eq!(decision.primary, "preferred");
    }

    #[test]
    fn tie_break_falls_back_to_declaration_order() {
        let profiles = vec![
            AgentProfile::new("default_one")
                .with_keywords(["zeta"])
                .as_default(),
            AgentProfile::new("first").with_keywords(["alpha"]),
            AgentProfile::new("second").with_keywords(["alpha"]),
        ];
        let router = Router::new(profiles).unwrap();
        let decision = router.decide("alpha");
        assert_eq!(decision.primary, "first");
    }

    #[test]
    fn collaborators_require_close_scores() {
        let profiles = vec![
            AgentProfile::new("strong")
                .with_keywords(["alpha", "beta", "gamma"])
                .as_default(),
            AgentProfile::new("close").with_keywords(["alpha", "beta"]),
            AgentProfile::new("weak").with_keywords(["alpha"]),
        ];
        let router = Router::new(profiles).unwrap();

        // strong = 6, close = 4, weak = 2; threshold = 4.2.
        let decision = router.decide("alpha beta gamma");
        assert_eq!(decision.primary, "strong");
        assert!(decision.collaborators.is_empty());

        // strong = 4, close = 4, weak = 2; tie resolves to the default and
        // `close` qualifies as a collaborator.
        let decision = router.decide("alpha beta");
        assert_eq!(decision.primary, "strong");
        assert_eq!(decision.collaborators, vec!["close".to_string()]);
        assert!(decision.requires_collaboration);
    }

    #[test]
    fn passive_default_is_rejected() {
        let profiles = vec![
            AgentProfile::new("ghost")
                .with_priority_multiplier(0.0)
                .as_default(),
        ];
        assert!(Router::new(profiles).is_err());
    }

    #[test]
    fn empty_router_is_rejected() {
        assert!(Router::new(Vec::new()).is_err());
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let result = AgentProfile::new("broken").with_patterns(["[invalid("]);
        assert!(result.is_err());
    }
}

//! Shared application state for the gateway.
//!
//! [`AppState`] is wrapped in an `Arc` and shared across all request
//! handlers.  It holds every long-lived component: the valve manager, the
//! tool registry, the LLM client, the router, the shadow observer, and the
//! logging surfaces.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use moka::future::Cache;

use mnemon_agent::{AgentDescriptor, CompletionClient};
use mnemon_kernel::{LogBuffer, Router, TurnTracker};
use mnemon_observer::ShadowObserver;
use mnemon_tools::ToolRegistry;
use mnemon_valves::ValveManager;

/// Identity of this gateway instance.
#[derive(Debug, Clone)]
pub struct PipelineInfo {
    /// Stable pipeline id; valve admin routes are keyed on it.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Semantic version.
    pub version: String,
    /// One-line description for the manifest.
    pub description: String,
}

impl Default for PipelineInfo {
    fn default() -> Self {
        Self {
            id: "mnemon_ai".to_owned(),
            name: "Mnemon AI".to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            description: "Personal intelligence gateway with agent routing and \
                          conversation-driven learning"
                .to_owned(),
        }
    }
}

/// Shared state accessible from every handler.
pub struct AppState {
    /// Gateway identity.
    pub pipeline: PipelineInfo,

    /// The configuration store.
    pub valves: Arc<ValveManager>,

    /// The tool registry.
    pub registry: ToolRegistry,

    /// The completion endpoint.
    pub llm: Arc<dyn CompletionClient>,

    /// The deterministic agent router.
    pub router: Arc<Router>,

    /// The shadow observer.
    pub observer: Arc<ShadowObserver>,

    /// Ring-buffered log store.
    pub logs: Arc<LogBuffer>,

    /// Turn state-machine tracker.
    pub tracker: Arc<TurnTracker>,

    /// The agent descriptor table.
    pub descriptors: Vec<AgentDescriptor>,

    /// Response cache, consulted when `enable_caching` is on.
    pub cache: Cache<String, String>,

    /// When this instance started.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Whether `id` names a pipeline this instance serves.
    pub fn owns_pipeline(&self, id: &str) -> bool {
        self.pipeline.id == id
    }
}

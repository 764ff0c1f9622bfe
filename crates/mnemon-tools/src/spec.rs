//! Tool specifications.
//!
//! A [`ToolSpec`] declares everything the registry needs to advertise and
//! dispatch a tool: its name, description, JSON input schema, category, and
//! handlers.  A spec may carry a remote route, a local handler, or both; when
//! both are present the local handler acts as the fallback consulted only
//! when the backend is unavailable.
//!
//! Schemas are immutable after registration.  Argument normalisers are not
//! part of a handler; they are declared on the spec and applied by the
//! registry before validation.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use mnemon_kernel::UserContext;

use crate::error::Result;
use crate::normalize::Normalizer;

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// HTTP method for a remote route, restricted to what the backend surface
/// uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    /// Convert to the reqwest method type.
    pub fn as_method(&self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Put => Method::PUT,
            Self::Delete => Method::DELETE,
        }
    }

    /// Whether this method carries a request body.
    pub fn has_body(&self) -> bool {
        !matches!(self, Self::Get | Self::Delete)
    }
}

/// A remote handler: the backend endpoint the arguments are forwarded to.
#[derive(Debug, Clone)]
pub struct RemoteRoute {
    /// HTTP method.
    pub method: HttpMethod,

    /// Path relative to the backend's `/api/v1` prefix.
    pub endpoint: String,
}

/// Trait for locally executed tool handlers.
///
/// Local handlers parse their own arguments into a typed record (a serde
/// struct) before doing any work; raw JSON never crosses into handler logic.
#[async_trait]
pub trait LocalHandler: Send + Sync {
    /// Execute the tool with validated arguments.
    async fn execute(&self, args: Value, user_ctx: Option<&UserContext>) -> Result<Value>;
}

// ---------------------------------------------------------------------------
// Spec
// ---------------------------------------------------------------------------

/// Full declaration of one tool.
#[derive(Clone)]
pub struct ToolSpec {
    /// Unique tool name.
    pub name: String,

    /// Human-readable description advertised to the LLM.
    pub description: String,

    /// JSON Schema for the tool's arguments.
    pub input_schema: Value,

    /// Grouping category (`memory`, `profile`, `status`, `analysis`, `time`).
    pub category: String,

    /// Remote route, when the tool is served by the backend.
    pub remote: Option<RemoteRoute>,

    /// Local handler: primary for local-only tools, fallback otherwise.
    pub local: Option<Arc<dyn LocalHandler>>,

    /// Declared argument normaliser, applied before validation.
    pub normalizer: Option<Normalizer>,
}

impl ToolSpec {
    /// Create a spec with no handlers.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            category: category.into(),
            remote: None,
            local: None,
            normalizer: None,
        }
    }

    /// Attach a remote route.
    pub fn with_remote(mut self, method: HttpMethod, endpoint: impl Into<String>) -> Self {
        self.remote = Some(RemoteRoute {
            method,
            endpoint: endpoint.into(),
        });
        self
    }

    /// Attach a local handler.
    pub fn with_local(mut self, handler: Arc<dyn LocalHandler>) -> Self {
        self.local = Some(handler);
        self
    }

    /// Declare an argument normaliser for this tool.
    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }
}

impl fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("remote", &self.remote)
            .field("local", &self.local.is_some())
            .field("normalizer", &self.normalizer.is_some())
            .finish()
    }
}

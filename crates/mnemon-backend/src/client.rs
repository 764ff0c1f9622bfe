//! HTTP client for the knowledge backend.
//!
//! [`BackendClient`] wraps a [`reqwest::Client`] with bearer authentication,
//! per-request user-context headers, a configurable timeout, and translation
//! of every failure into the [`BackendError`] taxonomy.  The client performs
//! no retries and no fallbacks; both policies live in callers.
//!
//! Each typed operation maps onto the backend's `/api/v1/` REST surface and
//! returns the raw JSON payload.  Callers that need structure deserialize it
//! themselves.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

use mnemon_kernel::UserContext;

use crate::error::{BackendError, Result};

/// Version prefix for every backend endpoint.
const API_PREFIX: &str = "/api/v1";

/// Default per-operation timeout.  Valve-overridable at construction.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Connection settings for the knowledge backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL of the backend (e.g. `http://localhost:8000`), no trailing
    /// slash.
    pub base_url: String,

    /// Bearer token sent with every request.
    pub api_key: String,

    /// Per-operation timeout.
    pub timeout: Duration,
}

impl BackendConfig {
    /// Create a configuration with the default timeout.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-operation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ---------------------------------------------------------------------------
// Remote execution seam
// ---------------------------------------------------------------------------

/// The seam the tool registry dispatches remote handlers through.
///
/// Production code uses [`BackendClient`]; tests substitute mocks to exercise
/// fallback behaviour without a network.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Issue one request against the backend's versioned surface.
    ///
    /// `path` is relative to `/api/v1` (e.g. `/memory/search`).  `body` is
    /// sent as JSON for methods that carry one.
    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        user_ctx: Option<&UserContext>,
    ) -> Result<Value>;
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Typed client for the knowledge backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    config: Arc<BackendConfig>,
    http: reqwest::Client,
}

impl BackendClient {
    /// Create a client from configuration.
    pub fn new(config: BackendConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Unavailable {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            config: Arc::new(config),
            http,
        })
    }

    /// The configured base URL.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    // -----------------------------------------------------------------------
    // Typed operations
    // -----------------------------------------------------------------------

    /// Semantic search across memory collections.
    pub async fn search_memory(
        &self,
        query: &str,
        limit: usize,
        model_types: Option<&[String]>,
        user_ctx: Option<&UserContext>,
    ) -> Result<Value> {
        let mut payload = json!({ "query": query, "limit": limit });
        if let Some(types) = model_types {
            payload["model_types"] = json!(types);
        }
        self.send(Method::POST, "/memory/search", Some(&payload), user_ctx)
            .await
    }

    /// Create a person entity.
    pub async fn create_person(
        &self,
        person: &Value,
        user_ctx: Option<&UserContext>,
    ) -> Result<Value> {
        self.send(
            Method::POST,
            "/memory/entities/person",
            Some(person),
            user_ctx,
        )
        .await
    }

    /// Attach a fact to memory.
    pub async fn add_fact(&self, fact: &Value, user_ctx: Option<&UserContext>) -> Result<Value> {
        self.send(Method::POST, "/memory/facts", Some(fact), user_ctx)
            .await
    }

    /// Read the user's self profile.
    pub async fn get_profile(&self, user_ctx: Option<&UserContext>) -> Result<Value> {
        self.send(Method::GET, "/profile/self", None, user_ctx).await
    }

    /// Apply partial updates to the self profile.
    pub async fn update_profile(
        &self,
        updates: &Value,
        user_ctx: Option<&UserContext>,
    ) -> Result<Value> {
        self.send(Method::PUT, "/profile/self", Some(updates), user_ctx)
            .await
    }

    /// Read the user's current status.
    pub async fn get_status(&self, user_ctx: Option<&UserContext>) -> Result<Value> {
        self.send(Method::GET, "/status/current", None, user_ctx)
            .await
    }

    /// Apply partial updates to the current status.
    pub async fn update_status(
        &self,
        updates: &Value,
        user_ctx: Option<&UserContext>,
    ) -> Result<Value> {
        self.send(Method::PUT, "/status/current", Some(updates), user_ctx)
            .await
    }

    /// Store a conversation analysis document.
    pub async fn store_analysis(
        &self,
        analysis: &Value,
        user_ctx: Option<&UserContext>,
    ) -> Result<Value> {
        self.send(
            Method::POST,
            "/conversations/analysis",
            Some(analysis),
            user_ctx,
        )
        .await
    }

    /// Search stored conversation analyses.
    pub async fn search_analyses(
        &self,
        query: &str,
        limit: usize,
        user_ctx: Option<&UserContext>,
    ) -> Result<Value> {
        let payload = json!({ "query": query, "limit": limit });
        self.send(
            Method::POST,
            "/conversations/search",
            Some(&payload),
            user_ctx,
        )
        .await
    }

    /// Execute a named backend tool.
    pub async fn execute_tool(
        &self,
        tool: &str,
        arguments: &Value,
        user_ctx: Option<&UserContext>,
    ) -> Result<Value> {
        let payload = json!({ "tool": tool, "arguments": arguments });
        self.send(Method::POST, "/tools/execute", Some(&payload), user_ctx)
            .await
    }

    /// List the tools the backend exposes.
    pub async fn list_tools(&self, user_ctx: Option<&UserContext>) -> Result<Value> {
        self.send(Method::GET, "/tools/list", None, user_ctx).await
    }

    /// Fetch the JSON schema for one backend tool.
    pub async fn tool_schema(&self, tool: &str, user_ctx: Option<&UserContext>) -> Result<Value> {
        let path = format!("/tools/{tool}/schema");
        self.send(Method::GET, &path, None, user_ctx).await
    }

    /// Raw passthrough for endpoints without a typed wrapper.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        user_ctx: Option<&UserContext>,
    ) -> Result<Value> {
        self.send(method, path, body, user_ctx).await
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        user_ctx: Option<&UserContext>,
    ) -> Result<Value> {
        let url = format!("{}{API_PREFIX}{path}", self.config.base_url);

        tracing::debug!(method = %method, url = %url, "backend request");

        let mut request = self
            .http
            .request(method, &url)
            .headers(build_headers(&self.config.api_key, user_ctx));

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| classify_transport(&e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Malformed {
                reason: format!("failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            return Err(classify_status(status, path, &text));
        }

        serde_json::from_str(&text).map_err(|e| BackendError::Malformed {
            reason: format!("invalid JSON body: {e}"),
        })
    }
}

#[async_trait]
impl RemoteExecutor for BackendClient {
    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        user_ctx: Option<&UserContext>,
    ) -> Result<Value> {
        self.send(method, path, body, user_ctx).await
    }
}

// ---------------------------------------------------------------------------
// Header construction
// ---------------------------------------------------------------------------

/// Build the header block for one request: bearer token plus the `X-User-*`
/// identity set.  An absent context sends the anonymous markers; the call is
/// never aborted for lack of identity.
pub fn build_headers(api_key: &str, user_ctx: Option<&UserContext>) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
        headers.insert(AUTHORIZATION, value);
    }

    let anonymous = UserContext::anonymous();
    let ctx = user_ctx.unwrap_or(&anonymous);

    insert_header(&mut headers, "x-user-id", &ctx.id);
    insert_header(&mut headers, "x-user-name", &ctx.display_name);
    if let Some(ref email) = ctx.email {
        insert_header(&mut headers, "x-user-email", email);
    }
    insert_header(&mut headers, "x-user-role", &ctx.role);
    insert_header(
        &mut headers,
        "x-user-authenticated",
        if ctx.authenticated { "true" } else { "false" },
    );

    headers
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    } else {
        tracing::warn!(header = name, "dropping non-ASCII header value");
    }
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

fn classify_transport(err: &reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Unavailable {
            reason: "request timed out".to_owned(),
        }
    } else if err.is_connect() {
        BackendError::Unavailable {
            reason: format!("connection failed: {err}"),
        }
    } else {
        BackendError::Unavailable {
            reason: err.to_string(),
        }
    }
}

/// Map a non-success HTTP status to the error taxonomy.
fn classify_status(status: StatusCode, path: &str, body: &str) -> BackendError {
    match status {
        StatusCode::NOT_FOUND => BackendError::NotFound {
            resource: path.to_owned(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Unauthorized {
            status: status.as_u16(),
        },
        s if s.is_client_error() => BackendError::Validation {
            field_errors: parse_field_errors(body),
        },
        s if s.is_server_error() => BackendError::Unavailable {
            reason: format!("HTTP {s}: {}", truncate(body, 200)),
        },
        s => BackendError::Malformed {
            reason: format!("unexpected HTTP {s}"),
        },
    }
}

/// Pull field-level errors out of a 4xx body.  The backend uses FastAPI-style
/// `{"detail": [{"loc": [...], "msg": "..."}]}` payloads; plain string
/// details and unknown shapes collapse into a single `_` entry.
fn parse_field_errors(body: &str) -> BTreeMap<String, String> {
    let mut errors = BTreeMap::new();

    let Ok(value) = serde_json::from_str::<Value>(body) else {
        errors.insert("_".to_owned(), truncate(body, 200));
        return errors;
    };

    match value.get("detail") {
        Some(Value::Array(items)) => {
            for item in items {
                let field = item
                    .get("loc")
                    .and_then(Value::as_array)
                    .and_then(|loc| loc.last())
                    .and_then(Value::as_str)
                    .unwrap_or("_")
                    .to_owned();
                let msg = item
                    .get("msg")
                    .and_then(Value::as_str)
                    .unwrap_or("invalid")
                    .to_owned();
                errors.insert(field, msg);
            }
        }
        Some(Value::String(detail)) => {
            errors.insert("_".to_owned(), detail.clone());
        }
        _ => {
            errors.insert("_".to_owned(), truncate(body, 200));
        }
    }

    errors
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_owned()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_carry_full_identity() {
        let ctx = UserContext::new("u-42", "Ada Lovelace", "admin", true)
            .with_email("ada@example.com");
        let headers = build_headers("secret", Some(&ctx));

        assert_eq!(headers["authorization"], "Bearer secret");
        assert_eq!(headers["x-user-id"], "u-42");
        assert_eq!(headers["x-user-name"], "Ada Lovelace");
        assert_eq!(headers["x-user-email"], "ada@example.com");
        assert_eq!(headers["x-user-role"], "admin");
        assert_eq!(headers["x-user-authenticated"], "true");
    }

    #[test]
    fn absent_context_sends_anonymous_markers() {
        let headers = build_headers("secret", None);

        assert_eq!(headers["x-user-id"], "anonymous");
        assert_eq!(headers["x-user-authenticated"], "false");
        assert!(!headers.contains_key("x-user-email"));
    }

    #[test]
    fn status_classification_matches_taxonomy() {
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, "/profile/self", ""),
            BackendError::NotFound { .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "/x", ""),
            BackendError::Unauthorized { status: 401 }
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, "/x", ""),
            BackendError::Unauthorized { status: 403 }
        ));
        assert!(matches!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, "/x", "{}"),
            BackendError::Validation { .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "/x", ""),
            BackendError::Unavailable { .. }
        ));
    }

    #[test]
    fn fastapi_detail_arrays_become_field_errors() {
        let body = r#"{"detail": [
            {"loc": ["body", "title"], "msg": "field required"},
            {"loc": ["body", "mood"], "msg": "value is not a valid dict"}
        ]}"#;
        let errors = parse_field_errors(body);
        assert_eq!(errors.get("title").map(String::as_str), Some("field required"));
        assert_eq!(
            errors.get("mood").map(String::as_str),
            Some("value is not a valid dict")
        );
    }

    #[test]
    fn string_detail_collapses_to_catch_all() {
        let errors = parse_field_errors(r#"{"detail": "Pipeline not found"}"#);
        assert_eq!(errors.get("_").map(String::as_str), Some("Pipeline not found"));
    }

    #[test]
    fn non_json_body_collapses_to_catch_all() {
        let errors = parse_field_errors("<html>bad gateway</html>");
        assert!(errors.contains_key("_"));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = BackendConfig::new("http://localhost:8000/", "k");
        assert_eq!(config.base_url, "http://localhost:8000");
    }
}

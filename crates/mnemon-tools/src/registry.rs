//! The tool registry.
//!
//! Maps tool names to their specs and dispatches invocations.  The dispatch
//! contract, in order:
//!
//! 1. unknown names are rejected with `NotFound`;
//! 2. the declared normaliser (if any) is applied to the arguments;
//! 3. arguments are validated against the tool's compiled JSON schema;
//! 4. remote tools dispatch through the backend client;
//! 5. on `Unavailable`, a registered local handler answers instead and the
//!    invocation is annotated `source = local-fallback`.
//!
//! The registry is populated at startup from the static builtin table and is
//! effectively read-only afterwards; the [`DashMap`] backing keeps later
//! registration safe regardless.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use jsonschema::JSONSchema;
use serde_json::Value;

use mnemon_backend::{BackendError, RemoteExecutor};
use mnemon_kernel::{
    InvocationErrorKind, InvocationOutcome, InvocationSource, ToolInvocation, UserContext,
};

use crate::error::{Result, ToolError};
use crate::spec::ToolSpec;

// ---------------------------------------------------------------------------
// Registered entry
// ---------------------------------------------------------------------------

struct RegisteredTool {
    spec: ToolSpec,
    schema: Arc<JSONSchema>,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Concurrent tool registry.
///
/// Cheaply cloneable (`Arc`-backed) and `Send + Sync`.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<DashMap<String, Arc<RegisteredTool>>>,
    executor: Arc<dyn RemoteExecutor>,
}

impl ToolRegistry {
    /// Create an empty registry dispatching remote tools through `executor`.
    pub fn new(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            tools: Arc::new(DashMap::new()),
            executor,
        }
    }

    /// Register a tool spec.
    ///
    /// Idempotent by name: a second registration under the same name replaces
    /// the first.  Returns an error only when the input schema fails to
    /// compile.
    pub fn register(&self, spec: ToolSpec) -> Result<()> {
        let schema =
            JSONSchema::compile(&spec.input_schema).map_err(|e| ToolError::SchemaCompile {
                name: spec.name.clone(),
                reason: e.to_string(),
            })?;

        let replaced = self
            .tools
            .insert(
                spec.name.clone(),
                Arc::new(RegisteredTool {
                    spec: spec.clone(),
                    schema: Arc::new(schema),
                }),
            )
            .is_some();

        tracing::info!(
            tool = %spec.name,
            category = %spec.category,
            replaced,
            "tool registered"
        );

        Ok(())
    }

    /// Look up a tool spec by name.
    pub fn get(&self, name: &str) -> Option<ToolSpec> {
        self.tools.get(name).map(|entry| entry.spec.clone())
    }

    /// List registered specs, optionally restricted to one category.
    pub fn list(&self, category: Option<&str>) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .iter()
            .filter(|entry| category.is_none_or(|c| entry.spec.category == c))
            .map(|entry| entry.spec.clone())
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// All registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.iter().map(|e| e.spec.name.clone()).collect();
        names.sort();
        names
    }

    /// Specs for an agent's allowlist, in allowlist order, skipping unknown
    /// names.
    pub fn specs_for<'a, I>(&self, allowlist: I) -> Vec<ToolSpec>
    where
        I: IntoIterator<Item = &'a str>,
    {
        allowlist
            .into_iter()
            .filter_map(|name| self.get(name))
            .collect()
    }

    /// Invoke a tool and return the completed [`ToolInvocation`].
    ///
    /// `call_id` is the LLM-assigned correlation id.  Never panics and never
    /// returns early: every failure mode is folded into the invocation
    /// outcome.
    pub async fn invoke(
        &self,
        call_id: &str,
        name: &str,
        mut args: Value,
        user_ctx: Option<&UserContext>,
    ) -> ToolInvocation {
        let started = Instant::now();

        let Some(tool) = self.tools.get(name).map(|e| Arc::clone(&e)) else {
            tracing::warn!(tool = %name, "invocation of unknown tool rejected");
            return ToolInvocation {
                call_id: call_id.to_owned(),
                tool_name: name.to_owned(),
                arguments: args,
                outcome: InvocationOutcome::Err {
                    kind: InvocationErrorKind::NotFound,
                    message: format!("tool `{name}` is not registered"),
                },
                latency: started.elapsed(),
                source: InvocationSource::Remote,
            };
        };

        // Declared normalisation happens before validation, never after.
        if let Some(ref normalizer) = tool.spec.normalizer {
            normalizer.apply(&mut args);
        }

        if let Err(errors) = validate_args(&tool.schema, &args) {
            tracing::warn!(
                tool = %name,
                errors = errors.len(),
                "tool arguments failed schema validation"
            );
            return ToolInvocation {
                call_id: call_id.to_owned(),
                tool_name: name.to_owned(),
                arguments: args,
                outcome: InvocationOutcome::Err {
                    kind: InvocationErrorKind::Validation,
                    message: errors.join("; "),
                },
                latency: started.elapsed(),
                source: InvocationSource::Remote,
            };
        }

        let (outcome, source) = self.dispatch(&tool.spec, &args, user_ctx).await;

        let invocation = ToolInvocation {
            call_id: call_id.to_owned(),
            tool_name: name.to_owned(),
            arguments: args,
            outcome,
            latency: started.elapsed(),
            source,
        };

        tracing::debug!(
            tool = %name,
            ok = invocation.outcome.is_ok(),
            source = ?invocation.source,
            latency_ms = invocation.latency.as_millis() as u64,
            "tool invocation finished"
        );

        invocation
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    async fn dispatch(
        &self,
        spec: &ToolSpec,
        args: &Value,
        user_ctx: Option<&UserContext>,
    ) -> (InvocationOutcome, InvocationSource) {
        if let Some(ref route) = spec.remote {
            let body = route.method.has_body().then_some(args);
            match self
                .executor
                .call(route.method.as_method(), &route.endpoint, body, user_ctx)
                .await
            {
                Ok(value) => {
                    return (InvocationOutcome::Ok { value }, InvocationSource::Remote);
                }
                Err(err) if err.is_unavailable() && spec.local.is_some() => {
                    tracing::warn!(
                        tool = %spec.name,
                        error = %err,
                        "backend unavailable; dispatching local fallback"
                    );
                    // Fall through to the local handler below.
                }
                Err(err) => {
                    return (
                        InvocationOutcome::Err {
                            kind: error_kind(&err),
                            message: err.to_string(),
                        },
                        InvocationSource::Remote,
                    );
                }
            }
        }

        // Local dispatch: fallback after an outage, or the primary path for
        // local-only tools.
        match spec.local {
            Some(ref handler) => match handler.execute(args.clone(), user_ctx).await {
                Ok(value) => (
                    InvocationOutcome::Ok { value },
                    InvocationSource::LocalFallback,
                ),
                Err(err) => (
                    InvocationOutcome::Err {
                        kind: InvocationErrorKind::Internal,
                        message: err.to_string(),
                    },
                    InvocationSource::LocalFallback,
                ),
            },
            None => (
                InvocationOutcome::Err {
                    kind: InvocationErrorKind::Internal,
                    message: format!("tool `{}` has no handler", spec.name),
                },
                InvocationSource::Remote,
            ),
        }
    }
}

/// Run schema validation, collecting per-field error strings.
fn validate_args(schema: &JSONSchema, args: &Value) -> std::result::Result<(), Vec<String>> {
    let result = schema.validate(args);
    match result {
        Ok(()) => Ok(()),
        Err(errors) => Err(errors
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{path}: {e}")
                }
            })
            .collect()),
    }
}

/// Map backend failures onto invocation error kinds.
fn error_kind(err: &BackendError) -> InvocationErrorKind {
    match err {
        BackendError::NotFound { .. } => InvocationErrorKind::NotFound,
        BackendError::Unauthorized { .. } => InvocationErrorKind::Unauthorized,
        BackendError::Validation { .. } => InvocationErrorKind::Validation,
        BackendError::Unavailable { .. } => InvocationErrorKind::Unavailable,
        BackendError::Malformed { .. } => InvocationErrorKind::Malformed,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Normalizer;
    use crate::spec::{HttpMethod, LocalHandler};
    use async_trait::async_trait;
    use reqwest::Method;
    use serde_json::json;

    /// Executor that always succeeds, echoing the call.
    struct EchoExecutor;

    #[async_trait]
    impl RemoteExecutor for EchoExecutor {
        async fn call(
            &self,
            method: Method,
            path: &str,
            body: Option<&Value>,
            _user_ctx: Option<&UserContext>,
        ) -> mnemon_backend::Result<Value> {
            Ok(json!({
                "method": method.as_str(),
                "path": path,
                "body": body.cloned().unwrap_or(Value::Null),
            }))
        }
    }

    /// Executor that always reports the backend as unreachable.
    struct DownExecutor;

    #[async_trait]
    impl RemoteExecutor for DownExecutor {
        async fn call(
            &self,
            _method: Method,
            _path: &str,
            _body: Option<&Value>,
            _user_ctx: Option<&UserContext>,
        ) -> mnemon_backend::Result<Value> {
            Err(BackendError::Unavailable {
                reason: "connection refused".into(),
            })
        }
    }

    /// Executor that rejects credentials.
    struct UnauthorizedExecutor;

    #[async_trait]
    impl RemoteExecutor for UnauthorizedExecutor {
        async fn call(
            &self,
            _method: Method,
            _path: &str,
            _body: Option<&Value>,
            _user_ctx: Option<&UserContext>,
        ) -> mnemon_backend::Result<Value> {
            Err(BackendError::Unauthorized { status: 401 })
        }
    }

    /// Local clock handler returning a fixed instant.
    struct FixedClock;

    #[async_trait]
    impl LocalHandler for FixedClock {
        async fn execute(
            &self,
            args: Value,
            _user_ctx: Option<&UserContext>,
        ) -> crate::error::Result<Value> {
            let timezone = args
                .get("timezone")
                .and_then(Value::as_str)
                .unwrap_or("UTC")
                .to_owned();
            Ok(json!({
                "current_time": "2025-06-01T12:00:00Z",
                "timezone": timezone,
            }))
        }
    }

    fn time_spec() -> ToolSpec {
        ToolSpec::new(
            "get_current_time",
            "Current time in a timezone",
            "time",
            json!({
                "type": "object",
                "properties": {
                    "timezone": {"type": "string"}
                }
            }),
        )
        .with_remote(HttpMethod::Post, "/tools/time/current")
        .with_local(Arc::new(FixedClock))
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let registry = ToolRegistry::new(Arc::new(EchoExecutor));
        let invocation = registry.invoke("c1", "nonexistent", json!({}), None).await;

        match invocation.outcome {
            InvocationOutcome::Err { kind, .. } => {
                assert_eq!(kind, InvocationErrorKind::NotFound);
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_arguments_are_rejected_with_field_errors() {
        let registry = ToolRegistry::new(Arc::new(EchoExecutor));
        registry
            .register(
                ToolSpec::new(
                    "search_memory",
                    "Search",
                    "memory",
                    json!({
                        "type": "object",
                        "properties": {
                            "query": {"type": "string"},
                            "limit": {"type": "integer", "minimum": 1}
                        },
                        "required": ["query"]
                    }),
                )
                .with_remote(HttpMethod::Post, "/memory/search"),
            )
            .unwrap();

        let invocation = registry
            .invoke("c1", "search_memory", json!({"limit": 0}), None)
            .await;

        match invocation.outcome {
            InvocationOutcome::Err { kind, message } => {
                assert_eq!(kind, InvocationErrorKind::Validation);
                assert!(message.contains("query") || message.contains("limit"));
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn remote_dispatch_succeeds() {
        let registry = ToolRegistry::new(Arc::new(EchoExecutor));
        registry.register(time_spec()).unwrap();

        let invocation = registry
            .invoke("c1", "get_current_time", json!({"timezone": "UTC"}), None)
            .await;

        assert!(invocation.outcome.is_ok());
        assert_eq!(invocation.source, InvocationSource::Remote);
    }

    #[tokio::test]
    async fn unavailable_backend_falls_back_locally() {
        let registry = ToolRegistry::new(Arc::new(DownExecutor));
        registry.register(time_spec()).unwrap();

        let invocation = registry
            .invoke(
                "c1",
                "get_current_time",
                json!({"timezone": "America/New_York"}),
                None,
            )
            .await;

        match invocation.outcome {
            InvocationOutcome::Ok { value } => {
                assert_eq!(value["timezone"], "America/New_York");
            }
            other => panic!("expected Ok, got {other:?}"),
        }
        assert_eq!(invocation.source, InvocationSource::LocalFallback);
    }

    #[tokio::test]
    async fn unavailable_without_fallback_surfaces_error() {
        let registry = ToolRegistry::new(Arc::new(DownExecutor));
        registry
            .register(
                ToolSpec::new(
                    "search_memory",
                    "Search",
                    "memory",
                    json!({"type": "object"}),
                )
                .with_remote(HttpMethod::Post, "/memory/search"),
            )
            .unwrap();

        let invocation = registry.invoke("c1", "search_memory", json!({}), None).await;

        match invocation.outcome {
            InvocationOutcome::Err { kind, .. } => {
                assert_eq!(kind, InvocationErrorKind::Unavailable);
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
        assert_eq!(invocation.source, InvocationSource::Remote);
    }

    #[tokio::test]
    async fn non_unavailable_errors_do_not_fall_back() {
        let registry = ToolRegistry::new(Arc::new(UnauthorizedExecutor));
        registry.register(time_spec()).unwrap();

        let invocation = registry
            .invoke("c1", "get_current_time", json!({}), None)
            .await;

        match invocation.outcome {
            InvocationOutcome::Err { kind, .. } => {
                assert_eq!(kind, InvocationErrorKind::Unauthorized);
            }
            other => panic!("expected Unauthorized, got {other:?}"),
        }
        assert_eq!(invocation.source, InvocationSource::Remote);
    }

    #[tokio::test]
    async fn registration_is_idempotent_last_write_wins() {
        let registry = ToolRegistry::new(Arc::new(EchoExecutor));
        registry.register(time_spec()).unwrap();
        registry
            .register(ToolSpec::new(
                "get_current_time",
                "Replacement",
                "time",
                json!({"type": "object"}),
            ))
            .unwrap();

        assert_eq!(registry.names().len(), 1);
        assert_eq!(registry.get("get_current_time").unwrap().description, "Replacement");
    }

    #[tokio::test]
    async fn normalizer_runs_before_validation() {
        let registry = ToolRegistry::new(Arc::new(EchoExecutor));
        registry
            .register(
                ToolSpec::new(
                    "extract_conversation_entities",
                    "Extract entities",
                    "analysis",
                    json!({
                        "type": "object",
                        "properties": {
                            "conversation_text": {"type": "string", "minLength": 1}
                        },
                        "required": ["conversation_text"]
                    }),
                )
                .with_remote(HttpMethod::Post, "/conversations/entities")
                .with_normalizer(Normalizer::strip_prose_wrapper(["conversation_text"])),
            )
            .unwrap();

        let invocation = registry
            .invoke(
                "c1",
                "extract_conversation_entities",
                json!({"conversation_text": "User message: 'I met Sarah'"}),
                None,
            )
            .await;

        assert!(invocation.outcome.is_ok());
        // The stored arguments reflect the normalised form.
        assert_eq!(invocation.arguments["conversation_text"], "I met Sarah");
    }

    #[tokio::test]
    async fn list_filters_by_category() {
        let registry = ToolRegistry::new(Arc::new(EchoExecutor));
        registry.register(time_spec()).unwrap();
        registry
            .register(
                ToolSpec::new("search_memory", "Search", "memory", json!({"type": "object"}))
                    .with_remote(HttpMethod::Post, "/memory/search"),
            )
            .unwrap();

        assert_eq!(registry.list(None).len(), 2);
        assert_eq!(registry.list(Some("memory")).len(), 1);
        assert_eq!(registry.list(Some("time"))[0].name, "get_current_time");
    }
}

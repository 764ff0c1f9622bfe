//! Gateway server setup and startup.
//!
//! [`GatewayServer`] composes the Axum router, registers all routes, and
//! starts the HTTP listener.  On bind failure the server fails fast unless
//! port reclaim has been explicitly enabled (valve or startup flag), in which
//! case it attempts to terminate the previous holder of the port and retries
//! a bounded number of times.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::admin;
use crate::api;
use crate::error::{Result, WebError};
use crate::state::AppState;

/// Bind attempts before giving up, including the first.
const MAX_BIND_ATTEMPTS: u32 = 3;

/// Bind configuration.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Interface to bind.
    pub bind_addr: String,
    /// TCP port.
    pub port: u16,
    /// `--reclaim-port` startup flag; OR'd with the
    /// `reclaim_port_on_bind_failure` valve.
    pub reclaim_port: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_owned(),
            port: 9099,
            reclaim_port: false,
        }
    }
}

/// The Mnemon gateway server.
pub struct GatewayServer {
    config: WebConfig,
    state: Arc<AppState>,
}

impl GatewayServer {
    /// Create a server over shared state.
    pub fn new(config: WebConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Return the `host:port` string this server will bind to.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.bind_addr, self.config.port)
    }

    /// Start the server and block until it is shut down.
    pub async fn start(self) -> Result<()> {
        let addr = self.addr();
        let reclaim = self.config.reclaim_port
            || self.state.valves.get_bool("reclaim_port_on_bind_failure");
        let router = build_router(Arc::clone(&self.state));

        let mut last_error = String::new();
        for attempt in 1..=MAX_BIND_ATTEMPTS {
            match tokio::net::TcpListener::bind(&addr).await {
                Ok(listener) => {
                    tracing::info!(addr = %addr, attempt, "gateway listening");
                    axum::serve(listener, router.clone()).await?;
                    return Ok(());
                }
                Err(e) => {
                    last_error = e.to_string();
                    if reclaim && attempt < MAX_BIND_ATTEMPTS {
                        tracing::warn!(
                            addr = %addr,
                            attempt,
                            error = %e,
                            "bind failed; attempting to reclaim port"
                        );
                        reclaim_port(self.config.port).await;
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    } else {
                        break;
                    }
                }
            }
        }

        Err(WebError::Bind {
            addr,
            reason: last_error,
        })
    }
}

/// Build the Axum router with all routes registered.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin("*".parse::<HeaderValue>().expect("static origin"))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any);

    Router::new()
        // Manifest and liveness.
        .route("/", get(api::manifest))
        .route("/health", get(api::health))
        // Model listing.
        .route("/models", get(api::models))
        .route("/v1/models", get(api::models))
        // Chat completions (plus the unversioned alias).
        .route("/v1/chat/completions", post(api::chat_completions))
        .route("/chat/completions", post(api::chat_completions))
        // Valve admin.
        .route("/{pipeline_id}/valves/spec", get(admin::valves_spec))
        .route(
            "/{pipeline_id}/valves",
            get(admin::valves_current).post(admin::valves_update),
        )
        .route("/{pipeline_id}/valves/reset", post(admin::valves_reset))
        // Logs and diagnostics.
        .route("/{pipeline_id}/logs", get(admin::logs))
        .route("/{pipeline_id}/status", get(admin::status))
        .route("/{pipeline_id}/diagnostics", get(admin::diagnostics))
        .layer(cors)
        .with_state(state)
}

/// Best-effort termination of whatever currently holds `port`.
///
/// Only runs when reclaim is explicitly enabled.  Unix-only; elsewhere it
/// logs and does nothing.
#[cfg(unix)]
async fn reclaim_port(port: u16) {
    let output = tokio::process::Command::new("lsof")
        .args(["-ti", &format!(":{port}")])
        .output()
        .await;

    let Ok(output) = output else {
        tracing::warn!(port, "lsof unavailable; cannot reclaim port");
        return;
    };

    let pids = String::from_utf8_lossy(&output.stdout);
    for pid in pids.split_whitespace() {
        tracing::warn!(port, pid = %pid, "terminating previous listener");
        let _ = tokio::process::Command::new("kill")
            .args(["-TERM", pid])
            .status()
            .await;
    }
}

#[cfg(not(unix))]
async fn reclaim_port(port: u16) {
    tracing::warn!(port, "port reclaim is not supported on this platform");
}

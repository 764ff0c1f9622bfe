//! Environment handling, tracing setup, and application wiring.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use mnemon_agent::{standard_descriptors, LlmClient, LlmClientConfig};
use mnemon_backend::{BackendClient, BackendConfig, RemoteExecutor};
use mnemon_kernel::router::standard_profiles;
use mnemon_kernel::{BufferLayer, LogBuffer, Router, TurnTracker};
use mnemon_observer::{ObservationSink, ShadowObserver};
use mnemon_tools::ToolRegistry;
use mnemon_valves::ValveManager;
use mnemon_web::{AppState, PipelineInfo};

/// The well-known environment block.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub backend_url: Option<String>,
    pub backend_api_key: String,
    pub llm_url: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub port: u16,
    pub pipeline_id: String,
}

impl EnvConfig {
    /// Read the environment, applying defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            backend_url: env_non_empty("MNEMON_BACKEND_URL"),
            backend_api_key: env_non_empty("MNEMON_BACKEND_API_KEY")
                .unwrap_or_else(|| "development-key".to_owned()),
            llm_url: env_non_empty("MNEMON_LLM_URL")
                .unwrap_or_else(|| "http://localhost:11434/v1".to_owned()),
            llm_api_key: env_non_empty("MNEMON_LLM_API_KEY").unwrap_or_default(),
            llm_model: env_non_empty("MNEMON_LLM_MODEL").unwrap_or_else(|| "llama3.2".to_owned()),
            port: env_non_empty("MNEMON_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(9099),
            pipeline_id: env_non_empty("MNEMON_PIPELINE_ID")
                .unwrap_or_else(|| "mnemon_ai".to_owned()),
        }
    }
}

/// Read an environment variable, treating empty values as unset.
pub fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Install the tracing stack: env-filtered stdout formatting, an optional
/// append-mode file writer (the `log_file_path` valve), and the ring buffer
/// tee.  The initial level comes from `RUST_LOG`, falling back to the
/// `log_level` valve.
pub fn init_tracing(buffer: Arc<LogBuffer>, valve_level: &str, log_file: Option<std::fs::File>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(valve_level.to_lowercase()));

    let file_layer = log_file.map(|file| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(Arc::new(file))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .with(BufferLayer::new(buffer))
        .init();
}

/// Open the configured log file for appending.  A missing or unwritable path
/// is reported on stderr and skipped; it never blocks startup.
pub fn open_log_file(path: &str) -> Option<std::fs::File> {
    if path.trim().is_empty() {
        return None;
    }
    match std::fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("warning: cannot open log file {path}: {e}");
            None
        }
    }
}

/// Build the full application state from environment and valves.
pub fn build_state(env: &EnvConfig, logs: Arc<LogBuffer>) -> Result<Arc<AppState>> {
    let valves = Arc::new(
        ValveManager::with_store_path(
            env.pipeline_id.clone(),
            PathBuf::from(format!("{}_valves.json", env.pipeline_id)),
        )
        .context("failed to initialize valve manager")?,
    );

    // Explicit environment wins over the persisted valve for the backend URL.
    let backend_url = env
        .backend_url
        .clone()
        .unwrap_or_else(|| valves.get_str("backend_api_url", "http://localhost:8000"));
    let backend_timeout = Duration::from_secs(valves.get_i64("tool_timeout_secs", 30).max(1) as u64);

    let backend = Arc::new(
        BackendClient::new(
            BackendConfig::new(backend_url, env.backend_api_key.clone())
                .with_timeout(backend_timeout),
        )
        .context("failed to build backend client")?,
    );

    let registry = ToolRegistry::new(Arc::clone(&backend) as Arc<dyn RemoteExecutor>);
    mnemon_tools::builtin::install(&registry).context("failed to install builtin tools")?;

    let llm = Arc::new(
        LlmClient::new(LlmClientConfig::new(
            env.llm_url.clone(),
            env.llm_api_key.clone(),
            env.llm_model.clone(),
        ))
        .context("failed to build llm client")?,
    );

    let router = Arc::new(
        Router::new(standard_profiles().context("failed to compile routing profiles")?)
            .context("failed to build router")?,
    );

    let tracker = Arc::new(TurnTracker::default());
    let observer = Arc::new(ShadowObserver::new(
        Arc::clone(&backend) as Arc<dyn ObservationSink>,
        valves.get_i64("max_concurrent_observers", 3).max(1) as usize,
        Arc::clone(&tracker),
    ));

    let pipeline = PipelineInfo {
        id: env.pipeline_id.clone(),
        ..PipelineInfo::default()
    };

    Ok(Arc::new(AppState {
        pipeline,
        valves,
        registry,
        llm,
        router,
        observer,
        logs,
        tracker,
        descriptors: standard_descriptors(),
        cache: moka::future::Cache::builder()
            .max_capacity(512)
            .time_to_live(Duration::from_secs(300))
            .build(),
        started_at: chrono::Utc::now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_defaults_apply() {
        // Scoped to names unlikely to exist in the test environment.
        let env = EnvConfig::from_env();
        assert!(!env.pipeline_id.is_empty());
        assert!(env.port > 0);
        assert!(!env.llm_model.is_empty());
    }
}

//! CLI entry point for the Mnemon gateway.
//!
//! `mnemon serve` starts the HTTP gateway; `mnemon test` (or `--test`)
//! validates wiring and exits non-zero on failure.  Exit codes: 0 for a
//! clean shutdown or passing self-test, 1 for a failing self-test or an
//! unrecoverable startup error.

mod bootstrap;
mod cli;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use mnemon_kernel::LogBuffer;
use mnemon_web::{GatewayServer, WebConfig};

use crate::bootstrap::{build_state, init_tracing, EnvConfig};
use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    // Load .env if present (silently ignore if missing).
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let env = EnvConfig::from_env();

    let result = match cli.command {
        Some(Commands::Test) => cmd_test(&env).await,
        None if cli.test => cmd_test(&env).await,
        Some(Commands::Serve {
            bind,
            port,
            reclaim_port,
        }) => cmd_serve(&env, bind, port, reclaim_port).await,
        None => cmd_serve(&env, None, None, false).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Subcommand: serve
// ---------------------------------------------------------------------------

async fn cmd_serve(
    env: &EnvConfig,
    bind: Option<String>,
    port: Option<u16>,
    reclaim_port: bool,
) -> Result<()> {
    let logs = Arc::new(LogBuffer::default());

    // The log_level valve is read after state construction; bootstrap with
    // the environment default and let RUST_LOG override.
    let state = {
        // Valve manager must exist before the subscriber so the persisted
        // log level and file path can seed the stack.
        let state = build_state(env, Arc::clone(&logs))?;
        let level = state.valves.get_str("log_level", "INFO");
        let log_file =
            bootstrap::open_log_file(&state.valves.get_str("log_file_path", ""));
        init_tracing(logs, &level, log_file);
        state
    };

    info!(
        pipeline_id = %state.pipeline.id,
        version = %state.pipeline.version,
        agents = state.descriptors.len(),
        tools = state.registry.names().len(),
        valves = state.valves.current().len(),
        "gateway starting"
    );

    let config = WebConfig {
        bind_addr: bind.unwrap_or_else(|| "0.0.0.0".to_owned()),
        port: port.unwrap_or(env.port),
        reclaim_port,
    };

    let server = GatewayServer::new(config, state);
    info!(addr = %server.addr(), "listening");
    server.start().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: test
// ---------------------------------------------------------------------------

/// Validate wiring without binding a port: valves load, tools register,
/// routing profiles compile, and both agents resolve.
async fn cmd_test(env: &EnvConfig) -> Result<()> {
    let logs = Arc::new(LogBuffer::default());
    let state = build_state(env, logs)?;

    let tools = state.registry.names();
    anyhow::ensure!(!tools.is_empty(), "no tools registered");

    let decision = state.router.decide("hello there");
    anyhow::ensure!(
        decision.primary == "personal_assistant",
        "router default resolution failed: {}",
        decision.primary
    );

    anyhow::ensure!(
        state.descriptors.len() >= 2,
        "agent descriptor table incomplete"
    );

    println!("mnemon self-test passed");
    println!("  pipeline: {} v{}", state.pipeline.id, state.pipeline.version);
    println!("  agents:   {}", state.descriptors.len());
    println!("  tools:    {}", tools.len());
    println!("  valves:   {}", state.valves.current().len());
    Ok(())
}

//! The default valve catalogue.
//!
//! Every knob the gateway exposes is declared here, grouped into the seven
//! standard categories.  Components read values through the manager's typed
//! accessors; nothing else in the workspace hard-codes a tunable.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::spec::{ValveCategory, ValveSpec, ValveType};

/// The standard category set, in display order.
pub fn categories() -> Vec<ValveCategory> {
    vec![
        ValveCategory::new("core", "Core Features", "Essential gateway functionality", Some("⚙️"), 1),
        ValveCategory::new("agents", "Agent Configuration", "Agent behavior and routing", Some("🤖"), 2),
        ValveCategory::new("tools", "Tool Execution", "Tool and integration settings", Some("🛠️"), 3),
        ValveCategory::new("memory", "Memory & Storage", "Memory and data management", Some("🧠"), 4),
        ValveCategory::new("performance", "Performance", "Performance and optimization", Some("⚡"), 5),
        ValveCategory::new("debug", "Debug & Logging", "Debugging and logging options", Some("🐛"), 6),
        ValveCategory::new("advanced", "Advanced", "Advanced configuration options", Some("🔬"), 7),
    ]
}

/// The default valve set.
pub fn valves() -> Vec<ValveSpec> {
    vec![
        // -- core -----------------------------------------------------------
        ValveSpec::new(
            "enable_intelligent_routing",
            ValveType::Bool,
            json!(true),
            "Enable Intelligent Routing",
            "Automatically select the best agent for each request",
            "core",
        ),
        ValveSpec::new(
            "enable_shadow_observer",
            ValveType::Bool,
            json!(true),
            "Enable Shadow Observer",
            "Mine completed turns for durable facts in the background",
            "core",
        ),
        // -- agents ---------------------------------------------------------
        ValveSpec::new(
            "default_agent",
            ValveType::Enum,
            json!("auto"),
            "Default Agent",
            "Agent used when routing is disabled or fails",
            "agents",
        )
        .with_options(["auto", "personal_assistant"]),
        ValveSpec::new(
            "routing_confidence_threshold",
            ValveType::Float,
            json!(0.7),
            "Routing Confidence Threshold",
            "Minimum confidence required for automatic agent selection",
            "agents",
        )
        .with_range(0.0, 1.0)
        .advanced(),
        ValveSpec::new(
            "max_agent_iterations",
            ValveType::Int,
            json!(25),
            "Max Agent Iterations",
            "Maximum LLM iterations per agent execution",
            "agents",
        )
        .with_range(1.0, 100.0)
        .advanced(),
        ValveSpec::new(
            "agent_wall_time_secs",
            ValveType::Int,
            json!(120),
            "Agent Wall Time (Seconds)",
            "Hard deadline for one agent execution",
            "agents",
        )
        .with_range(5.0, 600.0)
        .advanced(),
        // -- tools ----------------------------------------------------------
        ValveSpec::new(
            "enable_tool_execution",
            ValveType::Bool,
            json!(true),
            "Enable Tool Execution",
            "Allow agents to execute tools and integrations",
            "tools",
        ),
        ValveSpec::new(
            "tool_timeout_secs",
            ValveType::Int,
            json!(30),
            "Tool Execution Timeout",
            "Maximum time (seconds) for a single tool execution",
            "tools",
        )
        .with_range(5.0, 300.0)
        .advanced(),
        ValveSpec::new(
            "max_concurrent_tools",
            ValveType::Int,
            json!(4),
            "Max Concurrent Tools",
            "Parallel tool calls allowed within one agent iteration",
            "tools",
        )
        .with_range(1.0, 16.0)
        .advanced(),
        // -- memory ---------------------------------------------------------
        ValveSpec::new(
            "enable_memory_search",
            ValveType::Bool,
            json!(true),
            "Enable Memory Search",
            "Search across memory and knowledge collections",
            "memory",
        ),
        ValveSpec::new(
            "memory_persistence",
            ValveType::Enum,
            json!("automatic"),
            "Memory Persistence",
            "How conversation-derived memory is written",
            "memory",
        )
        .with_options(["automatic", "manual", "disabled"]),
        ValveSpec::new(
            "backend_api_url",
            ValveType::Url,
            json!("http://localhost:8000"),
            "Backend API URL",
            "Base URL of the knowledge backend",
            "memory",
        )
        .restart_required(),
        // -- performance ----------------------------------------------------
        ValveSpec::new(
            "enable_caching",
            ValveType::Bool,
            json!(true),
            "Enable Response Caching",
            "Cache responses for identical requests",
            "performance",
        ),
        ValveSpec::new(
            "max_concurrent_observers",
            ValveType::Int,
            json!(3),
            "Max Concurrent Observers",
            "Shadow observations allowed to run simultaneously",
            "performance",
        )
        .with_range(1.0, 10.0)
        .advanced(),
        ValveSpec::new(
            "observer_timeout_secs",
            ValveType::Int,
            json!(30),
            "Observer Timeout",
            "Deadline (seconds) for one shadow observation",
            "performance",
        )
        .with_range(5.0, 300.0)
        .advanced(),
        // -- debug ----------------------------------------------------------
        ValveSpec::new(
            "debug_mode",
            ValveType::Bool,
            json!(false),
            "Debug Mode",
            "Enable detailed logging and debugging information",
            "debug",
        ),
        ValveSpec::new(
            "log_level",
            ValveType::Enum,
            json!("INFO"),
            "Log Level",
            "Logging verbosity level",
            "debug",
        )
        .with_options(["DEBUG", "INFO", "WARNING", "ERROR"])
        .advanced(),
        ValveSpec::new(
            "log_agent_decisions",
            ValveType::Bool,
            json!(false),
            "Log Agent Decisions",
            "Log detailed routing and decision information",
            "debug",
        )
        .advanced(),
        ValveSpec::new(
            "expose_logs_ui",
            ValveType::Bool,
            json!(true),
            "Expose Logs in UI",
            "Make execution logs available on the admin endpoints",
            "debug",
        ),
        ValveSpec::new(
            "log_retention_hours",
            ValveType::Int,
            json!(24),
            "Log Retention (Hours)",
            "How long log records remain visible on the admin surface",
            "debug",
        )
        .with_range(1.0, 168.0)
        .advanced(),
        ValveSpec::new(
            "log_file_path",
            ValveType::Path,
            json!("/tmp/mnemon_gateway.log"),
            "Log File Path",
            "Where the file log writer appends records",
            "debug",
        )
        .advanced(),
        // -- advanced -------------------------------------------------------
        ValveSpec::new(
            "reclaim_port_on_bind_failure",
            ValveType::Bool,
            json!(false),
            "Reclaim Port On Bind Failure",
            "Terminate a previous instance holding the port and retry binding",
            "advanced",
        )
        .restart_required(),
        ValveSpec::new(
            "custom_model_config",
            ValveType::String,
            json!(""),
            "Custom Model Configuration",
            "JSON configuration for custom models (advanced users only)",
            "advanced",
        )
        .advanced()
        .with_validator(Arc::new(valid_json_or_empty)),
    ]
}

/// Accepts the empty string or any parseable JSON document.
fn valid_json_or_empty(value: &Value) -> std::result::Result<(), String> {
    let s = value.as_str().unwrap_or_default();
    if s.is_empty() || serde_json::from_str::<Value>(s).is_ok() {
        Ok(())
    } else {
        Err("must be empty or a valid JSON document".to_owned())
    }
}

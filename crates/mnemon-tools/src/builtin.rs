//! The built-in tool table.
//!
//! Every tool Mnemon ships is declared here as an explicit [`ToolSpec`] and
//! registered by [`install`] at startup.  Remote routes target the backend's
//! `/api/v1` surface; `get_current_time` additionally carries a local clock
//! fallback so time queries keep working through a backend outage.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use mnemon_kernel::UserContext;

use crate::error::{Result, ToolError};
use crate::normalize::Normalizer;
use crate::registry::ToolRegistry;
use crate::spec::{HttpMethod, LocalHandler, ToolSpec};

/// Register every built-in tool.  Called once at startup.
pub fn install(registry: &ToolRegistry) -> Result<()> {
    for spec in specs() {
        registry.register(spec)?;
    }
    Ok(())
}

/// The full built-in tool table.
pub fn specs() -> Vec<ToolSpec> {
    vec![
        // -- memory ---------------------------------------------------------
        ToolSpec::new(
            "search_memory",
            "Search across memory collections (people, places, events, content) using semantic search",
            "memory",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "minLength": 1, "description": "Text to search for"},
                    "limit": {"type": "integer", "minimum": 1, "maximum": 100, "default": 10},
                    "model_types": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Restrict search to these entity types"
                    }
                },
                "required": ["query"]
            }),
        )
        .with_remote(HttpMethod::Post, "/memory/search"),
        ToolSpec::new(
            "create_person",
            "Create a new person entity in memory",
            "memory",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "minLength": 1},
                    "email": {"type": "string"},
                    "phone": {"type": "string"},
                    "organization": {"type": "string"},
                    "notes": {"type": "string"}
                },
                "required": ["name"]
            }),
        )
        .with_remote(HttpMethod::Post, "/memory/entities/person"),
        ToolSpec::new(
            "add_memory_fact",
            "Attach a durable fact to memory, optionally linked to an entity",
            "memory",
            json!({
                "type": "object",
                "properties": {
                    "fact": {"type": "string", "minLength": 1},
                    "entity_id": {"type": "string"},
                    "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                    "source": {"type": "string"}
                },
                "required": ["fact"]
            }),
        )
        .with_remote(HttpMethod::Post, "/memory/facts"),
        // -- profile --------------------------------------------------------
        ToolSpec::new(
            "get_user_profile",
            "Read the user's self profile",
            "profile",
            json!({"type": "object", "properties": {}}),
        )
        .with_remote(HttpMethod::Get, "/profile/self"),
        ToolSpec::new(
            "update_user_profile",
            "Apply partial updates to the user's self profile",
            "profile",
            json!({
                "type": "object",
                "properties": {
                    "updates": {"type": "object", "minProperties": 1}
                },
                "required": ["updates"]
            }),
        )
        .with_remote(HttpMethod::Put, "/profile/self"),
        // -- status ---------------------------------------------------------
        ToolSpec::new(
            "get_current_status",
            "Read the user's current status (location, activity, availability)",
            "status",
            json!({"type": "object", "properties": {}}),
        )
        .with_remote(HttpMethod::Get, "/status/current"),
        ToolSpec::new(
            "update_user_status",
            "Update fields of the user's current status",
            "status",
            json!({
                "type": "object",
                "properties": {
                    "updates": {"type": "object", "minProperties": 1}
                },
                "required": ["updates"]
            }),
        )
        .with_remote(HttpMethod::Put, "/status/current"),
        // -- analysis -------------------------------------------------------
        ToolSpec::new(
            "extract_conversation_entities",
            "Extract people, emails, and phone numbers mentioned in conversation text",
            "analysis",
            json!({
                "type": "object",
                "properties": {
                    "conversation_text": {"type": "string", "minLength": 1},
                    "min_confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0, "default": 0.5}
                },
                "required": ["conversation_text"]
            }),
        )
        .with_remote(HttpMethod::Post, "/conversations/entities")
        .with_normalizer(Normalizer::strip_prose_wrapper(["conversation_text"])),
        ToolSpec::new(
            "infer_conversation_intent",
            "Classify the user's intent in conversation text",
            "analysis",
            json!({
                "type": "object",
                "properties": {
                    "conversation_text": {"type": "string", "minLength": 1},
                    "intent_types": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["conversation_text"]
            }),
        )
        .with_remote(HttpMethod::Post, "/conversations/intent")
        .with_normalizer(Normalizer::strip_prose_wrapper(["conversation_text"])),
        ToolSpec::new(
            "store_conversation_analysis",
            "Persist a conversation analysis document",
            "analysis",
            json!({
                "type": "object",
                "properties": {
                    "conversation_text": {"type": "string", "minLength": 1},
                    "conversation_id": {"type": "string"},
                    "analysis": {"type": "object"}
                },
                "required": ["conversation_text"]
            }),
        )
        .with_remote(HttpMethod::Post, "/conversations/analysis"),
        ToolSpec::new(
            "search_conversations",
            "Search previously analysed conversations",
            "analysis",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "minLength": 1},
                    "limit": {"type": "integer", "minimum": 1, "maximum": 50, "default": 10}
                },
                "required": ["query"]
            }),
        )
        .with_remote(HttpMethod::Post, "/conversations/search"),
        // -- time -----------------------------------------------------------
        ToolSpec::new(
            "get_current_time",
            "Get the current time in a timezone",
            "time",
            json!({
                "type": "object",
                "properties": {
                    "timezone": {"type": "string", "default": "UTC"},
                    "format": {"type": "string", "enum": ["standard", "iso", "unix"], "default": "standard"}
                }
            }),
        )
        .with_remote(HttpMethod::Post, "/tools/time/current")
        .with_local(Arc::new(LocalClock)),
    ]
}

// ---------------------------------------------------------------------------
// Local clock fallback
// ---------------------------------------------------------------------------

/// Arguments for [`LocalClock`].
#[derive(Debug, Deserialize)]
struct CurrentTimeArgs {
    #[serde(default = "default_timezone")]
    timezone: String,
    #[serde(default = "default_format")]
    format: String,
}

fn default_timezone() -> String {
    "UTC".to_owned()
}

fn default_format() -> String {
    "standard".to_owned()
}

/// Clock handler answering from the host clock when the backend time service
/// is down.  Covers common zone names with fixed offsets; DST-aware lookups
/// stay with the backend.
struct LocalClock;

/// Fixed UTC offsets (hours) for the zone names the assistant sees most.
fn zone_offset_hours(zone: &str) -> i32 {
    match zone.to_ascii_lowercase().as_str() {
        "utc" | "gmt" => 0,
        "america/new_york" | "us/eastern" | "est" => -5,
        "america/chicago" | "us/central" | "cst" => -6,
        "america/denver" | "us/mountain" | "mst" => -7,
        "america/los_angeles" | "us/pacific" | "pst" => -8,
        "europe/london" => 0,
        "europe/paris" | "europe/berlin" | "cet" => 1,
        "asia/tokyo" | "jst" => 9,
        "asia/shanghai" => 8,
        "australia/sydney" => 10,
        _ => 0,
    }
}

#[async_trait]
impl LocalHandler for LocalClock {
    async fn execute(&self, args: Value, _user_ctx: Option<&UserContext>) -> Result<Value> {
        let args: CurrentTimeArgs =
            serde_json::from_value(args).map_err(|e| ToolError::Local {
                reason: format!("invalid time arguments: {e}"),
            })?;

        let offset_hours = zone_offset_hours(&args.timezone);
        let offset = FixedOffset::east_opt(offset_hours * 3600).ok_or_else(|| {
            ToolError::Local {
                reason: format!("offset out of range for zone {}", args.timezone),
            }
        })?;

        let now = Utc::now().with_timezone(&offset);

        let rendered = match args.format.as_str() {
            "iso" => now.to_rfc3339(),
            "unix" => now.timestamp().to_string(),
            _ => now.format("%Y-%m-%d %H:%M:%S").to_string(),
        };

        Ok(json!({
            "current_time": rendered,
            "timezone": args.timezone,
            "utc_offset_hours": offset_hours,
            "iso": now.to_rfc3339(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn table_has_unique_names_and_handlers() {
        let specs = specs();
        let names: HashSet<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names.len(), specs.len(), "tool names must be unique");

        for spec in &specs {
            assert!(
                spec.remote.is_some() || spec.local.is_some(),
                "tool `{}` has no handler",
                spec.name
            );
        }
    }

    #[test]
    fn only_conversation_tools_declare_normalizers() {
        for spec in specs() {
            let expected = matches!(
                spec.name.as_str(),
                "extract_conversation_entities" | "infer_conversation_intent"
            );
            assert_eq!(
                spec.normalizer.is_some(),
                expected,
                "unexpected normaliser declaration on `{}`",
                spec.name
            );
        }
    }

    #[tokio::test]
    async fn local_clock_echoes_requested_timezone() {
        let handler = LocalClock;
        let value = handler
            .execute(json!({"timezone": "America/Los_Angeles"}), None)
            .await
            .unwrap();

        assert_eq!(value["timezone"], "America/Los_Angeles");
        assert_eq!(value["utc_offset_hours"], -8);
        assert!(value["current_time"].as_str().is_some());
    }

    #[tokio::test]
    async fn local_clock_defaults_to_utc() {
        let handler = LocalClock;
        let value = handler.execute(json!({}), None).await.unwrap();
        assert_eq!(value["timezone"], "UTC");
        assert_eq!(value["utc_offset_hours"], 0);
    }

    #[tokio::test]
    async fn local_clock_supports_unix_format() {
        let handler = LocalClock;
        let value = handler
            .execute(json!({"format": "unix"}), None)
            .await
            .unwrap();
        let rendered = value["current_time"].as_str().unwrap();
        assert!(rendered.parse::<i64>().is_ok());
    }
}

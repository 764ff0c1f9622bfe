//! The valve manager.
//!
//! Owns the current values for every declared valve, validates batch updates
//! field by field, persists the value map atomically, and notifies change
//! listeners.  Batch semantics: every valid field applies, every invalid
//! field keeps its prior value and reports a reason; partial silent
//! acceptance never happens.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{json, Value};

use crate::catalog;
use crate::error::{Result, ValveError};
use crate::spec::{ValveCategory, ValveSpec};

/// Callback invoked with the applied delta after a successful update.
pub type ChangeListener = Box<dyn Fn(&BTreeMap<String, Value>) + Send + Sync>;

// ---------------------------------------------------------------------------
// Update outcome
// ---------------------------------------------------------------------------

/// Per-field validation verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValidation {
    /// The field was accepted and applied.
    Success,
    /// The field was rejected; the prior value is unchanged.
    Error(String),
}

impl Serialize for FieldValidation {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::Success => map.serialize_entry("success", &true)?,
            Self::Error(reason) => map.serialize_entry("error", reason)?,
        }
        map.end()
    }
}

/// Result of one batch update.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    /// Fields that were applied, with their new values.
    pub updated: BTreeMap<String, Value>,

    /// Per-field verdicts for every submitted field.
    pub validation: BTreeMap<String, FieldValidation>,

    /// Whether any applied field is declared restart-required.
    pub restart_required: bool,

    /// Snapshot of the full value map after the update.
    pub current_values: BTreeMap<String, Value>,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Validated, persisted, observable configuration store.
pub struct ValveManager {
    pipeline_id: String,
    config_path: PathBuf,
    valves: Vec<ValveSpec>,
    categories: Vec<ValveCategory>,
    current: Mutex<BTreeMap<String, Value>>,
    listeners: Mutex<Vec<ChangeListener>>,
}

impl ValveManager {
    /// Create a manager with the standard catalogue, persisting next to the
    /// process as `{pipeline_id}_valves.json`.
    pub fn new(pipeline_id: impl Into<String>) -> Result<Self> {
        let pipeline_id = pipeline_id.into();
        let config_path = PathBuf::from(format!("{pipeline_id}_valves.json"));
        Self::with_catalogue(pipeline_id, config_path, catalog::valves(), catalog::categories())
    }

    /// Create a manager with the standard catalogue and an explicit store
    /// path.
    pub fn with_store_path(pipeline_id: impl Into<String>, config_path: PathBuf) -> Result<Self> {
        Self::with_catalogue(
            pipeline_id.into(),
            config_path,
            catalog::valves(),
            catalog::categories(),
        )
    }

    /// Create a manager from an explicit catalogue.  Used by tests.
    pub fn with_catalogue(
        pipeline_id: String,
        config_path: PathBuf,
        valves: Vec<ValveSpec>,
        categories: Vec<ValveCategory>,
    ) -> Result<Self> {
        // Reject duplicate names up front; later lookups assume uniqueness.
        for (i, valve) in valves.iter().enumerate() {
            if valves[..i].iter().any(|v| v.name == valve.name) {
                return Err(ValveError::DuplicateValve {
                    name: valve.name.clone(),
                });
            }
            if !categories.iter().any(|c| c.name == valve.category) {
                return Err(ValveError::UnknownCategory {
                    valve: valve.name.clone(),
                    category: valve.category.clone(),
                });
            }
        }

        let defaults: BTreeMap<String, Value> = valves
            .iter()
            .map(|v| (v.name.clone(), v.default.clone()))
            .collect();

        let manager = Self {
            pipeline_id,
            config_path,
            valves,
            categories,
            current: Mutex::new(defaults),
            listeners: Mutex::new(Vec::new()),
        };

        manager.load();

        tracing::info!(
            pipeline_id = %manager.pipeline_id,
            valves = manager.valves.len(),
            categories = manager.categories.len(),
            "valve manager initialized"
        );

        Ok(manager)
    }

    /// The pipeline id this store belongs to.
    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    /// The path of the persisted value store.
    pub fn store_path(&self) -> &Path {
        &self.config_path
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Snapshot of the full value map.
    pub fn current(&self) -> BTreeMap<String, Value> {
        self.current.lock().expect("valve lock poisoned").clone()
    }

    /// Current value of one valve.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.current
            .lock()
            .expect("valve lock poisoned")
            .get(name)
            .cloned()
    }

    /// Boolean accessor; `false` for missing or non-boolean valves.
    pub fn get_bool(&self, name: &str) -> bool {
        self.get(name).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    /// Integer accessor with fallback.
    pub fn get_i64(&self, name: &str, default: i64) -> i64 {
        self.get(name).and_then(|v| v.as_i64()).unwrap_or(default)
    }

    /// Float accessor with fallback.
    pub fn get_f64(&self, name: &str, default: f64) -> f64 {
        self.get(name).and_then(|v| v.as_f64()).unwrap_or(default)
    }

    /// String accessor with fallback.
    pub fn get_str(&self, name: &str, default: &str) -> String {
        self.get(name)
            .and_then(|v| v.as_str().map(ToOwned::to_owned))
            .unwrap_or_else(|| default.to_owned())
    }

    /// The full catalogue rendered for the admin UI: a `properties` map of
    /// JSON-schema-like descriptors plus the category table.
    pub fn spec(&self) -> Value {
        let mut properties = serde_json::Map::new();
        for valve in &self.valves {
            let mut descriptor = serde_json::Map::new();
            descriptor.insert("type".into(), json!(valve.valve_type.wire_name()));
            descriptor.insert("default".into(), valve.default.clone());
            descriptor.insert("title".into(), json!(valve.title));
            descriptor.insert("description".into(), json!(valve.description));
            descriptor.insert("category".into(), json!(valve.category));
            if let Some(min) = valve.min {
                descriptor.insert("minimum".into(), json!(min));
            }
            if let Some(max) = valve.max {
                descriptor.insert("maximum".into(), json!(max));
            }
            if let Some(ref options) = valve.options {
                descriptor.insert("enum".into(), json!(options));
            }
            if valve.required {
                descriptor.insert("required".into(), json!(true));
            }
            if valve.advanced {
                descriptor.insert("advanced".into(), json!(true));
            }
            if valve.restart_required {
                descriptor.insert("restart_required".into(), json!(true));
            }
            if let Some(ref dep) = valve.depends_on {
                descriptor.insert("depends_on".into(), json!(dep));
            }
            properties.insert(valve.name.clone(), Value::Object(descriptor));
        }

        let mut categories = serde_json::Map::new();
        for category in &self.categories {
            categories.insert(
                category.name.clone(),
                json!({
                    "title": category.title,
                    "description": category.description,
                    "icon": category.icon,
                    "order": category.order,
                }),
            );
        }

        json!({
            "type": "object",
            "properties": properties,
            "categories": categories,
        })
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Apply a batch of updates.
    ///
    /// Every entry is validated independently (type, then range/enum, then
    /// custom validator); valid entries apply, invalid entries are reported
    /// and leave the prior value untouched.  Applied changes are persisted
    /// before listeners run.
    pub fn update(&self, updates: &BTreeMap<String, Value>) -> UpdateOutcome {
        let mut applied: BTreeMap<String, Value> = BTreeMap::new();
        let mut validation: BTreeMap<String, FieldValidation> = BTreeMap::new();
        let mut restart_required = false;

        let current_snapshot;
        {
            let mut current = self.current.lock().expect("valve lock poisoned");

            for (name, value) in updates {
                let Some(valve) = self.valves.iter().find(|v| &v.name == name) else {
                    validation.insert(name.clone(), FieldValidation::Error("Unknown valve".into()));
                    continue;
                };

                match valve.validate(value) {
                    Ok(()) => {
                        let old = current.insert(name.clone(), value.clone());
                        if valve.restart_required && old.as_ref() != Some(value) {
                            restart_required = true;
                        }
                        applied.insert(name.clone(), value.clone());
                        validation.insert(name.clone(), FieldValidation::Success);
                        tracing::info!(
                            valve = %name,
                            old = ?old,
                            new = %value,
                            "valve updated"
                        );
                    }
                    Err(reason) => {
                        validation.insert(name.clone(), FieldValidation::Error(reason));
                    }
                }
            }

            current_snapshot = current.clone();
        }

        if !applied.is_empty() {
            self.persist(&current_snapshot);
            self.notify(&applied);
        }

        UpdateOutcome {
            updated: applied,
            validation,
            restart_required,
            current_values: current_snapshot,
        }
    }

    /// Restore every valve to its declared default.
    pub fn reset(&self) -> UpdateOutcome {
        let defaults: BTreeMap<String, Value> = self
            .valves
            .iter()
            .map(|v| (v.name.clone(), v.default.clone()))
            .collect();
        tracing::info!(pipeline_id = %self.pipeline_id, "resetting all valves to defaults");
        self.update(&defaults)
    }

    /// Register a change listener.  Listeners run synchronously after
    /// persistence, in registration order; a panicking listener never aborts
    /// the others.
    pub fn add_change_listener(&self, listener: ChangeListener) {
        self.listeners
            .lock()
            .expect("listener lock poisoned")
            .push(listener);
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    fn persist(&self, values: &BTreeMap<String, Value>) {
        let document = json!({
            "pipeline_id": self.pipeline_id,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "values": values,
        });

        if let Err(e) = write_atomic(&self.config_path, &document) {
            // Persistence failure is logged, never fatal mid-flight; the
            // in-memory state stays authoritative.
            tracing::warn!(path = %self.config_path.display(), error = %e, "failed to persist valves");
        } else {
            tracing::debug!(path = %self.config_path.display(), "valve store persisted");
        }
    }

    fn load(&self) {
        if !self.config_path.exists() {
            tracing::info!("no existing valve store found, using defaults");
            return;
        }

        let parsed: Option<Value> = std::fs::read_to_string(&self.config_path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok());

        let Some(document) = parsed else {
            tracing::warn!(
                path = %self.config_path.display(),
                "valve store unreadable or corrupt, starting from defaults"
            );
            return;
        };

        let Some(values) = document.get("values").and_then(Value::as_object) else {
            tracing::warn!(
                path = %self.config_path.display(),
                "valve store missing `values` map, starting from defaults"
            );
            return;
        };

        let mut current = self.current.lock().expect("valve lock poisoned");
        let mut loaded = 0usize;
        for (name, value) in values {
            // Only known valves that still pass validation are restored;
            // anything else silently falls back to its default.
            if let Some(valve) = self.valves.iter().find(|v| &v.name == name) {
                if valve.validate(value).is_ok() {
                    current.insert(name.clone(), value.clone());
                    loaded += 1;
                }
            }
        }

        tracing::info!(
            path = %self.config_path.display(),
            loaded,
            "valve store loaded"
        );
    }

    fn notify(&self, delta: &BTreeMap<String, Value>) {
        let listeners = self.listeners.lock().expect("listener lock poisoned");
        for (index, listener) in listeners.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| listener(delta))).is_err() {
                tracing::warn!(index, "valve change listener panicked");
            }
        }
    }
}

/// Write a JSON document atomically: temp file in the same directory, then
/// rename over the target.
fn write_atomic(path: &Path, document: &Value) -> std::io::Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    let dir = parent.unwrap_or_else(|| Path::new("."));

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut temp, document).map_err(std::io::Error::other)?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn manager_in(dir: &TempDir) -> ValveManager {
        ValveManager::with_store_path("test_pipeline", dir.path().join("test_valves.json"))
            .unwrap()
    }

    #[test]
    fn mixed_batch_applies_only_valid_fields() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(&dir);
        let prior = manager.get("routing_confidence_threshold").unwrap();

        let mut updates = BTreeMap::new();
        updates.insert("routing_confidence_threshold".to_owned(), json!(1.5));
        updates.insert("debug_mode".to_owned(), json!(true));

        let outcome = manager.update(&updates);

        assert_eq!(outcome.updated.len(), 1);
        assert_eq!(outcome.updated.get("debug_mode"), Some(&json!(true)));
        assert_eq!(
            outcome.validation.get("debug_mode"),
            Some(&FieldValidation::Success)
        );
        match outcome.validation.get("routing_confidence_threshold") {
            Some(FieldValidation::Error(reason)) => assert!(reason.contains("<= 1")),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(
            outcome.current_values.get("routing_confidence_threshold"),
            Some(&prior)
        );
    }

    #[test]
    fn unknown_valves_are_reported() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(&dir);

        let mut updates = BTreeMap::new();
        updates.insert("no_such_valve".to_owned(), json!(1));
        let outcome = manager.update(&updates);

        assert!(outcome.updated.is_empty());
        assert_eq!(
            outcome.validation.get("no_such_valve"),
            Some(&FieldValidation::Error("Unknown valve".into()))
        );
    }

    #[test]
    fn restart_required_is_surfaced_only_on_change() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(&dir);

        let mut updates = BTreeMap::new();
        updates.insert("backend_api_url".to_owned(), json!("http://localhost:8000"));
        // Same value as the default: no restart needed.
        assert!(!manager.update(&updates).restart_required);

        updates.insert("backend_api_url".to_owned(), json!("http://backend:9000"));
        assert!(manager.update(&updates).restart_required);
    }

    #[test]
    fn values_survive_a_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("persisted_valves.json");

        {
            let manager =
                ValveManager::with_store_path("test_pipeline", path.clone()).unwrap();
            let mut updates = BTreeMap::new();
            updates.insert("max_agent_iterations".to_owned(), json!(50));
            manager.update(&updates);
        }

        let reloaded = ValveManager::with_store_path("test_pipeline", path).unwrap();
        assert_eq!(reloaded.get_i64("max_agent_iterations", 0), 50);
    }

    #[test]
    fn corrupt_store_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corrupt_valves.json");
        std::fs::write(&path, "not json at all {{{").unwrap();

        let manager = ValveManager::with_store_path("test_pipeline", path).unwrap();
        assert_eq!(manager.get_i64("max_agent_iterations", 0), 25);
    }

    #[test]
    fn listeners_fire_in_order_and_survive_panics() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(&dir);

        let order = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));

        {
            let order = Arc::clone(&order);
            manager.add_change_listener(Box::new(move |_| {
                order.lock().unwrap().push("first");
            }));
        }
        manager.add_change_listener(Box::new(|_| panic!("listener bug")));
        {
            let order = Arc::clone(&order);
            let calls = Arc::clone(&calls);
            manager.add_change_listener(Box::new(move |delta| {
                order.lock().unwrap().push("third");
                calls.fetch_add(delta.len(), Ordering::SeqCst);
            }));
        }

        let mut updates = BTreeMap::new();
        updates.insert("debug_mode".to_owned(), json!(true));
        manager.update(&updates);

        assert_eq!(*order.lock().unwrap(), vec!["first", "third"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rejected_batch_does_not_notify() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(&dir);

        let calls = Arc::new(AtomicUsize::new(0));
        {
            let calls = Arc::clone(&calls);
            manager.add_change_listener(Box::new(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            }));
        }

        let mut updates = BTreeMap::new();
        updates.insert("debug_mode".to_owned(), json!("not a bool"));
        manager.update(&updates);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reset_restores_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(&dir);

        let mut updates = BTreeMap::new();
        updates.insert("debug_mode".to_owned(), json!(true));
        updates.insert("max_agent_iterations".to_owned(), json!(99));
        manager.update(&updates);

        manager.reset();
        assert!(!manager.get_bool("debug_mode"));
        assert_eq!(manager.get_i64("max_agent_iterations", 0), 25);
    }

    #[test]
    fn spec_exposes_categories_and_descriptors() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(&dir);
        let spec = manager.spec();

        let properties = spec["properties"].as_object().unwrap();
        assert!(properties.contains_key("routing_confidence_threshold"));
        let threshold = &properties["routing_confidence_threshold"];
        assert_eq!(threshold["type"], "float");
        assert_eq!(threshold["maximum"], 1.0);
        assert_eq!(threshold["advanced"], true);

        let categories = spec["categories"].as_object().unwrap();
        assert!(categories.contains_key("debug"));
        assert_eq!(categories["core"]["order"], 1);
    }
}

//! Valve declarations.
//!
//! A valve is one named configuration knob with a declared type, bounds,
//! category, and optional custom validator.  Declarations are immutable; only
//! the current value changes, and only through the manager's validated
//! update path.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Validation callback: `Ok(())` accepts, `Err(reason)` rejects.
pub type ValidatorFn = Arc<dyn Fn(&Value) -> std::result::Result<(), String> + Send + Sync>;

/// The value types a valve may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValveType {
    Bool,
    String,
    Int,
    Float,
    Enum,
    Path,
    Url,
}

impl ValveType {
    /// Wire name used in the valve spec payload.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Bool => "boolean",
            Self::String => "string",
            Self::Int => "integer",
            Self::Float => "float",
            Self::Enum => "select",
            Self::Path => "path",
            Self::Url => "url",
        }
    }
}

/// Declaration of one valve.
#[derive(Clone)]
pub struct ValveSpec {
    /// Unique valve name.
    pub name: String,

    /// Declared value type.
    pub valve_type: ValveType,

    /// The default value, also used after `reset()`.
    pub default: Value,

    /// Short UI title.
    pub title: String,

    /// Longer UI description.
    pub description: String,

    /// Category name; must exist in the catalogue.
    pub category: String,

    /// Whether the valve must always hold a non-default value.
    pub required: bool,

    /// Hidden behind the "advanced" toggle in the UI.
    pub advanced: bool,

    /// Changing this valve only takes effect after a restart.
    pub restart_required: bool,

    /// Inclusive lower bound for numeric valves.
    pub min: Option<f64>,

    /// Inclusive upper bound for numeric valves.
    pub max: Option<f64>,

    /// Allowed options for [`ValveType::Enum`] valves.
    pub options: Option<Vec<String>>,

    /// Optional custom validator, run after type and range checks.
    pub validator: Option<ValidatorFn>,

    /// Name of a valve this one depends on (metadata for the UI).
    pub depends_on: Option<String>,
}

impl ValveSpec {
    /// Create a valve declaration.
    pub fn new(
        name: impl Into<String>,
        valve_type: ValveType,
        default: Value,
        title: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            valve_type,
            default,
            title: title.into(),
            description: description.into(),
            category: category.into(),
            required: false,
            advanced: false,
            restart_required: false,
            min: None,
            max: None,
            options: None,
            validator: None,
            depends_on: None,
        }
    }

    /// Set the inclusive numeric range.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Set the allowed enum options.
    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = Some(options.into_iter().map(Into::into).collect());
        self
    }

    /// Mark as advanced.
    pub fn advanced(mut self) -> Self {
        self.advanced = true;
        self
    }

    /// Mark as requiring a restart to take effect.
    pub fn restart_required(mut self) -> Self {
        self.restart_required = true;
        self
    }

    /// Attach a custom validator.
    pub fn with_validator(mut self, validator: ValidatorFn) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Record a dependency on another valve.
    pub fn depends_on(mut self, other: impl Into<String>) -> Self {
        self.depends_on = Some(other.into());
        self
    }

    /// Validate a candidate value: type check, then range/enum check, then
    /// the custom validator.  Returns the first failure reason.
    pub fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        match self.valve_type {
            ValveType::Bool => {
                if !value.is_boolean() {
                    return Err("must be a boolean value".to_owned());
                }
            }
            ValveType::String | ValveType::Path => {
                if !value.is_string() {
                    return Err("must be a string value".to_owned());
                }
            }
            ValveType::Url => {
                let Some(s) = value.as_str() else {
                    return Err("must be a string URL".to_owned());
                };
                if !s.starts_with("http://") && !s.starts_with("https://") {
                    return Err("must be a valid URL (http:// or https://)".to_owned());
                }
            }
            ValveType::Int => {
                if !value.is_i64() && !value.is_u64() {
                    return Err("must be an integer value".to_owned());
                }
                self.check_range(value.as_f64().unwrap_or(0.0))?;
            }
            ValveType::Float => {
                let Some(n) = value.as_f64() else {
                    return Err("must be a numeric value".to_owned());
                };
                self.check_range(n)?;
            }
            ValveType::Enum => {
                let Some(s) = value.as_str() else {
                    return Err("must be a string value".to_owned());
                };
                if let Some(ref options) = self.options {
                    if !options.iter().any(|o| o == s) {
                        return Err(format!("must be one of: {}", options.join(", ")));
                    }
                }
            }
        }

        if let Some(ref validator) = self.validator {
            validator(value)?;
        }

        Ok(())
    }

    fn check_range(&self, n: f64) -> std::result::Result<(), String> {
        if let Some(min) = self.min {
            if n < min {
                return Err(format!("must be >= {min}"));
            }
        }
        if let Some(max) = self.max {
            if n > max {
                return Err(format!("must be <= {max}"));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ValveSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValveSpec")
            .field("name", &self.name)
            .field("valve_type", &self.valve_type)
            .field("default", &self.default)
            .field("category", &self.category)
            .field("restart_required", &self.restart_required)
            .finish()
    }
}

/// Category grouping for the admin UI.
#[derive(Debug, Clone)]
pub struct ValveCategory {
    /// Stable category name.
    pub name: String,
    /// UI title.
    pub title: String,
    /// UI description.
    pub description: String,
    /// Optional icon hint.
    pub icon: Option<String>,
    /// Sort order in the UI.
    pub order: u32,
}

impl ValveCategory {
    /// Create a category.
    pub fn new(
        name: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        icon: Option<&str>,
        order: u32,
    ) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            description: description.into(),
            icon: icon.map(ToOwned::to_owned),
            order,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn float_valve() -> ValveSpec {
        ValveSpec::new(
            "routing_confidence_threshold",
            ValveType::Float,
            json!(0.7),
            "Routing Confidence Threshold",
            "Minimum confidence for automatic selection",
            "agents",
        )
        .with_range(0.0, 1.0)
    }

    #[test]
    fn float_range_is_enforced() {
        let valve = float_valve();
        assert!(valve.validate(&json!(0.5)).is_ok());
        assert!(valve.validate(&json!(1.0)).is_ok());

        let err = valve.validate(&json!(1.5)).unwrap_err();
        assert!(err.contains("<= 1"));

        let err = valve.validate(&json!(-0.1)).unwrap_err();
        assert!(err.contains(">= 0"));
    }

    #[test]
    fn type_mismatches_are_rejected() {
        let valve = float_valve();
        assert!(valve.validate(&json!("0.5")).is_err());

        let flag = ValveSpec::new(
            "debug_mode",
            ValveType::Bool,
            json!(false),
            "Debug",
            "",
            "debug",
        );
        assert!(flag.validate(&json!(true)).is_ok());
        assert!(flag.validate(&json!(1)).is_err());
    }

    #[test]
    fn integer_rejects_floats() {
        let valve = ValveSpec::new(
            "max_agent_iterations",
            ValveType::Int,
            json!(25),
            "Max Iterations",
            "",
            "agents",
        )
        .with_range(1.0, 100.0);

        assert!(valve.validate(&json!(50)).is_ok());
        assert!(valve.validate(&json!(2.5)).is_err());
        assert!(valve.validate(&json!(0)).is_err());
        assert!(valve.validate(&json!(101)).is_err());
    }

    #[test]
    fn enum_options_are_enforced() {
        let valve = ValveSpec::new(
            "log_level",
            ValveType::Enum,
            json!("INFO"),
            "Log Level",
            "",
            "debug",
        )
        .with_options(["DEBUG", "INFO", "WARNING", "ERROR"]);

        assert!(valve.validate(&json!("DEBUG")).is_ok());
        let err = valve.validate(&json!("VERBOSE")).unwrap_err();
        assert!(err.contains("must be one of"));
    }

    #[test]
    fn url_requires_http_scheme() {
        let valve = ValveSpec::new(
            "backend_api_url",
            ValveType::Url,
            json!("http://localhost:8000"),
            "Backend URL",
            "",
            "memory",
        );

        assert!(valve.validate(&json!("https://example.com")).is_ok());
        assert!(valve.validate(&json!("ftp://example.com")).is_err());
        assert!(valve.validate(&json!(42)).is_err());
    }

    #[test]
    fn custom_validator_runs_after_builtin_checks() {
        let valve = ValveSpec::new(
            "custom_model_config",
            ValveType::String,
            json!(""),
            "Custom Model Config",
            "",
            "advanced",
        )
        .with_validator(Arc::new(|v| {
            let s = v.as_str().unwrap_or_default();
            if s.is_empty() || serde_json::from_str::<Value>(s).is_ok() {
                Ok(())
            } else {
                Err("must be empty or valid JSON".to_owned())
            }
        }));

        assert!(valve.validate(&json!("")).is_ok());
        assert!(valve.validate(&json!("{\"a\": 1}")).is_ok());
        assert!(valve.validate(&json!("not json")).is_err());
    }
}

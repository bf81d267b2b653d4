//! Declared plugin options and their resolution.
//!
//! Every plugin publishes a static slice of [`OptionSpec`]s. Resolution order
//! for each declared option is: explicit value in the configuration, then the
//! environment variable named by `env_fallback`, then `default`. An option
//! with none of the three is a configuration error.

use ef_error::{ExportError, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Expected JSON type of an option value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    String,
    Integer,
    Float,
    Boolean,
    List,
    Object,
    Any,
}

impl OptionKind {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::List => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::List => "list",
            Self::Object => "object",
            Self::Any => "any",
        }
    }
}

/// A declared plugin option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionSpec {
    /// Option name as it appears in `options`
    pub name: &'static str,

    /// Expected value type
    pub kind: OptionKind,

    /// Default value as a JSON literal (`"null"` marks an optional option)
    pub default: Option<&'static str>,

    /// Environment variable consulted when the option is not given
    pub env_fallback: Option<&'static str>,
}

impl OptionSpec {
    /// Declares a required option.
    pub const fn required(name: &'static str, kind: OptionKind) -> Self {
        Self {
            name,
            kind,
            default: None,
            env_fallback: None,
        }
    }

    /// Declares an option that resolves to `null` when absent.
    pub const fn optional(name: &'static str, kind: OptionKind) -> Self {
        Self::required(name, kind).with_default("null")
    }

    /// Sets the default, given as a JSON literal.
    pub const fn with_default(mut self, json: &'static str) -> Self {
        self.default = Some(json);
        self
    }

    /// Sets the environment variable fallback.
    pub const fn with_env(mut self, var: &'static str) -> Self {
        self.env_fallback = Some(var);
        self
    }
}

/// Resolves raw options against the declared specs.
///
/// Unknown options are rejected. The returned map contains every declared
/// option, type-checked against its [`OptionKind`] (`null` is accepted for
/// any kind).
pub fn resolve_options(
    module: &str,
    specs: &[OptionSpec],
    given: &Map<String, Value>,
) -> Result<Map<String, Value>> {
    for key in given.keys() {
        if !specs.iter().any(|s| s.name == key) {
            return Err(ExportError::config(format!(
                "unsupported option '{key}' for module {module}"
            )));
        }
    }

    let mut resolved = Map::new();
    for spec in specs {
        let value = match given.get(spec.name) {
            Some(value) => value.clone(),
            None => match env_value(spec)? {
                Some(value) => value,
                None => match spec.default {
                    Some(literal) => serde_json::from_str(literal).map_err(|e| {
                        ExportError::config(format!(
                            "bad default for option '{}' of {module}: {e}",
                            spec.name
                        ))
                    })?,
                    None => {
                        return Err(ExportError::config(format!(
                            "missing required option '{}' for module {module}",
                            spec.name
                        )))
                    }
                },
            },
        };

        if !value.is_null() && !spec.kind.accepts(&value) {
            return Err(ExportError::config(format!(
                "option '{}' of {module} must be of type {}, got {value}",
                spec.name,
                spec.kind.name()
            )));
        }
        resolved.insert(spec.name.to_string(), value);
    }

    Ok(resolved)
}

fn env_value(spec: &OptionSpec) -> Result<Option<Value>> {
    let Some(var) = spec.env_fallback else {
        return Ok(None);
    };
    let Ok(raw) = std::env::var(var) else {
        return Ok(None);
    };
    match spec.kind {
        OptionKind::String => Ok(Some(Value::String(raw))),
        _ => serde_json::from_str(&raw).map(Some).map_err(|e| {
            ExportError::config(format!(
                "environment variable {var} for option '{}' is not valid JSON: {e}",
                spec.name
            ))
        }),
    }
}

/// Resolves options and deserializes them into a typed options struct.
pub fn parse_options<T: DeserializeOwned>(
    module: &str,
    specs: &[OptionSpec],
    given: &Map<String, Value>,
) -> Result<T> {
    let resolved = resolve_options(module, specs, given)?;
    serde_json::from_value(Value::Object(resolved))
        .map_err(|e| ExportError::config(format!("invalid options for {module}: {e}")))
}

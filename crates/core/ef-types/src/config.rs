//! Run configuration and plugin references.

use ef_error::{ExportError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::LazyLock;

/// Default logger category.
pub const DEFAULT_LOGGER_NAME: &str = "export-pipeline";

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Reference to a plugin: a registry name plus its raw options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Registry name of the plugin (e.g. `readers.random`)
    pub name: String,

    /// Raw options, resolved against the plugin's declared options
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl ModuleConfig {
    /// Creates a module reference without options.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Map::new(),
        }
    }

    /// Adds an option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Returns true if the option was given explicitly.
    pub fn has_option(&self, key: &str) -> bool {
        self.options.get(key).is_some_and(|v| !v.is_null())
    }

    /// Returns an explicitly given string option.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }
}

/// Log level accepted in `exporter_options.log_level`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    #[serde(alias = "debug")]
    #[serde(rename = "DEBUG")]
    Debug,
    #[default]
    #[serde(alias = "info")]
    #[serde(rename = "INFO")]
    Info,
    #[serde(alias = "warn", alias = "WARNING", alias = "warning")]
    #[serde(rename = "WARN")]
    Warn,
    #[serde(alias = "error")]
    #[serde(rename = "ERROR")]
    Error,
}

impl LogLevel {
    /// Returns the canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// Options that apply to the whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExporterOptions {
    /// Maximum log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Logger category attached to every event of the run
    #[serde(default = "default_logger_name")]
    pub logger_name: String,

    /// Record formatter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatter: Option<ModuleConfig>,

    /// Notifiers, in delivery order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notifications: Vec<ModuleConfig>,

    /// Skip the bypass dispatcher
    #[serde(default)]
    pub prevent_bypass: bool,

    /// Resume the job named by `persistence_state_id`
    #[serde(default)]
    pub resume: bool,

    /// Job id in the persistence backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistence_state_id: Option<String>,
}

impl Default for ExporterOptions {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            logger_name: default_logger_name(),
            formatter: None,
            notifications: Vec::new(),
            prevent_bypass: false,
            resume: false,
            persistence_state_id: None,
        }
    }
}

fn default_logger_name() -> String {
    DEFAULT_LOGGER_NAME.to_string()
}

/// The complete, immutable configuration of one export run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    pub reader: ModuleConfig,
    pub writer: ModuleConfig,
    pub exporter_options: ExporterOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_before: Option<ModuleConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_after: Option<ModuleConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<ModuleConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouper: Option<ModuleConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatter: Option<ModuleConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistence: Option<ModuleConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<ModuleConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notifications: Vec<ModuleConfig>,
}

impl ExportConfig {
    /// Creates a configuration with the given reader and writer and defaults elsewhere.
    pub fn new(reader: ModuleConfig, writer: ModuleConfig) -> Self {
        Self {
            reader,
            writer,
            exporter_options: ExporterOptions::default(),
            filter_before: None,
            filter_after: None,
            transform: None,
            grouper: None,
            formatter: None,
            persistence: None,
            stats: None,
            notifications: Vec::new(),
        }
    }

    /// Parses a YAML document (JSON is accepted as a YAML subset).
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        let substituted = substitute_env_vars(input)?;
        let config: Self = serde_yaml::from_str(&substituted)
            .map_err(|e| ExportError::config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a JSON document.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let substituted = substitute_env_vars(input)?;
        let config: Self = serde_json::from_str(&substituted)
            .map_err(|e| ExportError::config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a configuration from a JSON value (e.g. one stored by persistence).
    pub fn from_value(value: Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value)
            .map_err(|e| ExportError::config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file; `.json` files are parsed as JSON, anything else as YAML.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ExportError::config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.reader.name.is_empty() {
            return Err(ExportError::config("reader.name must not be empty"));
        }
        if self.writer.name.is_empty() {
            return Err(ExportError::config("writer.name must not be empty"));
        }
        if self.exporter_options.resume && self.exporter_options.persistence_state_id.is_none() {
            return Err(ExportError::config(
                "exporter_options.resume requires exporter_options.persistence_state_id",
            ));
        }
        Ok(())
    }

    /// Returns the effective formatter reference.
    ///
    /// `exporter_options.formatter` takes precedence over the top-level key.
    pub fn formatter(&self) -> Option<&ModuleConfig> {
        self.exporter_options
            .formatter
            .as_ref()
            .or(self.formatter.as_ref())
    }

    /// Returns all configured notifiers.
    pub fn notifications(&self) -> impl Iterator<Item = &ModuleConfig> {
        self.exporter_options
            .notifications
            .iter()
            .chain(self.notifications.iter())
    }

    /// Serializes the configuration for storage and reporting.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Marks the configuration as a resume of `job_id`.
    pub fn into_resumed(mut self, job_id: impl Into<String>) -> Self {
        self.exporter_options.resume = true;
        self.exporter_options.persistence_state_id = Some(job_id.into());
        self
    }
}

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// Returns a configuration error naming every unset variable.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let mut missing = Vec::new();

    for cap in ENV_VAR_RE.captures_iter(input) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(val) => result = result.replace(&cap[0], &val),
            Err(_) => missing.push(var_name.to_string()),
        }
    }

    if !missing.is_empty() {
        return Err(ExportError::config(format!(
            "missing environment variable(s): {}",
            missing.join(", ")
        )));
    }

    Ok(result)
}

//! Built-in filters.

use ef_error::{ExportError, Result};
use ef_traits::Filter;
use ef_types::{value_to_text, OptionKind, OptionSpec, Record};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Keeps every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFilter;

impl NoFilter {
    pub const OPTIONS: &'static [OptionSpec] = &[];

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        ef_types::resolve_options("filters.no_filter", Self::OPTIONS, options)?;
        Ok(Self)
    }
}

impl Filter for NoFilter {
    fn filter(&self, _record: &Record) -> bool {
        true
    }

    fn name(&self) -> &str {
        "no_filter"
    }
}

#[derive(Debug, Deserialize)]
struct KeyCondition {
    name: String,
    value: Value,
}

#[derive(Debug, Deserialize)]
struct KeyValueOptions {
    keys: Vec<KeyCondition>,
    mode: String,
}

#[derive(Debug)]
enum Matcher {
    Equals(Value),
    Regex(Regex),
}

impl Matcher {
    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Equals(expected) => value == expected,
            Self::Regex(re) => re.is_match(&value_to_text(value)),
        }
    }
}

/// Keeps records whose fields match every `{name, value}` condition.
///
/// In `equals` mode values are compared as JSON; in `regex` mode the value
/// is a pattern searched in the field's text. Records missing a field are
/// dropped.
#[derive(Debug)]
pub struct KeyValueFilter {
    conditions: Vec<(String, Matcher)>,
}

impl KeyValueFilter {
    pub const OPTIONS: &'static [OptionSpec] = &[
        OptionSpec::required("keys", OptionKind::List),
        OptionSpec::required("mode", OptionKind::String).with_default("\"equals\""),
    ];

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let opts: KeyValueOptions =
            ef_types::parse_options("filters.key_value", Self::OPTIONS, options)?;

        let conditions = opts
            .keys
            .into_iter()
            .map(|cond| {
                let matcher = match opts.mode.as_str() {
                    "equals" => Matcher::Equals(cond.value),
                    "regex" => Matcher::Regex(compile(&cond.name, &cond.value)?),
                    other => {
                        return Err(ExportError::config(format!(
                            "filters.key_value: unknown mode '{other}' (expected equals or regex)"
                        )))
                    }
                };
                Ok((cond.name, matcher))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { conditions })
    }
}

fn compile(field: &str, pattern: &Value) -> Result<Regex> {
    let Some(pattern) = pattern.as_str() else {
        return Err(ExportError::InvalidExpression(format!(
            "pattern for '{field}' must be a string, got {pattern}"
        )));
    };
    Regex::new(pattern).map_err(|e| {
        ExportError::InvalidExpression(format!("invalid pattern for '{field}': {e}"))
    })
}

impl Filter for KeyValueFilter {
    fn filter(&self, record: &Record) -> bool {
        self.conditions.iter().all(|(name, matcher)| {
            record.get(name).is_some_and(|value| matcher.matches(value))
        })
    }

    fn name(&self) -> &str {
        "key_value"
    }
}

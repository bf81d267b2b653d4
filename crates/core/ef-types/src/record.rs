//! The record type that flows through the pipeline.

use ef_error::{ExportError, Result};
use serde_json::{Map, Value};

/// A single record: a field map plus grouping and formatting state.
///
/// `group_membership` is set by the grouper (empty means ungrouped).
/// `formatted` is set by the formatter; once set it is the payload the
/// write buffer stores for this record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Map<String, Value>,

    /// Ordered grouping-key values naming the group this record belongs to
    pub group_membership: Vec<String>,

    /// Cached serialized payload
    pub formatted: Option<Vec<u8>>,
}

impl Record {
    /// Creates an ungrouped, unformatted record from a field map.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            group_membership: Vec::new(),
            formatted: None,
        }
    }

    /// Creates a record from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self::new(fields)),
            other => Err(ExportError::Format(format!(
                "record must be a JSON object, got {other}"
            ))),
        }
    }

    /// Parses a record from one JSON document.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        Self::from_value(serde_json::from_slice(bytes)?)
    }

    /// Sets the group membership.
    pub fn with_group_membership(mut self, membership: Vec<String>) -> Self {
        self.group_membership = membership;
        self
    }

    /// Returns a field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Sets a field value, returning the previous one.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(field.into(), value)
    }

    /// Removes a field.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// Returns the field map.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Consumes the record, returning its field map.
    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    /// Returns the field value rendered as plain text.
    ///
    /// Strings are returned unquoted; other values use their JSON form.
    pub fn get_text(&self, field: &str) -> Option<String> {
        self.fields.get(field).map(value_to_text)
    }
}

/// Renders a JSON value as text without quoting strings.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self::new(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_object() {
        let record = Record::from_value(json!({"id": 1, "name": "a"})).unwrap();
        assert_eq!(record.get("id"), Some(&json!(1)));
        assert!(record.group_membership.is_empty());
        assert!(record.formatted.is_none());
    }

    #[test]
    fn test_from_value_rejects_scalars() {
        assert!(Record::from_value(json!(3)).is_err());
    }

    #[test]
    fn test_get_text() {
        let record = Record::from_value(json!({"city": "Paris", "n": 3, "x": null})).unwrap();
        assert_eq!(record.get_text("city").as_deref(), Some("Paris"));
        assert_eq!(record.get_text("n").as_deref(), Some("3"));
        assert_eq!(record.get_text("x").as_deref(), Some(""));
        assert_eq!(record.get_text("missing"), None);
    }
}

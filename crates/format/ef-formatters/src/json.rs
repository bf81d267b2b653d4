//! JSON-lines and JSON-array formatters.

use ef_error::Result;
use ef_traits::Formatter;
use ef_types::{OptionKind, OptionSpec, Record};
use serde_json::{Map, Value};

/// One JSON document per line.
#[derive(Debug, Clone, Default)]
pub struct JsonLinesFormatter {
    sort_keys: bool,
}

impl JsonLinesFormatter {
    pub const OPTIONS: &'static [OptionSpec] =
        &[OptionSpec::required("sort_keys", OptionKind::Boolean).with_default("false")];

    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        #[derive(serde::Deserialize)]
        struct Opts {
            sort_keys: bool,
        }
        let opts: Opts = ef_types::parse_options("formatters.json_lines", Self::OPTIONS, options)?;
        Ok(Self {
            sort_keys: opts.sort_keys,
        })
    }
}

impl Formatter for JsonLinesFormatter {
    fn format(&self, record: &Record) -> Result<Vec<u8>> {
        to_json(record, self.sort_keys)
    }

    fn file_extension(&self) -> &str {
        "jl"
    }

    fn name(&self) -> &str {
        "json_lines"
    }
}

/// A single JSON array per file.
#[derive(Debug, Clone, Default)]
pub struct JsonArrayFormatter {
    sort_keys: bool,
}

impl JsonArrayFormatter {
    pub const OPTIONS: &'static [OptionSpec] = JsonLinesFormatter::OPTIONS;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let inner = JsonLinesFormatter::from_options(options)?;
        Ok(Self {
            sort_keys: inner.sort_keys,
        })
    }
}

impl Formatter for JsonArrayFormatter {
    fn format(&self, record: &Record) -> Result<Vec<u8>> {
        to_json(record, self.sort_keys)
    }

    fn format_header(&self) -> Vec<u8> {
        b"[".to_vec()
    }

    fn format_footer(&self) -> Vec<u8> {
        b"]".to_vec()
    }

    fn item_separator(&self) -> &[u8] {
        b",\n"
    }

    fn file_extension(&self) -> &str {
        "json"
    }

    fn name(&self) -> &str {
        "json"
    }
}

fn to_json(record: &Record, sort_keys: bool) -> Result<Vec<u8>> {
    if sort_keys {
        let sorted: std::collections::BTreeMap<_, _> = record.fields().iter().collect();
        Ok(serde_json::to_vec(&sorted)?)
    } else {
        Ok(serde_json::to_vec(record.fields())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_lines_round_trip() {
        let formatter = JsonLinesFormatter::new();
        let original = Record::from_value(json!({"id": 1, "tags": ["a", "b"], "nested": {"x": null}}))
            .unwrap();
        let bytes = formatter.format(&original).unwrap();
        assert!(!bytes.contains(&b'\n'));

        let parsed = Record::from_json_slice(&bytes).unwrap();
        assert_eq!(parsed.fields(), original.fields());
    }

    #[test]
    fn test_sort_keys() {
        let options = json!({"sort_keys": true}).as_object().cloned().unwrap();
        let formatter = JsonLinesFormatter::from_options(&options).unwrap();
        let record = Record::from_value(json!({"b": 1, "a": 2})).unwrap();
        assert_eq!(formatter.format(&record).unwrap(), br#"{"a":2,"b":1}"#.to_vec());
    }

    #[test]
    fn test_json_array_framing() {
        let formatter = JsonArrayFormatter::new();
        let record = Record::from_value(json!({"id": 1})).unwrap();
        let mut file = formatter.format_header();
        file.extend(formatter.format(&record).unwrap());
        file.extend_from_slice(formatter.item_separator());
        file.extend(formatter.format(&record).unwrap());
        file.extend(formatter.format_footer());

        let parsed: Value = serde_json::from_slice(&file).unwrap();
        assert_eq!(parsed, json!([{"id": 1}, {"id": 1}]));
        assert_eq!(formatter.file_extension(), "json");
    }
}

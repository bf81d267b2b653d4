//! Built-in groupers.

use ef_error::Result;
use ef_traits::{Grouper, RecordStream};
use ef_types::{OptionKind, OptionSpec};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Membership value used when a grouping field is absent.
pub const UNKNOWN_GROUP: &str = "unknown";

/// Leaves every record ungrouped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGrouping;

impl NoGrouping {
    pub const OPTIONS: &'static [OptionSpec] = &[];

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        ef_types::resolve_options("groupers.no_grouping", Self::OPTIONS, options)?;
        Ok(Self)
    }
}

impl Grouper for NoGrouping {
    fn group_batch<'a>(&'a self, records: RecordStream<'a>) -> RecordStream<'a> {
        Box::new(records.map(|item| {
            item.map(|mut record| {
                record.group_membership.clear();
                record
            })
        }))
    }

    fn name(&self) -> &str {
        "no_grouping"
    }
}

#[derive(Debug, Deserialize)]
struct KeysOptions {
    keys: Vec<String>,
}

/// Groups by the text of the listed fields, in order.
#[derive(Debug, Clone)]
pub struct KeysGrouper {
    keys: Vec<String>,
}

impl KeysGrouper {
    pub const OPTIONS: &'static [OptionSpec] = &[OptionSpec::required("keys", OptionKind::List)];

    pub fn new(keys: Vec<String>) -> Self {
        Self { keys }
    }

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let opts: KeysOptions = ef_types::parse_options("groupers.keys", Self::OPTIONS, options)?;
        Ok(Self::new(opts.keys))
    }
}

impl Grouper for KeysGrouper {
    fn group_batch<'a>(&'a self, records: RecordStream<'a>) -> RecordStream<'a> {
        Box::new(records.map(move |item| {
            let mut record = item?;
            record.group_membership = self
                .keys
                .iter()
                .map(|key| {
                    record
                        .get(key)
                        .filter(|v| !v.is_null())
                        .map(ef_types::value_to_text)
                        .unwrap_or_else(|| UNKNOWN_GROUP.to_string())
                })
                .collect();
            Ok(record)
        }))
    }

    fn name(&self) -> &str {
        "keys"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ef_traits::stream_of;
    use ef_types::Record;
    use serde_json::json;

    #[test]
    fn test_keys_membership() {
        let grouper = KeysGrouper::new(vec!["country".into(), "city".into()]);
        let records = vec![
            Record::from_value(json!({"country": "ES", "city": "Madrid"})).unwrap(),
            Record::from_value(json!({"country": "FR", "city": null})).unwrap(),
            Record::from_value(json!({"country": 7})).unwrap(),
        ];
        let out: Vec<Vec<String>> = grouper
            .group_batch(stream_of(records))
            .map(|r| r.unwrap().group_membership)
            .collect();
        assert_eq!(
            out,
            vec![
                vec!["ES".to_string(), "Madrid".to_string()],
                vec!["FR".to_string(), "unknown".to_string()],
                vec!["7".to_string(), "unknown".to_string()],
            ]
        );
    }

    #[test]
    fn test_no_grouping_clears_membership() {
        let record = Record::from_value(json!({"a": 1}))
            .unwrap()
            .with_group_membership(vec!["x".into()]);
        let out: Vec<Record> = NoGrouping
            .group_batch(stream_of(vec![record]))
            .collect::<Result<_>>()
            .unwrap();
        assert!(out[0].group_membership.is_empty());
    }
}

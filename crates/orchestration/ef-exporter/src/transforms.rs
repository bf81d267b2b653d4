//! Built-in transforms.

use ef_error::Result;
use ef_traits::{RecordStream, Transform};
use ef_types::{OptionKind, OptionSpec, Record};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Passes records through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTransform;

impl NoTransform {
    pub const OPTIONS: &'static [OptionSpec] = &[];

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        ef_types::resolve_options("transforms.no_transform", Self::OPTIONS, options)?;
        Ok(Self)
    }
}

impl Transform for NoTransform {
    fn transform_batch<'a>(&'a self, records: RecordStream<'a>) -> RecordStream<'a> {
        records
    }

    fn name(&self) -> &str {
        "no_transform"
    }
}

#[derive(Debug, Deserialize)]
struct ProjectOptions {
    fields: Vec<String>,
    include_missing: bool,
}

/// Keeps only the listed fields, in the listed order.
///
/// With `include_missing`, absent fields are emitted as `null`.
#[derive(Debug, Clone)]
pub struct ProjectTransform {
    fields: Vec<String>,
    include_missing: bool,
}

impl ProjectTransform {
    pub const OPTIONS: &'static [OptionSpec] = &[
        OptionSpec::required("fields", OptionKind::List),
        OptionSpec::required("include_missing", OptionKind::Boolean).with_default("false"),
    ];

    pub fn new(fields: Vec<String>, include_missing: bool) -> Self {
        Self {
            fields,
            include_missing,
        }
    }

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let opts: ProjectOptions =
            ef_types::parse_options("transforms.project", Self::OPTIONS, options)?;
        Ok(Self::new(opts.fields, opts.include_missing))
    }

    fn project(&self, record: Record) -> Record {
        let membership = record.group_membership.clone();
        let mut source = record.into_fields();
        let mut projected = Map::new();
        for field in &self.fields {
            match source.remove(field) {
                Some(value) => {
                    projected.insert(field.clone(), value);
                }
                None if self.include_missing => {
                    projected.insert(field.clone(), Value::Null);
                }
                None => {}
            }
        }
        Record::new(projected).with_group_membership(membership)
    }
}

impl Transform for ProjectTransform {
    fn transform_batch<'a>(&'a self, records: RecordStream<'a>) -> RecordStream<'a> {
        Box::new(records.map(move |item| item.map(|record| self.project(record))))
    }

    fn name(&self) -> &str {
        "project"
    }
}

//! CSV formatter with a fixed column order.

use ef_error::{ExportError, Result};
use ef_traits::Formatter;
use ef_types::{value_to_text, OptionKind, OptionSpec, Record};
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
struct CsvOptions {
    fields: Vec<String>,
    show_titles: bool,
    delimiter: String,
}

/// Writes the configured `fields` of each record as one CSV row.
///
/// Missing fields produce empty cells. Non-scalar values are written as
/// their JSON text.
#[derive(Debug, Clone)]
pub struct CsvFormatter {
    fields: Vec<String>,
    show_titles: bool,
    delimiter: u8,
}

impl CsvFormatter {
    pub const OPTIONS: &'static [OptionSpec] = &[
        OptionSpec::required("fields", OptionKind::List),
        OptionSpec::required("show_titles", OptionKind::Boolean).with_default("true"),
        OptionSpec::required("delimiter", OptionKind::String).with_default("\",\""),
    ];

    pub fn new(fields: Vec<String>, show_titles: bool, delimiter: u8) -> Result<Self> {
        if fields.is_empty() {
            return Err(ExportError::config("csv formatter requires at least one field"));
        }
        Ok(Self {
            fields,
            show_titles,
            delimiter,
        })
    }

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let opts: CsvOptions = ef_types::parse_options("formatters.csv", Self::OPTIONS, options)?;
        let delimiter = match opts.delimiter.as_bytes() {
            [byte] => *byte,
            _ => {
                return Err(ExportError::config(format!(
                    "csv delimiter must be a single byte, got '{}'",
                    opts.delimiter
                )))
            }
        };
        Self::new(opts.fields, opts.show_titles, delimiter)
    }

    fn write_row<I, S>(&self, cells: I) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        writer
            .write_record(cells)
            .map_err(|e| ExportError::Format(format!("csv: {e}")))?;
        let mut bytes = writer
            .into_inner()
            .map_err(|e| ExportError::Format(format!("csv: {e}")))?;
        if bytes.last() == Some(&b'\n') {
            bytes.pop();
        }
        Ok(bytes)
    }
}

impl Formatter for CsvFormatter {
    fn format(&self, record: &Record) -> Result<Vec<u8>> {
        let cells: Vec<String> = self
            .fields
            .iter()
            .map(|f| record.get(f).map(value_to_text).unwrap_or_default())
            .collect();
        self.write_row(&cells)
    }

    fn format_header(&self) -> Vec<u8> {
        if !self.show_titles {
            return Vec::new();
        }
        match self.write_row(&self.fields) {
            Ok(mut row) => {
                row.push(b'\n');
                row
            }
            Err(_) => Vec::new(),
        }
    }

    fn file_extension(&self) -> &str {
        "csv"
    }

    fn name(&self) -> &str {
        "csv"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn formatter(show_titles: bool) -> CsvFormatter {
        let options = json!({"fields": ["name", "city"], "show_titles": show_titles})
            .as_object()
            .cloned()
            .unwrap();
        CsvFormatter::from_options(&options).unwrap()
    }

    #[test]
    fn test_round_trip_flat_strings() {
        let formatter = formatter(true);
        let records = vec![
            Record::from_value(json!({"name": "Ana", "city": "Madrid"})).unwrap(),
            Record::from_value(json!({"name": "Jean, Jr.", "city": "Pa\"ris"})).unwrap(),
        ];

        let mut file = formatter.format_header();
        for (i, record) in records.iter().enumerate() {
            if i > 0 {
                file.extend_from_slice(formatter.item_separator());
            }
            file.extend(formatter.format(record).unwrap());
        }

        let mut reader = csv::Reader::from_reader(file.as_slice());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), vec!["name", "city"]);

        let parsed: Vec<Record> = reader
            .records()
            .map(|row| {
                let row = row.unwrap();
                let fields = headers
                    .iter()
                    .zip(row.iter())
                    .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                    .collect::<Map<_, _>>();
                Record::new(fields)
            })
            .collect();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].fields(), records[0].fields());
        assert_eq!(parsed[1].fields(), records[1].fields());
    }

    #[test]
    fn test_missing_fields_are_empty() {
        let formatter = formatter(false);
        assert!(formatter.format_header().is_empty());
        let record = Record::from_value(json!({"name": "Ana", "age": 3})).unwrap();
        assert_eq!(formatter.format(&record).unwrap(), b"Ana,".to_vec());
    }

    #[test]
    fn test_fields_required() {
        assert!(CsvFormatter::from_options(&Map::new()).is_err());
    }

    #[test]
    fn test_bad_delimiter() {
        let options = json!({"fields": ["a"], "delimiter": ";;"}).as_object().cloned().unwrap();
        assert!(CsvFormatter::from_options(&options).is_err());
    }
}

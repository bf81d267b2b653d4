//! Formatter trait: record serialization and file framing.

use crate::RecordStream;
use ef_error::Result;
use ef_types::Record;

/// Trait for record formatters.
///
/// A file produced with a formatter is laid out as
/// `header, item, separator, item, ..., item, footer`.
pub trait Formatter: Send + Sync {
    /// Serializes one record.
    fn format(&self, record: &Record) -> Result<Vec<u8>>;

    /// Bytes written once at the start of every file.
    fn format_header(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Bytes written once at the end of every file.
    fn format_footer(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Bytes written between consecutive records of the same file.
    fn item_separator(&self) -> &[u8] {
        b"\n"
    }

    /// Extension of the produced files, without a leading dot.
    fn file_extension(&self) -> &str;

    fn name(&self) -> &str {
        "formatter"
    }
}

/// Sets `formatted` on every record of a stream.
pub fn format_batch<'a>(formatter: &'a dyn Formatter, records: RecordStream<'a>) -> RecordStream<'a> {
    Box::new(records.map(move |item| {
        let mut record = item?;
        record.formatted = Some(formatter.format(&record)?);
        Ok(record)
    }))
}

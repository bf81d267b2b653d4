//! Grouper trait.

use crate::RecordStream;

/// Trait for groupers.
///
/// Must set `group_membership` on every record it yields. An empty
/// membership means the record is ungrouped.
pub trait Grouper: Send + Sync {
    fn group_batch<'a>(&'a self, records: RecordStream<'a>) -> RecordStream<'a>;

    fn name(&self) -> &str {
        "grouper"
    }
}

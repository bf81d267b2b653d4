//! Transform trait for record processing.

use crate::RecordStream;

/// Trait for record transformations.
///
/// A transform may mutate, replace, drop or expand records (1:N). It must
/// stay lazy: records are pulled one by one by the next stage.
pub trait Transform: Send + Sync {
    /// Applies the transform to a stream of records.
    fn transform_batch<'a>(&'a self, records: RecordStream<'a>) -> RecordStream<'a>;

    /// Returns the name of this transform for logging.
    fn name(&self) -> &str {
        "transform"
    }
}

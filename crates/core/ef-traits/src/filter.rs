//! Record filters and the counting filter stage.

use crate::RecordStream;
use ef_types::Record;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// How often the filter stage logs progress.
pub const FILTER_LOG_EVERY: u64 = 1000;

/// Trait for record predicates.
pub trait Filter: Send + Sync {
    /// Returns true to keep the record.
    fn filter(&self, record: &Record) -> bool;

    /// Returns the name of this filter for logging.
    fn name(&self) -> &str {
        "filter"
    }
}

/// Applies a [`Filter`] to a record stream, counting kept and dropped records.
pub struct FilterStage {
    filter: Box<dyn Filter>,
    filtered_out: AtomicU64,
    total: AtomicU64,
}

impl FilterStage {
    pub fn new(filter: Box<dyn Filter>) -> Self {
        Self {
            filter,
            filtered_out: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        self.filter.name()
    }

    /// Records dropped so far.
    pub fn filtered_out(&self) -> u64 {
        self.filtered_out.load(Ordering::Relaxed)
    }

    /// Records seen so far.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Lazily filters a stream. Errors pass through untouched.
    pub fn filter_batch<'a>(&'a self, records: RecordStream<'a>) -> RecordStream<'a> {
        Box::new(records.filter(move |item| {
            let Ok(record) = item else {
                return true;
            };
            let total = self.total.fetch_add(1, Ordering::Relaxed) + 1;
            let keep = self.filter.filter(record);
            if !keep {
                self.filtered_out.fetch_add(1, Ordering::Relaxed);
            }
            if total % FILTER_LOG_EVERY == 0 {
                info!(
                    filter = self.filter.name(),
                    filtered_out = self.filtered_out(),
                    total,
                    "Filtered records"
                );
            }
            keep
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_of;
    use serde_json::json;

    struct EvenIds;

    impl Filter for EvenIds {
        fn filter(&self, record: &Record) -> bool {
            record.get("id").and_then(|v| v.as_u64()).is_some_and(|id| id % 2 == 0)
        }
    }

    fn records(n: u64) -> Vec<Record> {
        (0..n)
            .map(|id| Record::from_value(json!({ "id": id })).unwrap())
            .collect()
    }

    #[test]
    fn test_filter_batch_counts() {
        let stage = FilterStage::new(Box::new(EvenIds));
        let kept: Vec<_> = stage
            .filter_batch(stream_of(records(10)))
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(kept.len(), 5);
        assert_eq!(stage.total(), 10);
        assert_eq!(stage.filtered_out(), 5);
    }

    #[test]
    fn test_counters_accumulate_across_batches() {
        let stage = FilterStage::new(Box::new(EvenIds));
        for _ in 0..3 {
            let _ = stage.filter_batch(stream_of(records(4))).count();
        }
        assert_eq!(stage.total(), 12);
        assert_eq!(stage.filtered_out(), 6);
    }
}

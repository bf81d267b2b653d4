//! End-of-run statistics reporting.

use ef_error::Result;
use ef_types::{Metadata, OptionSpec};
use serde_json::{Map, Value};
use tracing::info;

/// Reports the final metadata of a run.
pub trait StatsManager: Send + Sync {
    fn report(&self, metadata: &Metadata);

    fn name(&self) -> &str;
}

/// Logs the metadata snapshot at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicStats;

impl BasicStats {
    pub const OPTIONS: &'static [OptionSpec] = &[];

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        ef_types::resolve_options("stats.basic", Self::OPTIONS, options)?;
        Ok(Self)
    }
}

impl StatsManager for BasicStats {
    fn report(&self, metadata: &Metadata) {
        let snapshot = metadata.snapshot();
        info!(
            elapsed_time = metadata.elapsed_seconds(),
            bypassed_pipeline = metadata.bypassed_pipeline(),
            accurate_items_count = metadata.accurate_items_count(),
            modules = %snapshot["modules"],
            "Export stats"
        );
    }

    fn name(&self) -> &str {
        "basic"
    }
}

/// Reports nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStats;

impl NoStats {
    pub const OPTIONS: &'static [OptionSpec] = &[];

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        ef_types::resolve_options("stats.none", Self::OPTIONS, options)?;
        Ok(Self)
    }
}

impl StatsManager for NoStats {
    fn report(&self, _metadata: &Metadata) {}

    fn name(&self) -> &str {
        "none"
    }
}

//! Reader producing synthetic records.

use async_trait::async_trait;
use ef_error::{ExportError, Result};
use ef_traits::Reader;
use ef_types::{OptionKind, OptionSpec, Record};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

const COUNTRIES: &[(&str, &[&str])] = &[
    ("es", &["Madrid", "Valencia", "Barcelona"]),
    ("fr", &["Paris", "Lyon"]),
    ("uk", &["London", "Leeds", "York"]),
    ("us", &["Boston", "Denver"]),
];

#[derive(Debug, Deserialize)]
struct RandomReaderOptions {
    number_of_items: u64,
    batch_size: u64,
    seed: Option<u64>,
}

/// Emits `number_of_items` random records in batches of `batch_size`.
///
/// The position is the number of records emitted so far. With a `seed`,
/// runs with the same batch size produce the same records.
pub struct RandomReader {
    number_of_items: u64,
    batch_size: u64,
    seed: Option<u64>,
    emitted: u64,
}

impl RandomReader {
    pub const OPTIONS: &'static [OptionSpec] = &[
        OptionSpec::required("number_of_items", OptionKind::Integer).with_default("5000"),
        OptionSpec::required("batch_size", OptionKind::Integer).with_default("100"),
        OptionSpec::optional("seed", OptionKind::Integer),
    ];

    pub fn new(number_of_items: u64, batch_size: u64) -> Self {
        Self {
            number_of_items,
            batch_size: batch_size.max(1),
            seed: None,
            emitted: 0,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let opts: RandomReaderOptions =
            ef_types::parse_options("readers.random", Self::OPTIONS, options)?;
        if opts.batch_size == 0 {
            return Err(ExportError::config("readers.random batch_size must be > 0"));
        }
        let reader = Self::new(opts.number_of_items, opts.batch_size);
        Ok(match opts.seed {
            Some(seed) => reader.with_seed(seed),
            None => reader,
        })
    }

    fn record(&self, n: u64, rng: &mut StdRng) -> Record {
        let (country, cities) = COUNTRIES.choose(rng).copied().unwrap_or(COUNTRIES[0]);
        let city = cities.choose(rng).copied().unwrap_or("Madrid");
        let mut record = Record::default();
        record.insert("id", json!(n));
        record.insert("key", json!(format!("{:016x}", rng.random::<u64>())));
        record.insert("country_code", json!(country));
        record.insert("city", json!(city));
        record.insert("value", json!(rng.random_range(0..1000)));
        record
    }
}

#[async_trait]
impl Reader for RandomReader {
    async fn get_next_batch(&mut self) -> Result<Vec<Record>> {
        let end = (self.emitted + self.batch_size).min(self.number_of_items);
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(self.emitted)),
            None => StdRng::from_os_rng(),
        };
        let batch: Vec<Record> = (self.emitted..end).map(|n| self.record(n, &mut rng)).collect();
        self.emitted = end;
        debug!(emitted = self.emitted, total = self.number_of_items, "Random batch");
        Ok(batch)
    }

    fn is_finished(&self) -> bool {
        self.emitted >= self.number_of_items
    }

    fn get_last_position(&self) -> Value {
        json!(self.emitted)
    }

    fn set_last_position(&mut self, position: Option<Value>) -> Result<()> {
        self.emitted = match position {
            None | Some(Value::Null) => 0,
            Some(value) => value.as_u64().ok_or_else(|| {
                ExportError::reader(format!("invalid random reader position {value}"))
            })?,
        };
        Ok(())
    }
}

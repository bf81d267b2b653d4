//! Plugin registry: maps configured names to factories, per role.

use crate::filters::{KeyValueFilter, NoFilter};
use crate::groupers::{KeysGrouper, NoGrouping};
use crate::notifiers::{LogNotifier, WebhookNotifier};
use crate::persistence::{FileBackend, JobStore, MemoryBackend, NoneBackend, SqliteBackend};
use crate::stats::{BasicStats, NoStats, StatsManager};
use crate::transforms::{NoTransform, ProjectTransform};
use ef_error::{ExportError, Result};
use ef_formatters::{CsvFormatter, JsonArrayFormatter, JsonLinesFormatter, XmlFormatter};
use ef_readers::{FsReader, RandomReader, S3Reader};
use ef_traits::{Filter, Formatter, Grouper, Notifier, Persistence, Reader, Transform, Writer};
use ef_types::{ModuleConfig, OptionSpec};
use ef_writers::{
    AzureBlobWriter, AzureFileWriter, ConsoleWriter, FsWriter, S3Writer, WriterOptions,
    GENERIC_WRITER_OPTIONS,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const NO_FILTER: &str = "no_filter";
pub const NO_TRANSFORM: &str = "no_transform";
pub const NO_GROUPING: &str = "no_grouping";
pub const DEFAULT_FORMATTER: &str = "json_lines";
pub const DEFAULT_PERSISTENCE: &str = "none";
pub const DEFAULT_STATS: &str = "basic";

/// Builds a plugin from its raw options.
pub type Factory<T> = Arc<dyn Fn(&Map<String, Value>) -> Result<T> + Send + Sync>;

/// Optional behaviours a plugin advertises before it is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Reader implements `get_read_streams` / `open_read_stream`
    pub read_streams: bool,
    /// Writer implements `write_stream`
    pub write_stream: bool,
}

impl Capabilities {
    pub const NONE: Self = Self {
        read_streams: false,
        write_stream: false,
    };
    pub const READ_STREAMS: Self = Self {
        read_streams: true,
        write_stream: false,
    };
    pub const WRITE_STREAM: Self = Self {
        read_streams: false,
        write_stream: true,
    };
}

/// A registered plugin.
pub struct PluginEntry<T> {
    pub options: &'static [OptionSpec],
    pub capabilities: Capabilities,
    factory: Factory<T>,
}

impl<T> PluginEntry<T> {
    pub fn create(&self, options: &Map<String, Value>) -> Result<T> {
        (self.factory)(options)
    }
}

/// Strips the role prefix from a plugin name: `readers.random` → `random`.
pub fn normalize_name<'a>(role: &str, name: &'a str) -> &'a str {
    name.strip_prefix(role)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(name)
}

/// The plugins of one role.
pub struct Plugins<T> {
    role: &'static str,
    entries: BTreeMap<String, PluginEntry<T>>,
}

impl<T> Plugins<T> {
    pub fn new(role: &'static str) -> Self {
        Self {
            role,
            entries: BTreeMap::new(),
        }
    }

    pub fn role(&self) -> &'static str {
        self.role
    }

    /// Registers (or replaces) a plugin under its short name.
    pub fn register<F>(
        &mut self,
        name: &str,
        options: &'static [OptionSpec],
        capabilities: Capabilities,
        factory: F,
    ) where
        F: Fn(&Map<String, Value>) -> Result<T> + Send + Sync + 'static,
    {
        self.entries.insert(
            normalize_name(self.role, name).to_string(),
            PluginEntry {
                options,
                capabilities,
                factory: Arc::new(factory),
            },
        );
    }

    /// Looks a plugin up by short or dotted name.
    pub fn get(&self, name: &str) -> Result<&PluginEntry<T>> {
        self.entries
            .get(normalize_name(self.role, name))
            .ok_or_else(|| {
                ExportError::config(format!(
                    "unknown {} plugin '{name}' (available: {})",
                    self.role,
                    self.names().collect::<Vec<_>>().join(", ")
                ))
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(normalize_name(self.role, name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn create(&self, module: &ModuleConfig) -> Result<T> {
        self.get(&module.name)?.create(&module.options)
    }

    /// Creates the configured plugin, or `default` when none is configured.
    pub fn create_or(&self, module: Option<&ModuleConfig>, default: &str) -> Result<T> {
        match module {
            Some(module) => self.create(module),
            None => self.get(default)?.create(&Map::new()),
        }
    }
}

/// Factories for every plugin role.
pub struct Registry {
    pub readers: Plugins<Box<dyn Reader>>,
    /// Writer factories receive only the writer-specific options
    pub writers: Plugins<Box<dyn Writer>>,
    pub filters: Plugins<Box<dyn Filter>>,
    pub transforms: Plugins<Box<dyn Transform>>,
    pub groupers: Plugins<Box<dyn Grouper>>,
    pub formatters: Plugins<Arc<dyn Formatter>>,
    pub persistence: Plugins<Box<dyn Persistence>>,
    pub notifiers: Plugins<Box<dyn Notifier>>,
    pub stats: Plugins<Box<dyn StatsManager>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl Registry {
    /// A registry without any plugin.
    pub fn empty() -> Self {
        Self {
            readers: Plugins::new("readers"),
            writers: Plugins::new("writers"),
            filters: Plugins::new("filters"),
            transforms: Plugins::new("transforms"),
            groupers: Plugins::new("groupers"),
            formatters: Plugins::new("formatters"),
            persistence: Plugins::new("persistence"),
            notifiers: Plugins::new("notifications"),
            stats: Plugins::new("stats"),
        }
    }

    /// A registry with every built-in plugin.
    pub fn with_builtins() -> Self {
        let mut r = Self::empty();

        r.readers.register("random", RandomReader::OPTIONS, Capabilities::NONE, |o| {
            Ok(Box::new(RandomReader::from_options(o)?))
        });
        r.readers.register("fs", FsReader::OPTIONS, Capabilities::READ_STREAMS, |o| {
            Ok(Box::new(FsReader::from_options(o)?))
        });
        r.readers.register("s3", S3Reader::OPTIONS, Capabilities::READ_STREAMS, |o| {
            Ok(Box::new(S3Reader::from_options(o)?))
        });

        r.writers.register("console", ConsoleWriter::OPTIONS, Capabilities::NONE, |o| {
            Ok(Box::new(ConsoleWriter::from_options(o)?))
        });
        r.writers.register("fs", FsWriter::OPTIONS, Capabilities::WRITE_STREAM, |o| {
            Ok(Box::new(FsWriter::from_options(o)?))
        });
        r.writers.register("s3", S3Writer::OPTIONS, Capabilities::WRITE_STREAM, |o| {
            Ok(Box::new(S3Writer::from_options(o)?))
        });
        r.writers.register("azure_blob", AzureBlobWriter::OPTIONS, Capabilities::NONE, |o| {
            Ok(Box::new(AzureBlobWriter::from_options(o)?))
        });
        r.writers.register("azure_file", AzureFileWriter::OPTIONS, Capabilities::NONE, |o| {
            Ok(Box::new(AzureFileWriter::from_options(o)?))
        });

        r.filters.register(NO_FILTER, NoFilter::OPTIONS, Capabilities::NONE, |o| {
            Ok(Box::new(NoFilter::from_options(o)?))
        });
        r.filters.register("key_value", KeyValueFilter::OPTIONS, Capabilities::NONE, |o| {
            Ok(Box::new(KeyValueFilter::from_options(o)?))
        });

        r.transforms.register(NO_TRANSFORM, NoTransform::OPTIONS, Capabilities::NONE, |o| {
            Ok(Box::new(NoTransform::from_options(o)?))
        });
        r.transforms.register("project", ProjectTransform::OPTIONS, Capabilities::NONE, |o| {
            Ok(Box::new(ProjectTransform::from_options(o)?))
        });

        r.groupers.register(NO_GROUPING, NoGrouping::OPTIONS, Capabilities::NONE, |o| {
            Ok(Box::new(NoGrouping::from_options(o)?))
        });
        r.groupers.register("keys", KeysGrouper::OPTIONS, Capabilities::NONE, |o| {
            Ok(Box::new(KeysGrouper::from_options(o)?))
        });

        r.formatters.register(DEFAULT_FORMATTER, JsonLinesFormatter::OPTIONS, Capabilities::NONE, |o| {
            Ok(Arc::new(JsonLinesFormatter::from_options(o)?))
        });
        r.formatters.register("json", JsonArrayFormatter::OPTIONS, Capabilities::NONE, |o| {
            Ok(Arc::new(JsonArrayFormatter::from_options(o)?))
        });
        r.formatters.register("csv", CsvFormatter::OPTIONS, Capabilities::NONE, |o| {
            Ok(Arc::new(CsvFormatter::from_options(o)?))
        });
        r.formatters.register("xml", XmlFormatter::OPTIONS, Capabilities::NONE, |o| {
            Ok(Arc::new(XmlFormatter::from_options(o)?))
        });

        r.persistence.register(DEFAULT_PERSISTENCE, NoneBackend::OPTIONS, Capabilities::NONE, |o| {
            Ok(Box::new(JobStore::new(NoneBackend::from_options(o)?)))
        });
        r.persistence.register("memory", MemoryBackend::OPTIONS, Capabilities::NONE, |o| {
            Ok(Box::new(JobStore::new(MemoryBackend::from_options(o)?)))
        });
        r.persistence.register("file", FileBackend::OPTIONS, Capabilities::NONE, |o| {
            Ok(Box::new(JobStore::new(FileBackend::from_options(o)?)))
        });
        r.persistence.register("sqlite", SqliteBackend::OPTIONS, Capabilities::NONE, |o| {
            Ok(Box::new(JobStore::new(SqliteBackend::from_options(o)?)))
        });

        r.notifiers.register("log", LogNotifier::OPTIONS, Capabilities::NONE, |o| {
            Ok(Box::new(LogNotifier::from_options(o)?))
        });
        r.notifiers.register("webhook", WebhookNotifier::OPTIONS, Capabilities::NONE, |o| {
            Ok(Box::new(WebhookNotifier::from_options(o)?))
        });

        r.stats.register(DEFAULT_STATS, BasicStats::OPTIONS, Capabilities::NONE, |o| {
            Ok(Box::new(BasicStats::from_options(o)?))
        });
        r.stats.register("none", NoStats::OPTIONS, Capabilities::NONE, |o| {
            Ok(Box::new(NoStats::from_options(o)?))
        });

        r
    }

    /// Builds a writer, splitting off the generic writer options.
    pub fn create_writer(&self, module: &ModuleConfig) -> Result<(Box<dyn Writer>, WriterOptions)> {
        let entry = self.writers.get(&module.name)?;
        let qualified = format!("writers.{}", normalize_name("writers", &module.name));
        let (options, specific) = WriterOptions::split(&qualified, &module.options)?;
        Ok((entry.create(&specific)?, options))
    }

    /// Every option a writer accepts: the generic ones plus its own.
    pub fn writer_options(&self, name: &str) -> Result<Vec<OptionSpec>> {
        let entry = self.writers.get(name)?;
        Ok(GENERIC_WRITER_OPTIONS
            .iter()
            .chain(entry.options)
            .copied()
            .collect())
    }

    /// Builds the configured formatter, JSON lines by default.
    pub fn create_formatter(&self, module: Option<&ModuleConfig>) -> Result<Arc<dyn Formatter>> {
        if let Some(module) = module {
            if normalize_name("formatters", &module.name).eq_ignore_ascii_case("avro") {
                return Err(ExportError::config(format!(
                    "formatter '{}' is not supported: AVRO output is not implemented; \
                     use json_lines, json, csv or xml",
                    module.name
                )));
            }
        }
        self.formatters.create_or(module, DEFAULT_FORMATTER)
    }
}

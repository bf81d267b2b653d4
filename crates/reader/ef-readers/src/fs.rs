//! Filesystem JSON-lines reader.

use crate::lines::{JsonLinesReader, UnitSource};
use async_trait::async_trait;
use ef_error::{ExportError, Result};
use ef_traits::{ByteStream, StreamInfo};
use ef_types::{OptionKind, OptionSpec};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct FsReaderOptions {
    input_dir: PathBuf,
    pattern: Option<String>,
    batch_size: usize,
}

/// Files under a directory, named by their path relative to it.
#[derive(Debug, Clone)]
pub struct FsSource {
    input_dir: PathBuf,
    pattern: Option<Regex>,
}

impl FsSource {
    pub fn new(input_dir: impl Into<PathBuf>, pattern: Option<Regex>) -> Self {
        Self {
            input_dir: input_dir.into(),
            pattern,
        }
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }
}

fn walk(root: &Path) -> std::io::Result<Vec<(String, u64)>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let relative = path.strip_prefix(root).unwrap_or(&path);
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                found.push((name, entry.metadata()?.len()));
            }
        }
    }
    Ok(found)
}

#[async_trait]
impl UnitSource for FsSource {
    const POSITION_KEY: &'static str = "file";

    async fn list_units(&self) -> Result<Vec<StreamInfo>> {
        let root = self.input_dir.clone();
        let files = tokio::task::spawn_blocking(move || walk(&root))
            .await
            .map_err(|e| ExportError::reader(format!("listing task failed: {e}")))?
            .map_err(|e| {
                ExportError::reader(format!(
                    "cannot list {}: {e}",
                    self.input_dir.display()
                ))
            })?;

        Ok(files
            .into_iter()
            .filter(|(name, _)| self.pattern.as_ref().map_or(true, |re| re.is_match(name)))
            .map(|(filename, size)| StreamInfo {
                filename,
                size: Some(size),
            })
            .collect())
    }

    async fn open_unit(&self, name: &str) -> Result<ByteStream> {
        let path = self.input_dir.join(name);
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| ExportError::reader(format!("cannot open {}: {e}", path.display())))?;
        Ok(Box::pin(file))
    }
}

/// Reads JSON-lines files (optionally `.gz`) under `input_dir`.
///
/// Position: `{file, line}`.
pub type FsReader = JsonLinesReader<FsSource>;

impl FsReader {
    pub const OPTIONS: &'static [OptionSpec] = &[
        OptionSpec::required("input_dir", OptionKind::String),
        OptionSpec::optional("pattern", OptionKind::String),
        OptionSpec::required("batch_size", OptionKind::Integer).with_default("10000"),
    ];

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let opts: FsReaderOptions = ef_types::parse_options("readers.fs", Self::OPTIONS, options)?;
        let pattern = opts
            .pattern
            .map(|p| {
                Regex::new(&p)
                    .map_err(|e| ExportError::config(format!("invalid pattern '{p}': {e}")))
            })
            .transpose()?;
        Ok(JsonLinesReader::new(
            FsSource::new(opts.input_dir, pattern),
            opts.batch_size,
        ))
    }
}

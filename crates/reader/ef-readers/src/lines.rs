//! JSON-lines reader over a list of named byte sources.

use async_compression::tokio::bufread::GzipDecoder;
use async_trait::async_trait;
use ef_error::{ExportError, Result};
use ef_traits::{ByteStream, ReadStream, Reader, StreamInfo};
use ef_types::Record;
use serde_json::{json, Value};
use std::collections::VecDeque;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, info};

/// A listable collection of raw input units (files, objects).
#[async_trait]
pub trait UnitSource: Send + Sync {
    /// Name of the unit field in positions (`file`, `key`).
    const POSITION_KEY: &'static str;

    /// Lists every unit to read. Order does not matter.
    async fn list_units(&self) -> Result<Vec<StreamInfo>>;

    /// Opens a unit as raw bytes, without decompression.
    async fn open_unit(&self, name: &str) -> Result<ByteStream>;
}

struct OpenUnit {
    name: String,
    lines: Lines<BufReader<ByteStream>>,
    line: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LinePosition {
    unit: String,
    line: u64,
}

/// Reads units in name order, one JSON record per non-blank line.
///
/// Units ending in `.gz` are decompressed transparently. The position is
/// `{<POSITION_KEY>: unit, line: lines consumed}`; on resume, units sorted
/// before the position's unit are skipped and its first `line` lines are
/// discarded.
pub struct JsonLinesReader<S> {
    source: S,
    batch_size: usize,
    units: Option<VecDeque<String>>,
    current: Option<OpenUnit>,
    position: Option<LinePosition>,
    finished: bool,
}

impl<S: UnitSource> JsonLinesReader<S> {
    pub fn new(source: S, batch_size: usize) -> Self {
        Self {
            source,
            batch_size: batch_size.max(1),
            units: None,
            current: None,
            position: None,
            finished: false,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    async fn sorted_units(&self) -> Result<Vec<StreamInfo>> {
        let mut units = self.source.list_units().await?;
        units.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(units)
    }

    async fn ensure_units(&mut self) -> Result<()> {
        if self.units.is_some() {
            return Ok(());
        }
        let mut names: Vec<String> = self
            .sorted_units()
            .await?
            .into_iter()
            .map(|u| u.filename)
            .collect();
        if let Some(pos) = &self.position {
            names.retain(|n| n.as_str() >= pos.unit.as_str());
        }
        info!(units = names.len(), "Listed input units");
        self.units = Some(names.into());
        Ok(())
    }

    async fn open_next(&mut self) -> Result<bool> {
        let Some(name) = self.units.as_mut().and_then(VecDeque::pop_front) else {
            return Ok(false);
        };

        let raw = self.source.open_unit(&name).await?;
        let stream: ByteStream = if name.ends_with(".gz") {
            let mut decoder = GzipDecoder::new(BufReader::new(raw));
            decoder.multiple_members(true);
            Box::pin(decoder)
        } else {
            raw
        };
        let mut lines = BufReader::new(stream).lines();

        let mut line = 0;
        if let Some(pos) = self.position.as_ref().filter(|p| p.unit == name) {
            while line < pos.line {
                if read_line(&mut lines, &name, line).await?.is_none() {
                    break;
                }
                line += 1;
            }
            debug!(unit = %name, skipped = line, "Resumed inside unit");
        }

        self.current = Some(OpenUnit { name, lines, line });
        Ok(true)
    }
}

async fn read_line(
    lines: &mut Lines<BufReader<ByteStream>>,
    unit: &str,
    line: u64,
) -> Result<Option<String>> {
    lines
        .next_line()
        .await
        .map_err(|e| ExportError::reader(format!("{unit}:{}: {e}", line + 1)))
}

#[async_trait]
impl<S: UnitSource> Reader for JsonLinesReader<S> {
    async fn get_next_batch(&mut self) -> Result<Vec<Record>> {
        self.ensure_units().await?;
        let mut batch = Vec::with_capacity(self.batch_size);

        while batch.len() < self.batch_size {
            if self.current.is_none() && !self.open_next().await? {
                self.finished = true;
                break;
            }
            let Some(current) = self.current.as_mut() else {
                break;
            };

            match read_line(&mut current.lines, &current.name, current.line).await? {
                Some(text) => {
                    current.line += 1;
                    if text.trim().is_empty() {
                        continue;
                    }
                    let record = Record::from_json_slice(text.as_bytes()).map_err(|e| {
                        ExportError::reader(format!("{}:{}: {e}", current.name, current.line))
                    })?;
                    batch.push(record);
                }
                None => {
                    self.position = Some(LinePosition {
                        unit: current.name.clone(),
                        line: current.line,
                    });
                    self.current = None;
                }
            }
        }

        Ok(batch)
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn get_last_position(&self) -> Value {
        let (unit, line) = match (&self.current, &self.position) {
            (Some(current), _) => (current.name.as_str(), current.line),
            (None, Some(pos)) => (pos.unit.as_str(), pos.line),
            (None, None) => return Value::Null,
        };
        let mut position = serde_json::Map::new();
        position.insert(S::POSITION_KEY.to_string(), json!(unit));
        position.insert("line".to_string(), json!(line));
        Value::Object(position)
    }

    fn set_last_position(&mut self, position: Option<Value>) -> Result<()> {
        self.units = None;
        self.current = None;
        self.finished = false;
        self.position = match position {
            None | Some(Value::Null) => None,
            Some(value) => {
                let unit = value.get(S::POSITION_KEY).and_then(Value::as_str);
                let line = value.get("line").and_then(Value::as_u64);
                match (unit, line) {
                    (Some(unit), Some(line)) => Some(LinePosition {
                        unit: unit.to_string(),
                        line,
                    }),
                    _ => {
                        return Err(ExportError::reader(format!(
                            "invalid position {value}, expected {{{}, line}}",
                            S::POSITION_KEY
                        )))
                    }
                }
            }
        };
        Ok(())
    }

    fn supports_read_streams(&self) -> bool {
        true
    }

    async fn get_read_streams(&mut self) -> Result<Vec<StreamInfo>> {
        self.sorted_units().await
    }

    async fn open_read_stream(&mut self, info: &StreamInfo) -> Result<ReadStream> {
        Ok(ReadStream {
            info: info.clone(),
            reader: self.source.open_unit(&info.filename).await?,
        })
    }
}

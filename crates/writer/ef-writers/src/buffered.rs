//! The generic buffered writer.

use crate::options::{WriteBufferKind, WriterOptions};
use ef_buffer::{
    FilesTracker, GroupingBufferFilesTracker, RandomTokens, ReservoirSamplingTracker, WriteBuffer,
    WriteBufferOptions,
};
use ef_error::Result;
use ef_traits::{Formatter, RecordStream, Writer};
use ef_types::Metadata;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Metadata module the writer reports under.
pub const WRITER_MODULE: &str = "writer";

/// Result of [`BufferedWriter::write_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// All records were buffered
    Continue,
    /// `items_limit` records have been buffered; the job should end
    LimitReached,
}

/// Buffers formatted records per group and hands packed files to a
/// destination [`Writer`].
///
/// Reports `items_count` and `written_files` under the `writer` metadata
/// module.
pub struct BufferedWriter {
    writer: Box<dyn Writer>,
    buffer: WriteBuffer,
    options: WriterOptions,
    metadata: Metadata,
    items_count: u64,
    written_files: u64,
}

impl BufferedWriter {
    pub fn new(
        writer: Box<dyn Writer>,
        formatter: Arc<dyn Formatter>,
        options: WriterOptions,
        metadata: Metadata,
    ) -> Result<Self> {
        Self::with_tokens(writer, formatter, options, metadata, RandomTokens::new())
    }

    /// Writer whose path-unsafe group keys map to tokens from `tokens`.
    pub fn with_tokens(
        writer: Box<dyn Writer>,
        formatter: Arc<dyn Formatter>,
        mut options: WriterOptions,
        metadata: Metadata,
        tokens: RandomTokens,
    ) -> Result<Self> {
        if let Some(compression) = writer.compression_override() {
            options.compression = compression;
        }

        let tracker: Box<dyn FilesTracker> = match options.write_buffer {
            WriteBufferKind::Grouping => Box::new(GroupingBufferFilesTracker::new(
                formatter.clone(),
                options.compression,
            )?),
            WriteBufferKind::Reservoir { sample_size } => Box::new(ReservoirSamplingTracker::new(
                formatter.clone(),
                options.compression,
                sample_size,
            )?),
        };
        let buffer = WriteBuffer::new(
            tracker,
            tokens,
            WriteBufferOptions {
                items_per_buffer_write: options.items_per_buffer_write,
                size_per_buffer_write: options.size_per_buffer_write,
                compression: options.compression,
                hash_algorithm: options.hash_algorithm,
                file_extension: formatter.file_extension().to_string(),
            },
        );

        debug!(
            writer = writer.name(),
            compression = %options.compression,
            items_per_buffer_write = options.items_per_buffer_write,
            items_limit = options.items_limit,
            "Created buffered writer"
        );

        metadata.set_metadata(WRITER_MODULE, "items_count", 0);
        metadata.set_metadata(WRITER_MODULE, "written_files", 0);
        Ok(Self {
            writer,
            buffer,
            options,
            metadata,
            items_count: 0,
            written_files: 0,
        })
    }

    /// Buffers every record, packing and delivering groups whose threshold
    /// trips. Stops as soon as `items_limit` records have been buffered.
    pub async fn write_batch(&mut self, records: RecordStream<'_>) -> Result<BatchOutcome> {
        for record in records {
            let record = record?;
            self.buffer.buffer(&record)?;
            self.items_count += 1;
            self.metadata.increment(WRITER_MODULE, "items_count", 1);

            let key = record.group_membership;
            if self.buffer.should_write_buffer(&key) {
                self.write_current_buffer_for_group(&key).await?;
                self.buffer.add_new_buffer_for_group(&key)?;
            }

            if self.options.items_limit > 0 && self.items_count >= self.options.items_limit {
                info!(items_limit = self.options.items_limit, "Items limit reached");
                return Ok(BatchOutcome::LimitReached);
            }
        }
        Ok(BatchOutcome::Continue)
    }

    async fn write_current_buffer_for_group(&mut self, key: &[String]) -> Result<()> {
        let path_keys = self
            .buffer
            .group(key)
            .map_or_else(|| key.to_vec(), |g| g.path_safe_keys.clone());
        let info = self.buffer.pack_buffer(key)?;
        self.writer.write(&info, &path_keys).await?;
        self.buffer.clean_tmp_files(&info)?;

        self.written_files += 1;
        self.metadata.increment(WRITER_MODULE, "written_files", 1);
        info!(
            writer = self.writer.name(),
            group = ?key,
            records = info.number_of_records,
            size_bytes = info.size_bytes,
            "Delivered file"
        );
        Ok(())
    }

    /// Packs and delivers every group with buffered records.
    pub async fn flush(&mut self) -> Result<()> {
        for key in self.buffer.keys_with_items() {
            self.write_current_buffer_for_group(&key).await?;
        }
        Ok(())
    }

    /// Runs the consistency check (if enabled) and the writer's final step.
    pub async fn finish_writing(&mut self) -> Result<()> {
        if self.options.check_consistency {
            self.writer.check_write_consistency().await?;
            info!(writer = self.writer.name(), files = self.written_files, "Consistency check passed");
        } else {
            warn!(writer = self.writer.name(), "Consistency check disabled, skipping");
        }
        self.writer.finish().await
    }

    /// Removes the buffer directory and closes the destination.
    pub async fn close(&mut self) -> Result<()> {
        let buffer = self.buffer.close();
        let writer = self.writer.close().await;
        buffer.and(writer)
    }

    pub fn items_count(&self) -> u64 {
        self.items_count
    }

    pub fn written_files(&self) -> u64 {
        self.written_files
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    pub fn buffer(&self) -> &WriteBuffer {
        &self.buffer
    }

    pub fn writer(&self) -> &dyn Writer {
        self.writer.as_ref()
    }

    pub fn writer_mut(&mut self) -> &mut dyn Writer {
        self.writer.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ef_formatters::JsonLinesFormatter;
    use ef_traits::stream_of;
    use ef_types::{Compression, Record, WriteInfo};
    use flate2::read::GzDecoder;
    use serde_json::json;
    use std::io::Read;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// What the collecting writer observed.
    #[derive(Default)]
    struct Probe {
        delivered: Mutex<Vec<(Vec<String>, String)>>,
        checks: AtomicUsize,
    }

    struct CollectingWriter {
        probe: Arc<Probe>,
    }

    #[async_trait]
    impl Writer for CollectingWriter {
        async fn write(&mut self, info: &WriteInfo, group: &[String]) -> Result<()> {
            let raw = std::fs::read(&info.file_path)?;
            let text = match info.compression {
                Compression::Gz => {
                    let mut out = String::new();
                    GzDecoder::new(raw.as_slice()).read_to_string(&mut out)?;
                    out
                }
                _ => String::from_utf8_lossy(&raw).into_owned(),
            };
            self.probe.delivered.lock().unwrap().push((group.to_vec(), text));
            Ok(())
        }

        async fn check_write_consistency(&mut self) -> Result<()> {
            self.probe.checks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &str {
            "collecting"
        }
    }

    fn writer(options: WriterOptions) -> (BufferedWriter, Arc<Probe>, Metadata) {
        let probe = Arc::new(Probe::default());
        let metadata = Metadata::default();
        let writer = BufferedWriter::with_tokens(
            Box::new(CollectingWriter {
                probe: probe.clone(),
            }),
            Arc::new(JsonLinesFormatter::new()),
            options,
            metadata.clone(),
            RandomTokens::seeded(7),
        )
        .unwrap();
        (writer, probe, metadata)
    }

    fn records(n: u64, group: &str) -> Vec<Record> {
        (0..n)
            .map(|i| {
                Record::from_value(json!({"id": i}))
                    .unwrap()
                    .with_group_membership(vec![group.to_string()])
            })
            .collect()
    }

    fn formatted(records: Vec<Record>) -> RecordStream<'static> {
        let formatter = JsonLinesFormatter::new();
        let records = records
            .into_iter()
            .map(|mut record| {
                record.formatted = Some(formatter.format(&record).unwrap());
                record
            })
            .collect();
        stream_of(records)
    }

    #[tokio::test]
    async fn test_items_per_buffer_write_one_packs_each_record() {
        let (mut writer, probe, metadata) = writer(WriterOptions {
            items_per_buffer_write: 1,
            ..Default::default()
        });
        let outcome = writer.write_batch(formatted(records(3, "a"))).await.unwrap();
        assert_eq!(outcome, BatchOutcome::Continue);
        writer.flush().await.unwrap();

        let delivered = probe.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 3);
        assert_eq!(delivered[0].1, "{\"id\":0}");
        assert_eq!(metadata.get_u64(WRITER_MODULE, "written_files"), 3);
        assert_eq!(metadata.get_u64(WRITER_MODULE, "items_count"), 3);
        drop(delivered);
        writer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_flush_delivers_only_non_empty_groups() {
        let (mut writer, probe, _) = writer(WriterOptions {
            items_per_buffer_write: 2,
            ..Default::default()
        });
        writer.write_batch(formatted(records(4, "a"))).await.unwrap();
        writer.write_batch(formatted(records(1, "b"))).await.unwrap();
        writer.flush().await.unwrap();

        let delivered = probe.delivered.lock().unwrap();
        let groups: Vec<_> = delivered.iter().map(|(g, _)| g[0].as_str()).collect();
        assert_eq!(groups, vec!["a", "a", "b"]);
        assert_eq!(delivered[1].1, "{\"id\":2}\n{\"id\":3}");
    }

    #[tokio::test]
    async fn test_items_limit_stops_mid_batch() {
        let (mut writer, probe, _) = writer(WriterOptions {
            items_limit: 17,
            ..Default::default()
        });
        let outcome = writer.write_batch(formatted(records(10, "a"))).await.unwrap();
        assert_eq!(outcome, BatchOutcome::Continue);
        let outcome = writer.write_batch(formatted(records(10, "a"))).await.unwrap();
        assert_eq!(outcome, BatchOutcome::LimitReached);
        assert_eq!(writer.items_count(), 17);

        writer.flush().await.unwrap();
        let lines: usize = probe
            .delivered
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.lines().count())
            .sum();
        assert_eq!(lines, 17);
    }

    #[tokio::test]
    async fn test_empty_batch_does_not_deliver() {
        let (mut writer, probe, _) = writer(WriterOptions {
            items_per_buffer_write: 1,
            ..Default::default()
        });
        writer.write_batch(formatted(Vec::new())).await.unwrap();
        writer.flush().await.unwrap();
        assert!(probe.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unformatted_record_is_error() {
        let (mut writer, _, _) = writer(WriterOptions::default());
        assert!(writer.write_batch(stream_of(records(1, "a"))).await.is_err());
    }

    #[tokio::test]
    async fn test_finish_writing_runs_check_only_when_enabled() {
        let (mut writer, probe, _) = writer(WriterOptions::default());
        writer.finish_writing().await.unwrap();
        assert_eq!(probe.checks.load(Ordering::SeqCst), 0);

        let (mut writer, probe, _) = writer_with_check();
        writer.finish_writing().await.unwrap();
        assert_eq!(probe.checks.load(Ordering::SeqCst), 1);
    }

    fn writer_with_check() -> (BufferedWriter, Arc<Probe>, Metadata) {
        writer(WriterOptions {
            check_consistency: true,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_reservoir_buffer_flushes_sample_at_end() {
        let (mut writer, probe, _) = writer(WriterOptions {
            items_per_buffer_write: 1,
            write_buffer: WriteBufferKind::Reservoir { sample_size: 5 },
            ..Default::default()
        });
        writer.write_batch(formatted(records(50, "a"))).await.unwrap();
        assert!(probe.delivered.lock().unwrap().is_empty());

        writer.flush().await.unwrap();
        let delivered = probe.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].1.lines().count(), 5);
    }

    #[tokio::test]
    async fn test_close_removes_tmp_dir() {
        let (mut writer, _, _) = writer(WriterOptions::default());
        writer.write_batch(formatted(records(2, "a"))).await.unwrap();
        let dir = writer.buffer().tmp_dir().to_path_buf();
        assert!(dir.exists());
        writer.close().await.unwrap();
        assert!(!dir.exists());
    }
}

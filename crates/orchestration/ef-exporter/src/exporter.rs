//! The export executor.

use crate::bypass::{self, BypassKind};
use crate::notifiers::Notifications;
use crate::persistence::configuration_from_uri;
use crate::registry::{Registry, DEFAULT_PERSISTENCE, DEFAULT_STATS, NO_FILTER, NO_GROUPING, NO_TRANSFORM};
use crate::stats::StatsManager;
use ef_error::Result;
use ef_traits::{
    format_batch, stream_of, FilterStage, Formatter, Grouper, Persistence, Reader, Transform,
};
use ef_types::{ExportConfig, Metadata};
use ef_writers::{BatchOutcome, BufferedWriter};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Metadata module reader counters are recorded under.
pub const READER_MODULE: &str = "reader";

/// Runs one export job: read, filter, transform, filter, group, format and
/// write batches until the reader is exhausted, checkpointing the reader
/// position after every batch.
///
/// Every stage is built up front from the configuration, so an invalid
/// configuration fails before anything is read.
pub struct Exporter {
    config: ExportConfig,
    registry: Registry,
    reader: Box<dyn Reader>,
    filter_before: FilterStage,
    filter_after: FilterStage,
    transform: Box<dyn Transform>,
    grouper: Box<dyn Grouper>,
    formatter: Arc<dyn Formatter>,
    writer: BufferedWriter,
    persistence: Box<dyn Persistence>,
    notifications: Notifications,
    stats: Box<dyn StatsManager>,
    metadata: Metadata,
}

impl Exporter {
    pub fn new(config: ExportConfig, registry: Registry) -> Result<Self> {
        config.validate()?;
        let metadata = Metadata::new(config.to_value());

        let reader = registry.readers.create(&config.reader)?;
        let filter_before = FilterStage::new(
            registry
                .filters
                .create_or(config.filter_before.as_ref(), NO_FILTER)?,
        );
        let filter_after = FilterStage::new(
            registry
                .filters
                .create_or(config.filter_after.as_ref(), NO_FILTER)?,
        );
        let transform = registry
            .transforms
            .create_or(config.transform.as_ref(), NO_TRANSFORM)?;
        let grouper = registry
            .groupers
            .create_or(config.grouper.as_ref(), NO_GROUPING)?;
        let formatter = registry.create_formatter(config.formatter())?;

        let (destination, writer_options) = registry.create_writer(&config.writer)?;
        let writer =
            BufferedWriter::new(destination, formatter.clone(), writer_options, metadata.clone())?;

        let persistence = registry
            .persistence
            .create_or(config.persistence.as_ref(), DEFAULT_PERSISTENCE)?;
        let notifications = Notifications::new(
            config
                .notifications()
                .map(|module| registry.notifiers.create(module))
                .collect::<Result<Vec<_>>>()?,
        );
        let stats = registry
            .stats
            .create_or(config.stats.as_ref(), DEFAULT_STATS)?;

        debug!(
            reader = %config.reader.name,
            writer = %config.writer.name,
            formatter = formatter.name(),
            persistence = persistence.name(),
            notifiers = notifications.len(),
            "Built export pipeline"
        );

        Ok(Self {
            config,
            registry,
            reader,
            filter_before,
            filter_after,
            transform,
            grouper,
            formatter,
            writer,
            persistence,
            notifications,
            stats,
            metadata,
        })
    }

    /// Rebuilds the job stored at a resume URI (`memory:<id>`,
    /// `file:<dir>/<id>`, `sqlite:<database>/<id>`).
    pub fn from_resume_uri(uri: &str, registry: Registry) -> Result<Self> {
        Self::new(configuration_from_uri(uri)?, registry)
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Current job id, once the job has started.
    pub fn job_id(&self) -> Option<&str> {
        self.persistence.job_id()
    }

    /// URI resuming the current job, if its persistence supports it.
    pub fn resume_uri(&self) -> Option<String> {
        self.persistence.resume_uri()
    }

    /// Runs the job to completion.
    ///
    /// On failure the job state is kept for a later resume and the failure
    /// is notified before the error is returned. The writer is closed and
    /// the stats are reported in every case.
    pub async fn export(&mut self) -> Result<()> {
        let span = info_span!("export", logger_name = %self.config.exporter_options.logger_name);
        async {
            self.metadata.start();
            self.notifications.notify_start().await;

            let result = self.run().await;
            if let Err(e) = self.writer.close().await {
                warn!(error = %e, "Failed to close writer");
            }
            self.metadata.finish();

            match &result {
                Ok(()) => {
                    info!(
                        items = self.metadata.get_u64(ef_writers::WRITER_MODULE, "items_count"),
                        bypassed_pipeline = self.metadata.bypassed_pipeline(),
                        "Export finished"
                    );
                    self.notifications
                        .notify_complete(&self.metadata.snapshot())
                        .await;
                }
                Err(e) => {
                    error!(error = %e, job_id = ?self.job_id(), "Export failed");
                    let configuration = self.config.to_value();
                    self.notifications
                        .notify_failure(&e.to_string(), &format!("{e:?}"), &configuration)
                        .await;
                }
            }
            self.stats.report(&self.metadata);
            result
        }
        .instrument(span)
        .await
    }

    async fn run(&mut self) -> Result<()> {
        self.start_job()?;

        if let Some(kind) = bypass::try_bypass(&self.config, &self.registry) {
            self.run_bypass(kind).await?;
        } else {
            self.run_pipeline().await?;
        }

        self.persistence.close()?;
        self.persistence.delete()?;
        Ok(())
    }

    fn start_job(&mut self) -> Result<()> {
        let options = &self.config.exporter_options;
        match (options.resume, options.persistence_state_id.as_deref()) {
            (true, Some(job_id)) => {
                self.persistence.load_job(job_id)?;
                info!(job_id, "Resuming job");
            }
            _ => {
                let job_id = self.persistence.generate_new_job(&self.config.to_value())?;
                debug!(job_id = %job_id, "Started job");
            }
        }
        if let Some(job_id) = self.persistence.job_id() {
            self.metadata.set_metadata("persistence", "job_id", job_id);
        }
        Ok(())
    }

    async fn run_bypass(&mut self, kind: BypassKind) -> Result<()> {
        bypass::execute(
            kind,
            &self.config,
            self.reader.as_mut(),
            self.writer.writer_mut(),
            self.persistence.as_mut(),
            &self.metadata,
        )
        .await?;
        self.metadata.set_bypassed_pipeline(true);
        info!(bypass = kind.as_str(), "Bypass finished");
        Ok(())
    }

    async fn run_pipeline(&mut self) -> Result<()> {
        self.reader
            .set_last_position(self.persistence.get_last_position()?)?;

        while !self.reader.is_finished() {
            let batch = self.reader.get_next_batch().await?;
            if batch.is_empty() {
                continue;
            }
            self.metadata
                .increment(READER_MODULE, "read_items", batch.len() as u64);

            let records = self.filter_before.filter_batch(stream_of(batch));
            let records = self.transform.transform_batch(records);
            let records = self.filter_after.filter_batch(records);
            let records = self.grouper.group_batch(records);
            let records = format_batch(self.formatter.as_ref(), records);
            let outcome = self.writer.write_batch(records).await?;

            let position = self.reader.get_last_position();
            debug!(position = %position, "Committing position");
            self.persistence.commit_position(position)?;

            if outcome == BatchOutcome::LimitReached {
                break;
            }
        }
        self.record_filter_counts();

        self.writer.flush().await?;
        self.writer.finish_writing().await
    }

    fn record_filter_counts(&self) {
        for (module, stage) in [
            ("filter_before", &self.filter_before),
            ("filter_after", &self.filter_after),
        ] {
            self.metadata
                .set_metadata(module, "filtered_out", stage.filtered_out());
            self.metadata.set_metadata(module, "total", stage.total());
        }
    }
}

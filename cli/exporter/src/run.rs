//! Job loading and execution for ef-export.

use crate::args::{Cli, LogLevel};
use anyhow::{Context, Result};
use ef_exporter::{configuration_from_uri, Exporter, Registry};
use ef_types::ExportConfig;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize logging to stderr.
///
/// `RUST_LOG`, when set, takes precedence over `level`.
pub fn init_logging(level: LogLevel) -> Result<()> {
    let level: Level = level.into();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}

/// Loads the job configuration named on the command line.
pub fn load_config(args: &Cli) -> Result<ExportConfig> {
    match (&args.config, &args.resume) {
        (Some(path), _) => ExportConfig::from_path(path)
            .with_context(|| format!("loading {}", path.display())),
        (None, Some(uri)) => {
            configuration_from_uri(uri).with_context(|| format!("resuming {uri}"))
        }
        (None, None) => anyhow::bail!("either --config or --resume is required"),
    }
}

/// Effective log level: the command line wins over the configuration.
pub fn log_level(args: &Cli, config: &ExportConfig) -> LogLevel {
    args.log_level
        .unwrap_or_else(|| config.exporter_options.log_level.into())
}

/// Builds the exporter and runs the job.
///
/// The exporter is returned with the outcome so the caller can report its
/// metadata and resume URI.
pub async fn execute(config: ExportConfig) -> Result<(Exporter, ef_error::Result<()>)> {
    let mut exporter =
        Exporter::new(config, Registry::with_builtins()).context("invalid export configuration")?;
    let outcome = exporter.export().await;
    Ok((exporter, outcome))
}

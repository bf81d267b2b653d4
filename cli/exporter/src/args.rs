//! CLI argument definitions for ef-export.

use clap::{ArgGroup, Parser, ValueEnum};
use std::path::PathBuf;
use tracing::Level;

/// Runs an exportflow job.
///
/// A job reads records from a source, filters, transforms and groups them,
/// and writes formatted files to a destination. A failed job can be resumed
/// from the URI printed on failure when it ran with a persistence backend.
///
/// ## Examples
///
/// Run a job from a YAML file:
///   ef-export --config export.yaml
///
/// Resume a failed job:
///   ef-export --resume file:/var/lib/exportflow/3f2a9c1e
#[derive(Parser, Debug)]
#[command(name = "ef-export")]
#[command(version, about, long_about = None)]
#[command(group(ArgGroup::new("job").required(true).args(["config", "resume"])))]
pub struct Cli {
    /// Job configuration file (YAML, or JSON for `.json` files)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Resume URI of a failed job (`memory:`, `file:` or `sqlite:`)
    #[arg(short = 'r', long)]
    pub resume: Option<String>,

    /// Log level; overrides `exporter_options.log_level`
    #[arg(short = 'l', long, value_enum, env = "EF_LOG_LEVEL")]
    pub log_level: Option<LogLevel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl From<ef_types::LogLevel> for LogLevel {
    fn from(level: ef_types::LogLevel) -> Self {
        match level {
            ef_types::LogLevel::Error => LogLevel::Error,
            ef_types::LogLevel::Warn => LogLevel::Warn,
            ef_types::LogLevel::Info => LogLevel::Info,
            ef_types::LogLevel::Debug => LogLevel::Debug,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_or_resume_required() {
        assert!(Cli::try_parse_from(["ef-export"]).is_err());
        assert!(Cli::try_parse_from(["ef-export", "-c", "a.yaml", "-r", "memory:x"]).is_err());

        let cli = Cli::try_parse_from(["ef-export", "--resume", "memory:x"]).unwrap();
        assert_eq!(cli.resume.as_deref(), Some("memory:x"));
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_log_level() {
        let cli =
            Cli::try_parse_from(["ef-export", "-c", "a.yaml", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        assert_eq!(Level::from(LogLevel::from(ef_types::LogLevel::Warn)), Level::WARN);
    }
}

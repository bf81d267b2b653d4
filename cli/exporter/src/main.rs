//! ef-export CLI
//!
//! Runs one export job from a configuration file or resumes a failed one.

use clap::Parser;
use ef_exporter::Exporter;

mod args;
mod format;
mod run;

use args::Cli;
use format::{format_bytes, format_elapsed, format_number};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let config = run::load_config(&args)?;
    run::init_logging(run::log_level(&args, &config))?;

    let (exporter, outcome) = run::execute(config).await?;
    report(&exporter);

    if let Err(e) = outcome {
        eprintln!();
        eprintln!("Export failed: {e}");
        if let Some(uri) = exporter.resume_uri() {
            eprintln!("  Resume with: ef-export --resume {uri}");
        }
        std::process::exit(1);
    }

    Ok(())
}

/// Prints the run summary to stderr.
fn report(exporter: &Exporter) {
    let metadata = exporter.metadata();
    let snapshot = metadata.snapshot();

    eprintln!();
    eprintln!("Export summary:");
    if metadata.bypassed_pipeline() {
        eprintln!("  Bypass:        yes");
    }
    let items = metadata.get_u64("writer", "items_count");
    if items > 0 || !metadata.bypassed_pipeline() {
        eprintln!("  Items written: {}", format_number(items));
    }
    eprintln!(
        "  Files written: {}",
        format_number(metadata.get_u64("writer", "written_files"))
    );
    let bytes = metadata.get_u64("writer", "bytes_copied");
    if bytes > 0 {
        eprintln!("  Bytes copied:  {}", format_bytes(bytes));
    }
    if let Some(secs) = snapshot["elapsed_time"].as_f64() {
        eprintln!("  Elapsed:       {}", format_elapsed(secs));
    }
}

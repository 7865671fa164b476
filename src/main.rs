//! Main entry point for the genocombine CLI.

use std::fs::OpenOptions;
use std::sync::Mutex;

use clap::{command, Parser, Subcommand};
use genocombine::{combine, common, filter, grs, merge, stats};
use tracing_subscriber::fmt::writer::BoxMakeWriter;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Genotype reconciliation across assay platforms"
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: common::Args,

    /// The sub command to run
    #[command(subcommand)]
    command: Commands,
}

/// Enum supporting the parsing of top-level commands.
#[allow(clippy::large_enum_variant)]
#[derive(Debug, Subcommand)]
enum Commands {
    /// Combine variants from the platform files via the catalog.
    Combine(combine::Args),
    /// Merge the platform files of one chromosome.
    Merge(merge::Args),
    /// Compute genetic risk scores.
    Grs(grs::Args),
    /// Per-record metrics of a VCF file.
    Stats(stats::Args),
    /// Quality control filter of a VCF file.
    Filter(filter::Args),
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    let writer = match &cli.common.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| anyhow::anyhow!("could not open log file {}: {}", path, e))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    // Build a tracing subscriber according to the configuration in `cli.common`.
    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_ansi(cli.common.log_file.is_none())
        .with_writer(writer)
        .with_max_level(match cli.common.verbose.log_level() {
            Some(level) => match level {
                log::Level::Error => tracing::Level::ERROR,
                log::Level::Warn => tracing::Level::WARN,
                log::Level::Info => tracing::Level::INFO,
                log::Level::Debug => tracing::Level::DEBUG,
                log::Level::Trace => tracing::Level::TRACE,
            },
            None => tracing::Level::INFO,
        })
        .compact()
        .finish();

    // Install collector and go into sub commands.
    tracing::subscriber::with_default(collector, || {
        tracing::info!("genocombine {} startup", common::version());

        match &cli.command {
            Commands::Combine(args) => combine::run(&cli.common, args)?,
            Commands::Merge(args) => merge::run(&cli.common, args)?,
            Commands::Grs(args) => grs::run(&cli.common, args)?,
            Commands::Stats(args) => stats::run(&cli.common, args)?,
            Commands::Filter(args) => filter::run(&cli.common, args)?,
        }

        tracing::info!("All done. Have a nice day!");

        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}

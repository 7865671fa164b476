//! Per-record metrics of one VCF file.

use std::io::{BufRead, Write};

use clap::Parser;
use serde::Serialize;

use crate::{
    common::io::std::{open_output, open_read_maybe_gz},
    metrics::population::metrics_for_record,
    reconcile::DEFAULT_THRESHOLD,
    record::{read_header_lines, LayoutCache, VariantRecord},
};

/// Command line arguments for `stats` sub command.
#[derive(Parser, Debug)]
#[command(about = "Compute per-record metrics of a VCF file", long_about = None)]
pub struct Args {
    /// Path to the input VCF file, plain or gzip-compressed.
    #[arg(long, short = 'v')]
    pub path_input: String,
    /// Minimal posterior probability of a genotype call.
    #[arg(long, short = 't', default_value_t = DEFAULT_THRESHOLD)]
    pub threshold: f64,
    /// Path to the output file, `-` for stdout.
    #[arg(long, default_value = "-")]
    pub path_output: String,
}

/// One row of the metrics table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsRow {
    pub chr: String,
    pub rsid: String,
    pub posn: u64,
    #[serde(rename = "CR")]
    pub call_rate: String,
    #[serde(rename = "MAF")]
    pub maf: String,
    #[serde(rename = "HWEP")]
    pub hwe_p: String,
    #[serde(rename = "INFO")]
    pub info: String,
    #[serde(rename = "N")]
    pub n: u64,
    #[serde(rename = "MISS")]
    pub missing: u64,
}

impl StatsRow {
    pub fn from_record(record: &VariantRecord, threshold: f64) -> Self {
        let metrics = metrics_for_record(record, threshold);
        Self {
            chr: record.prefix.chromosome.clone(),
            rsid: record.prefix.variant_id.clone(),
            posn: record.prefix.position,
            call_rate: format!("{:.2}", metrics.call_rate),
            maf: format!("{:.6}", metrics.maf),
            hwe_p: format!("{:.8}", metrics.hwe_p),
            info: format!("{:.6}", record.prefix.info_score()),
            n: metrics.n,
            missing: metrics.missing,
        }
    }
}

/// Write one metrics row per data line of `reader`; returns the number of rows.
pub fn write_stats<R, W>(mut reader: R, writer: W, threshold: f64) -> Result<usize, anyhow::Error>
where
    R: BufRead,
    W: Write,
{
    read_header_lines(&mut reader)?;

    let mut layouts = LayoutCache::default();
    let mut wtr = csv::Writer::from_writer(writer);
    let mut count = 0;
    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let record = match VariantRecord::parse(&line, &mut layouts) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("skipping unparsable line: {}", e);
                continue;
            }
        };
        wtr.serialize(StatsRow::from_record(&record, threshold))?;
        count += 1;
    }
    wtr.flush()?;
    Ok(count)
}

/// Main entry point for `stats` sub command.
pub fn run(common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("Starting stats\ncommon args: {:#?}\nargs: {:#?}", common, args);

    let reader = open_read_maybe_gz(&args.path_input)?;
    let mut writer = open_output(&args.path_output)?;
    let count = write_stats(reader, &mut writer, args.threshold)?;
    writer.flush()?;

    tracing::info!(
        "Wrote metrics of {} records",
        thousands::Separable::separate_with_commas(&count)
    );
    Ok(())
}

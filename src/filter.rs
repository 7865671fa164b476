//! Quality control filter over the records of one VCF file.

use std::{
    collections::HashSet,
    io::{BufRead, Write},
};

use clap::Parser;
use strum::{Display, EnumIter, IntoEnumIterator};

use crate::{
    common::io::std::{open_output, open_read_maybe_gz, read_lines},
    metrics::population::metrics_for_record,
    reconcile::DEFAULT_THRESHOLD,
    record::{read_header_lines, LayoutCache, VariantRecord},
};

/// Command line arguments for `filter` sub command.
#[derive(Parser, Debug)]
#[command(about = "Filter the records of a VCF file by quality metrics", long_about = None)]
pub struct Args {
    /// Path to the input VCF file, plain or gzip-compressed.
    #[arg(long, short = 'v')]
    pub path_input: String,
    /// Path to a file with one excluded position per line.
    #[arg(long, short = 'e')]
    pub path_excluded: Option<String>,
    /// Minimal posterior probability of a genotype call.
    #[arg(long, short = 't', default_value_t = DEFAULT_THRESHOLD)]
    pub threshold: f64,
    /// Minimal minor allele frequency.
    #[arg(long, short = 'm', default_value_t = 0.05)]
    pub maf: f64,
    /// Maximal factor between MAF and reference panel allele frequency, 0 to disable.
    #[arg(long, short = 'f', default_value_t = 0.0)]
    pub maf_factor: f64,
    /// Minimal HWE exact test p-value.
    #[arg(long, short = 'w', default_value_t = 1e-6)]
    pub hwe: f64,
    /// Minimal call rate.
    #[arg(long, short = 'c', default_value_t = 0.9)]
    pub cr: f64,
    /// Minimal imputation INFO score.
    #[arg(long, short = 'i', default_value_t = 0.9)]
    pub info: f64,
    /// Path to the output file, `-` for stdout.
    #[arg(long, default_value = "-")]
    pub path_output: String,
}

/// Filter thresholds.
#[derive(Debug, Clone, derive_builder::Builder)]
#[builder(pattern = "immutable")]
pub struct Config {
    #[builder(default = "DEFAULT_THRESHOLD")]
    pub threshold: f64,
    #[builder(default = "0.05")]
    pub maf: f64,
    /// Disabled when 0.
    #[builder(default = "0.0")]
    pub maf_factor: f64,
    #[builder(default = "1e-6")]
    pub hwe: f64,
    #[builder(default = "0.9")]
    pub call_rate: f64,
    #[builder(default = "0.9")]
    pub info_score: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            maf: 0.05,
            maf_factor: 0.0,
            hwe: 1e-6,
            call_rate: 0.9,
            info_score: 0.9,
        }
    }
}

/// Reason for dropping a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Rejection {
    Position,
    Maf,
    Hwe,
    CallRate,
    Info,
    MafFactor,
    MissingId,
}

/// All reasons to drop `record`; empty if it passes.
///
/// NaN metrics never fail a comparison.
pub fn check_record(
    record: &VariantRecord,
    config: &Config,
    excluded: &HashSet<u64>,
) -> Vec<Rejection> {
    let mut result = Vec::new();
    let prefix = &record.prefix;
    if excluded.contains(&prefix.position) {
        result.push(Rejection::Position);
    }

    let metrics = metrics_for_record(record, config.threshold);
    if metrics.maf < config.maf {
        result.push(Rejection::Maf);
    }
    if metrics.hwe_p < config.hwe {
        result.push(Rejection::Hwe);
    }
    if metrics.call_rate < config.call_rate {
        result.push(Rejection::CallRate);
    }
    if prefix.info_score() < config.info_score {
        result.push(Rejection::Info);
    }
    if config.maf_factor != 0.0 {
        let ref_panel_af = prefix.ref_panel_af();
        if metrics.maf < ref_panel_af / config.maf_factor
            || metrics.maf > ref_panel_af * config.maf_factor
        {
            result.push(Rejection::MafFactor);
        }
    }
    if prefix.variant_id == "." {
        result.push(Rejection::MissingId);
    }

    result
}

/// Counts of read and written records and of each rejection reason.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCounts {
    pub read: usize,
    pub written: usize,
    pub rejected: indexmap::IndexMap<Rejection, usize>,
}

impl FilterCounts {
    fn new() -> Self {
        Self {
            rejected: Rejection::iter().map(|r| (r, 0)).collect(),
            ..Default::default()
        }
    }

    pub fn rejected(&self, reason: Rejection) -> usize {
        self.rejected.get(&reason).copied().unwrap_or_default()
    }
}

impl std::fmt::Display for FilterCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Rd={}, Wrt={}", self.read, self.written)?;
        for (reason, count) in &self.rejected {
            write!(f, ", {}={}", reason, count)?;
        }
        Ok(())
    }
}

/// Read excluded positions, one per line.
pub fn load_excluded<P: AsRef<std::path::Path>>(path: P) -> Result<HashSet<u64>, anyhow::Error> {
    let mut result = HashSet::new();
    for line in read_lines(path.as_ref()).map_err(|e| {
        anyhow::anyhow!("could not open excluded positions {}: {}", path.as_ref().display(), e)
    })? {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        result.insert(
            line.parse()
                .map_err(|e| anyhow::anyhow!("invalid excluded position {:?}: {}", line, e))?,
        );
    }
    Ok(result)
}

/// Copy header lines and passing records from `reader` to `writer`.
pub fn filter_records<R, W>(
    mut reader: R,
    writer: &mut W,
    config: &Config,
    excluded: &HashSet<u64>,
) -> Result<FilterCounts, anyhow::Error>
where
    R: BufRead,
    W: Write,
{
    for line in read_header_lines(&mut reader)? {
        writeln!(writer, "{}", line)?;
    }

    let mut counts = FilterCounts::new();
    let mut layouts = LayoutCache::default();
    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        counts.read += 1;
        let record = match VariantRecord::parse(&line, &mut layouts) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("skipping unparsable line: {}", e);
                continue;
            }
        };

        let rejections = check_record(&record, config, excluded);
        if rejections.is_empty() {
            writeln!(writer, "{}", line)?;
            counts.written += 1;
        } else {
            tracing::trace!("{} rejected: {:?}", &record.prefix.variant_id, &rejections);
            for reason in rejections {
                *counts.rejected.entry(reason).or_default() += 1;
            }
        }
    }

    Ok(counts)
}

/// Main entry point for `filter` sub command.
pub fn run(common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("Starting filter\ncommon args: {:#?}\nargs: {:#?}", common, args);

    let config = ConfigBuilder::default()
        .threshold(args.threshold)
        .maf(args.maf)
        .maf_factor(args.maf_factor)
        .hwe(args.hwe)
        .call_rate(args.cr)
        .info_score(args.info)
        .build()?;
    let excluded = match &args.path_excluded {
        Some(path) => load_excluded(path)?,
        None => HashSet::new(),
    };
    tracing::info!("{} excluded positions", excluded.len());

    let reader = open_read_maybe_gz(&args.path_input)?;
    let mut writer = open_output(&args.path_output)?;
    let counts = filter_records(reader, &mut writer, &config, &excluded)?;
    writer.flush()?;

    tracing::info!("END filter {}", &counts);
    Ok(())
}

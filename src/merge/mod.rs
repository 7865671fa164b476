//! Streaming merge of the per-platform files of one chromosome.

pub mod reading;

use std::{io::Write, path::Path};

use clap::Parser;

use crate::{
    common::io::std::{open_output, open_read_maybe_gz, read_key_values},
    reconcile::{self, DEFAULT_THRESHOLD},
};

use self::reading::{MergeOutcome, PlatformStream, StreamingMerger};

/// Default maximal percentage of mismatching overlapping genotypes of an emitted record.
pub const DEFAULT_MAX_ERROR_PCT: f64 = 10.0;

/// Meta header lines of the merged output.
pub const META_HEADER: &[&str] = &[
    "##fileformat=VCFv4.2",
    "##INFO=<ID=AC,Number=A,Type=Integer,Description=\"Allele count in genotypes\">",
    "##INFO=<ID=AN,Number=1,Type=Integer,Description=\"Total number of alleles in called genotypes\">",
    "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">",
    "##INFO=<ID=RefPanelAF,Number=A,Type=Float,Description=\"Allele frequency in imputation reference panel\">",
    "##FORMAT=<ID=DS,Number=1,Type=Float,Description=\"Genotype dosage\">",
    "##FORMAT=<ID=GP,Number=G,Type=Float,Description=\"Genotype posterior probabilities\">",
    "##FORMAT=<ID=AT,Number=1,Type=String,Description=\"Assay Type\">",
    "##INFO=<ID=TYPED,Number=0,Type=Flag,Description=\"Typed in input data\">",
];

/// Command line arguments for `merge` sub command.
#[derive(Parser, Debug)]
#[command(about = "Merge the platform files of one chromosome", long_about = None)]
pub struct Args {
    /// Path to the platform template file (`platform=template` lines).
    #[arg(long, short = 't')]
    pub path_template: String,
    /// Path to the QC parameter file (`KEY=VALUE` lines).
    #[arg(long, short = 'p')]
    pub path_params: Option<String>,
    /// Path prefix of the VCF files, first placeholder of the templates.
    #[arg(long, short = 'v', default_value = "/var/data")]
    pub vcf_prefix: String,
    /// Chromosome, second placeholder of the templates.
    #[arg(long, short = 'c', default_value = "22")]
    pub chromosome: String,
    /// Minimal posterior probability of a genotype call.
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    pub threshold: f64,
    /// Records with this percentage of mismatching overlapping genotypes or more are dropped.
    #[arg(long, short = 'e', default_value_t = DEFAULT_MAX_ERROR_PCT)]
    pub max_error_pct: f64,
    /// Path to the output file, `-` for stdout; `.gz` files are written bgzip-compressed.
    #[arg(long, default_value = "-")]
    pub path_output: String,
}

/// Configuration of the merge.
#[derive(Debug, Clone, derive_builder::Builder)]
#[builder(pattern = "immutable")]
pub struct Config {
    /// Reconciliation of the overlapping records.
    #[builder(default)]
    pub reconcile: reconcile::Config,
    #[builder(default = "DEFAULT_MAX_ERROR_PCT")]
    pub max_error_pct: f64,
    /// Detail of logging for suppressed records.
    #[builder(default)]
    pub metrics_level: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reconcile: reconcile::Config::default(),
            max_error_pct: DEFAULT_MAX_ERROR_PCT,
            metrics_level: 0,
        }
    }
}

/// QC parameters of a run, logged with the run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunParameters {
    pub test_num: i64,
    pub maf_delta: f64,
    pub call_rate: f64,
    pub info_score: f64,
}

impl RunParameters {
    /// Parse from `KEY=VALUE` pairs; unknown keys are ignored, malformed numbers are an error.
    pub fn from_key_values(entries: &[(String, String)]) -> Result<Self, anyhow::Error> {
        fn number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, anyhow::Error>
        where
            T::Err: std::fmt::Display,
        {
            value
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid value {:?} for {}: {}", value, key, e))
        }

        let mut result = Self::default();
        for (key, value) in entries {
            match key.as_str() {
                "TESTNUM" => result.test_num = number(key, value)?,
                "MAFDELTA" => result.maf_delta = number(key, value)?,
                "CALLRATE" => result.call_rate = number(key, value)?,
                "INFOSCORE" => result.info_score = number(key, value)?,
                _ => tracing::debug!("ignoring QC parameter {}", key),
            }
        }
        Ok(result)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        Self::from_key_values(&read_key_values(open_read_maybe_gz(path)?)?)
    }
}

/// Replace the two `%s` placeholders of `template` with `prefix` and `chromosome`.
pub fn expand_template(
    template: &str,
    prefix: &str,
    chromosome: &str,
) -> Result<String, anyhow::Error> {
    if template.matches("%s").count() != 2 {
        anyhow::bail!("template {:?} must contain exactly two %s", template);
    }
    Ok(template
        .replacen("%s", prefix, 1)
        .replacen("%s", chromosome, 1))
}

/// Load `(platform, template)` pairs in file order.
pub fn load_templates<P: AsRef<Path>>(path: P) -> Result<Vec<(String, String)>, anyhow::Error> {
    let templates = read_key_values(open_read_maybe_gz(path)?)?;
    if templates.is_empty() {
        anyhow::bail!("no platform templates found");
    }
    Ok(templates)
}

/// Write meta header, column header, and emitted records; returns written and suppressed counts.
pub fn write_merged<R, W>(
    merger: &mut StreamingMerger<R>,
    writer: &mut W,
) -> Result<(usize, usize), anyhow::Error>
where
    R: std::io::BufRead,
    W: Write,
{
    for line in META_HEADER {
        writeln!(writer, "{}", line)?;
    }
    let (header, _) = merger.directory().combined_column_headers();
    writeln!(writer, "{}", header)?;

    let mut written = 0;
    let mut suppressed = 0;
    while let Some(outcome) = merger.step()? {
        match outcome {
            MergeOutcome::Emitted(record) => {
                writeln!(writer, "{}", record)?;
                written += 1;
            }
            MergeOutcome::Suppressed { .. } => suppressed += 1,
        }
    }
    Ok((written, suppressed))
}

/// Main entry point for `merge` sub command.
pub fn run(common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("START merge\ncommon args: {:#?}\nargs: {:#?}", common, args);

    let templates = load_templates(&args.path_template)?;
    let params = match &args.path_params {
        Some(path) => RunParameters::from_path(path)?,
        None => RunParameters::default(),
    };
    tracing::info!("Params: {:?}", &params);

    let config = ConfigBuilder::default()
        .reconcile(
            reconcile::ConfigBuilder::default()
                .threshold(args.threshold)
                .build()?,
        )
        .max_error_pct(args.max_error_pct)
        .metrics_level(common.metrics_level)
        .build()?;

    let mut streams = Vec::with_capacity(templates.len());
    for (platform, template) in &templates {
        let path = expand_template(template, &args.vcf_prefix, &args.chromosome)?;
        tracing::info!("Opening {} file {}", platform, &path);
        streams.push(PlatformStream::new(platform, open_read_maybe_gz(&path)?)?);
    }
    let priority = templates.iter().map(|(p, _)| p.as_str()).collect::<Vec<_>>();
    let mut merger = StreamingMerger::new(
        streams,
        &priority,
        config.reconcile.clone(),
        config.max_error_pct,
        config.metrics_level,
    );

    let mut writer = open_output(&args.path_output)?;
    let (written, suppressed) = write_merged(&mut merger, &mut writer)?;
    writer.flush()?;

    tracing::info!(
        "Wrote {} records, suppressed {} above {}% errors",
        written,
        suppressed,
        config.max_error_pct
    );
    merger.totals().log_totals("EXIT", written);
    crate::common::trace_rss_now();

    Ok(())
}

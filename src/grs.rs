//! Genetic risk scores over combined records.
//!
//! Two accountings are computed side by side.  The `signed` method counts alternative alleles
//! and flips the sign of the weight when the effect allele is the reference allele.  The
//! `effect_allele` method counts copies of the effect allele directly.  Both agree as long as
//! the effect allele bookkeeping is consistent, so diverging results point at input problems.

use std::{collections::HashMap, io::Write, path::Path, sync::Arc};

use clap::Parser;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    combine::combine_variants,
    common::{self, io::std::open_output},
    fetch::DEFAULT_MAX_OPEN_FILES,
    genotype::Genotype,
    lookup::CatalogLookup,
    reconcile::{self, DEFAULT_THRESHOLD},
    record::CombinedRecord,
    tabix::TabixFileReader,
};

/// Columns the weight table must have.
pub const REQUIRED_COLUMNS: &[&str] = &["varid", "ea", "eaf", "wgt"];

/// Weight of one variant.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Weight {
    #[serde(rename = "varid")]
    pub variant_id: String,
    /// Effect allele, upper case.
    #[serde(rename = "ea")]
    pub effect_allele: String,
    /// Effect allele frequency.
    #[serde(rename = "eaf")]
    pub effect_allele_frequency: f64,
    #[serde(rename = "wgt")]
    pub weight: f64,
}

/// The GRS weight table, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightTable {
    pub weights: IndexMap<String, Weight>,
}

impl WeightTable {
    /// Check that `header` has all [`REQUIRED_COLUMNS`].
    pub fn validate_header(header: &csv::StringRecord) -> Result<(), anyhow::Error> {
        let missing = REQUIRED_COLUMNS
            .iter()
            .filter(|column| !header.iter().any(|h| h.trim() == **column))
            .copied()
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            anyhow::bail!(
                "Invalid file header detected, expected: {} got: {} (missing: {})",
                REQUIRED_COLUMNS.join(","),
                header.iter().collect::<Vec<_>>().join(","),
                missing.join(",")
            );
        }
        Ok(())
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, anyhow::Error> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        Self::validate_header(rdr.headers()?)?;

        let mut weights = IndexMap::new();
        for row in rdr.deserialize() {
            let mut weight: Weight = row?;
            weight.effect_allele = weight.effect_allele.to_uppercase();
            tracing::debug!("{} : {}", &weight.variant_id, weight.weight);
            weights.insert(weight.variant_id.clone(), weight);
        }
        Ok(Self { weights })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let file = std::fs::File::open(path.as_ref()).map_err(|e| {
            anyhow::anyhow!("could not open weight table {}: {}", path.as_ref().display(), e)
        })?;
        Self::from_reader(file)
    }

    /// The variant ids, in file order.
    pub fn variant_ids(&self) -> Vec<String> {
        self.weights.keys().cloned().collect()
    }
}

/// Running score of one sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleScore {
    pub variant_count: usize,
    pub score: f64,
}

/// Scores of both accountings, per sample in combined column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scores {
    /// Alternative allele dosage with sign flip when the effect allele is the reference.
    pub signed: IndexMap<String, SampleScore>,
    /// Effect allele dosage.
    pub effect_allele: IndexMap<String, SampleScore>,
}

/// Compute the scores of `sample_names` over `records`.
///
/// Variants whose effect allele is neither the reference nor the alternative allele are
/// logged and skipped.  Cells starting with `.` do not count.
pub fn compute_scores(
    records: &[CombinedRecord],
    sample_names: &[String],
    weights: &WeightTable,
) -> Scores {
    let mut scores = Scores {
        signed: sample_names
            .iter()
            .map(|name| (name.clone(), SampleScore::default()))
            .collect(),
        effect_allele: sample_names
            .iter()
            .map(|name| (name.clone(), SampleScore::default()))
            .collect(),
    };

    for record in records {
        let prefix = &record.prefix;
        let Some(weight) = weights.weights.get(&prefix.variant_id) else {
            tracing::warn!("no weight for {}", &prefix.variant_id);
            continue;
        };
        let effect = weight.effect_allele.as_str();
        let multiplier = if effect == prefix.alternative {
            1.0
        } else if effect == prefix.reference {
            tracing::info!(
                "Sign change for: {} [{},{},{}]",
                &prefix.variant_id,
                &prefix.reference,
                &prefix.alternative,
                effect
            );
            -1.0
        } else {
            tracing::info!(
                "REJect: {} [{},{},{}]",
                &prefix.variant_id,
                &prefix.reference,
                &prefix.alternative,
                effect
            );
            continue;
        };

        for (name, cell) in sample_names.iter().zip(record.samples.iter()) {
            if cell.starts_with('.') {
                continue;
            }
            let genotype = match Genotype::from_cell(cell) {
                Ok(genotype) => genotype,
                Err(_) => {
                    tracing::warn!("unknown genotype {:?} for {}", cell, name);
                    continue;
                }
            };
            let (Some(alt_dosage), Some(effect_dosage)) = (
                genotype.alt_dosage(),
                genotype.effect_dosage(&prefix.alternative, effect),
            ) else {
                continue;
            };

            if let Some(score) = scores.signed.get_mut(name) {
                score.variant_count += 1;
                score.score += f64::from(alt_dosage) * weight.weight * multiplier;
            }
            if let Some(score) = scores.effect_allele.get_mut(name) {
                score.variant_count += 1;
                score.score += f64::from(effect_dosage) * weight.weight;
            }
        }
    }

    scores
}

/// One output row.
#[derive(Debug, Clone, PartialEq, Serialize)]
struct ScoreRow<'a> {
    method: &'a str,
    sample: &'a str,
    variant_count: usize,
    score: String,
}

/// Write the scores as CSV `method,sample,variant_count,score`.
pub fn write_scores<W: Write>(scores: &Scores, writer: W) -> Result<(), anyhow::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    for (method, values) in [("signed", &scores.signed), ("effect_allele", &scores.effect_allele)]
    {
        for (sample, value) in values {
            wtr.serialize(ScoreRow {
                method,
                sample,
                variant_count: value.variant_count,
                score: format!("{:.6}", value.score),
            })?;
        }
    }
    wtr.flush()?;
    Ok(())
}

/// Command line arguments for `grs` sub command.
#[derive(Parser, Debug)]
#[command(about = "Compute genetic risk scores from combined genotypes", long_about = None)]
pub struct Args {
    /// Path to the variant catalog directory.
    #[arg(long)]
    pub path_catalog: String,
    /// Path to the weight table (CSV with columns varid, ea, eaf, wgt).
    #[arg(long, short = 'r')]
    pub path_weights: String,
    /// Path prefix of the VCF files, overrides the catalog directories.
    #[arg(long, short = 'v')]
    pub vcf_prefix: Option<String>,
    /// Minimal posterior probability of a genotype call.
    #[arg(long, short = 't', default_value_t = DEFAULT_THRESHOLD)]
    pub threshold: f64,
    /// Accepted platforms, in priority order.
    #[arg(long, short = 'a', default_value = common::DEFAULT_PLATFORMS)]
    pub platforms: String,
    /// Maximal number of genotype files open at the same time.
    #[arg(long, default_value_t = DEFAULT_MAX_OPEN_FILES)]
    pub max_open_files: usize,
    /// Path to the output file, `-` for stdout.
    #[arg(long, default_value = "-")]
    pub path_output: String,
}

/// Main entry point for `grs` sub command.
pub fn run(common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("Starting grs\ncommon args: {:#?}\nargs: {:#?}", common, args);

    let weights = WeightTable::from_path(&args.path_weights)?;
    tracing::info!("Loaded {} weights", weights.weights.len());
    let lookup = CatalogLookup::load(&args.path_catalog, args.vcf_prefix.as_deref())?;
    let config = reconcile::ConfigBuilder::default()
        .threshold(args.threshold)
        .build()?;

    let combined = combine_variants(
        &lookup,
        Arc::new(TabixFileReader),
        Arc::new(lookup.naming()),
        &weights.variant_ids(),
        &common::split_platforms(&args.platforms),
        &config,
        args.max_open_files,
        common.metrics_level,
    )?;

    let before = std::time::Instant::now();
    let scores = compute_scores(&combined.records, &combined.sample_names, &weights);
    tracing::info!("Computed scores in {:?}", before.elapsed());
    compare_methods(&scores);

    let mut writer = open_output(&args.path_output)?;
    write_scores(&scores, &mut writer)?;
    writer.flush()?;

    Ok(())
}

/// Log samples for which the two accountings disagree.
fn compare_methods(scores: &Scores) {
    let effect_allele = scores
        .effect_allele
        .iter()
        .map(|(k, v)| (k.as_str(), v))
        .collect::<HashMap<_, _>>();
    let mut diverging = 0;
    for (sample, signed) in &scores.signed {
        if let Some(other) = effect_allele.get(sample.as_str()) {
            if (signed.score - other.score).abs() > 1e-9 {
                diverging += 1;
                tracing::debug!(
                    "scores differ for {}: {} vs {}",
                    sample,
                    signed.score,
                    other.score
                );
            }
        }
    }
    tracing::info!("genoscore lengths {}, {}", scores.signed.len(), scores.effect_allele.len());
    if diverging > 0 {
        tracing::info!("{} samples with diverging scores", diverging);
    }
}

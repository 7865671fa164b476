//! Reconciliation of the records of one variant from several platforms into one record.
//!
//! Reconciliation works in two phases.  First, the genotype cells of each accepted platform
//! record are aligned to the combined sample columns.  Second, each combined column is resolved
//! from the cells that contribute to it: a single cell is taken as-is, overlapping cells are
//! ranked by posterior probability with the platform INFO score as the tie-breaker.

use std::sync::Arc;

use itertools::Itertools;

use crate::{
    common::contig::strip_leading_zero,
    genotype::{max_probability, resolve_genotype, Genotype},
    metrics::AllMetrics,
    record::{CombinedRecord, PlatformRecord, ASSAY_TYPE_TAG},
    sample::SampleDirectory,
};

/// Default minimal posterior probability for accepting a genotype call.
pub const DEFAULT_THRESHOLD: f64 = 0.9;

/// Configuration of the reconciliation.
#[derive(Debug, Clone, derive_builder::Builder)]
#[builder(pattern = "immutable")]
pub struct Config {
    /// Minimal posterior probability; less confident calls become `./.`.
    #[builder(default = "DEFAULT_THRESHOLD")]
    pub threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Short tag appended to the cells of `platform` when its files carry no `AT` field.
pub fn platform_abbreviation(platform: &str) -> Option<&'static str> {
    match platform {
        "affy" => Some("A"),
        "illumina" => Some("I"),
        "affy1KG" => Some("A1"),
        "illumina1KG" => Some("I1"),
        "broad" => Some("B"),
        "metabo" => Some("M"),
        "exome" => Some("E"),
        "bigtest" => Some("T"),
        "biggertest" => Some("G"),
        _ => None,
    }
}

/// One normalized cell contributing to a combined column.
#[derive(Debug, Clone, PartialEq)]
pub struct Contributor {
    /// The normalized cell.
    pub cell: String,
    /// Offset of the `GP` field in `cell`.
    pub probability_offset: Option<usize>,
    /// INFO score of the platform record the cell comes from.
    pub info_score: f64,
}

/// The first field of a cell.
fn genotype_code(cell: &str) -> &str {
    cell.split(':').next().unwrap_or_default()
}

/// Pick the best cell among two or more overlapping `contributors`.
///
/// Contributors are scanned in order.  Whenever a genotype different from the current best one
/// is seen, its maximal probability is compared with the best so far: a higher probability
/// replaces the best; an equal one replaces it only with a strictly higher INFO score.
pub fn best_genotype(contributors: &[Contributor], metrics: &mut AllMetrics) -> String {
    let mut current_code = "";
    let mut best_cell = Genotype::NotPresent.to_string();
    let mut best_prob = 0.0;
    let mut best_info = 0.0;

    let distinct = contributors
        .iter()
        .map(|c| genotype_code(&c.cell))
        .unique()
        .count();
    metrics.mismatch_count += distinct.saturating_sub(1);
    metrics.miss_test_count += contributors
        .iter()
        .filter(|c| genotype_code(&c.cell) == "./.")
        .count();

    for contributor in contributors {
        if contributor.cell == "." {
            metrics.no_assay_count += 1;
            continue;
        }
        let code = genotype_code(&contributor.cell);
        if code == current_code {
            continue;
        }

        let prob = max_probability(&contributor.cell, contributor.probability_offset).value;
        if prob == best_prob {
            metrics.same_prob_diffs += 1;
            if contributor.info_score > best_info {
                current_code = code;
                best_cell.clone_from(&contributor.cell);
                best_prob = prob;
                best_info = contributor.info_score;
            }
        } else {
            if best_prob != 0.0 {
                metrics.diff_prob_diffs += 1;
            }
            if prob > best_prob {
                current_code = code;
                best_cell.clone_from(&contributor.cell);
                best_prob = prob;
                best_info = contributor.info_score;
            }
        }
    }

    if genotype_code(&best_cell) == "./." {
        metrics.missing_count += 1;
    }
    best_cell
}

/// A platform record aligned to the combined columns.
struct AlignedRecord {
    probability_offset: Option<usize>,
    info_score: f64,
    cells: Vec<Option<String>>,
}

/// Reconcile the records of one variant into a single record with one cell per combined
/// sample column of `directory`.
///
/// The variant identity (id, reference, alternative) is taken from the first record; records
/// with a different identity are logged and ignored.  Counters are accumulated into `metrics`.
pub fn reconcile(
    records: &[PlatformRecord],
    directory: &SampleDirectory,
    config: &Config,
    metrics: &mut AllMetrics,
) -> Result<CombinedRecord, anyhow::Error> {
    let first = records
        .first()
        .ok_or_else(|| anyhow::anyhow!("no records to reconcile"))?;
    let saved = &first.record.prefix;
    let width = directory.column_count();

    // Alignment phase.
    let mut aligned = Vec::with_capacity(records.len());
    for PlatformRecord { platform, record } in records {
        metrics.all_geno_count += record.samples.len();
        if !record.prefix.same_variant(saved) {
            tracing::info!(
                "REJ: merge mismatch: {} {} {} {} ({}, {}, {})",
                platform,
                record.prefix.variant_id,
                record.prefix.reference,
                record.prefix.alternative,
                saved.variant_id,
                saved.reference,
                saved.alternative
            );
            continue;
        }

        let abbreviation = if record.prefix.format.has(ASSAY_TYPE_TAG) {
            None
        } else {
            platform_abbreviation(platform)
        };
        let mut cells = vec![None; width];
        for (slot, cell) in record.samples.iter().enumerate() {
            let Some(column) = directory.combined_column(platform, slot) else {
                tracing::debug!("no combined column for {} sample slot {}", platform, slot);
                continue;
            };
            cells[column] = Some(match abbreviation {
                Some(abbreviation) if cell != "." => format!("{}:{}", cell, abbreviation),
                _ => cell.clone(),
            });
        }
        aligned.push(AlignedRecord {
            probability_offset: record.prefix.format.probability_offset(),
            info_score: record.prefix.info_score(),
            cells,
        });
    }

    // Resolution phase.
    let mut samples = Vec::with_capacity(width);
    for column in 0..width {
        let contributors = aligned
            .iter()
            .filter_map(|aligned| {
                aligned.cells[column].as_ref().map(|cell| Contributor {
                    cell: resolve_genotype(cell, config.threshold, aligned.probability_offset)
                        .cell,
                    probability_offset: aligned.probability_offset,
                    info_score: aligned.info_score,
                })
            })
            .collect::<Vec<_>>();

        metrics.unique_geno_count += 1;
        let cell = match contributors.len() {
            0 => Genotype::NotPresent.to_string(),
            1 => {
                let cell = contributors[0].cell.clone();
                if genotype_code(&cell) == "./." {
                    metrics.missing_count += 1;
                }
                cell
            }
            n => {
                metrics.overlap_test_count += 1;
                if n == 2 {
                    metrics.two_overlap_count += 1;
                } else {
                    metrics.gt_two_overlap_count += 1;
                }
                best_genotype(&contributors, metrics)
            }
        };
        samples.push(cell);
    }

    // Finalize the prefix.
    let mut prefix = saved.clone();
    if !prefix.format.has(ASSAY_TYPE_TAG) {
        prefix.format = Arc::new(prefix.format.with_tag(ASSAY_TYPE_TAG));
    }
    prefix.chromosome = strip_leading_zero(&prefix.chromosome).to_string();

    Ok(CombinedRecord { prefix, samples })
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{record::VariantRecord, sample::PlatformSamples};

    fn platform_record(platform: &str, info: &str, cells: &[&str]) -> PlatformRecord {
        let line = format!(
            "02\t1000\trs123\tA\tG\t.\tPASS\t{}\tGT:GP\t{}",
            info,
            cells.join("\t")
        );
        PlatformRecord::new(platform, line.parse::<VariantRecord>().expect("valid record"))
    }

    fn directory(platforms: &[(&str, &[&str])]) -> SampleDirectory {
        let per_platform = platforms
            .iter()
            .map(|(platform, names)| {
                (
                    platform.to_string(),
                    PlatformSamples::from_names(names.iter().copied()),
                )
            })
            .collect::<HashMap<_, _>>();
        let priority = platforms.iter().map(|(p, _)| *p).collect::<Vec<_>>();
        SampleDirectory::new(per_platform, &priority)
    }

    fn contributor(cell: &str, info_score: f64) -> Contributor {
        Contributor {
            cell: cell.to_string(),
            probability_offset: Some(1),
            info_score,
        }
    }

    #[rstest::rstest]
    #[case("affy", Some("A"))]
    #[case("illumina1KG", Some("I1"))]
    #[case("exome", Some("E"))]
    #[case("unknown", None)]
    fn abbreviations(#[case] platform: &str, #[case] expected: Option<&str>) {
        assert_eq!(platform_abbreviation(platform), expected);
    }

    #[test]
    fn config_builder_default() -> Result<(), anyhow::Error> {
        let config = ConfigBuilder::default().build()?;
        assert_eq!(config.threshold, 0.9);

        let config = ConfigBuilder::default().threshold(0.5).build()?;
        assert_eq!(config.threshold, 0.5);

        Ok(())
    }

    #[test]
    fn end_to_end_higher_probability_wins() -> Result<(), anyhow::Error> {
        let directory = directory(&[("affy", &["S1"]), ("illumina", &["S1"])]);
        let records = vec![
            platform_record("affy", ".", &["0/1:0.01,0.98,0.01"]),
            platform_record("illumina", ".", &["0/0:0.95,0.03,0.02"]),
        ];
        let mut metrics = AllMetrics::default();

        let combined = reconcile(&records, &directory, &Config::default(), &mut metrics)?;

        assert_eq!(combined.samples, vec!["0/1:0.01,0.98,0.01:A"]);
        assert_eq!(metrics.mismatch_count, 1);
        assert_eq!(metrics.diff_prob_diffs, 1);
        assert_eq!(metrics.overlap_test_count, 1);
        assert_eq!(combined.prefix.chromosome, "2");
        assert_eq!(combined.prefix.format.to_string(), "GT:GP:AT");
        assert_eq!(
            combined.to_string(),
            "2\t1000\trs123\tA\tG\t.\tPASS\t.\tGT:GP:AT\t0/1:0.01,0.98,0.01:A"
        );

        Ok(())
    }

    #[test]
    fn single_contributor_passthrough() -> Result<(), anyhow::Error> {
        let directory = directory(&[("affy", &["S1", "S2"]), ("illumina", &["S2", "S3"])]);
        let records = vec![
            platform_record("affy", ".", &["1/1:0,0.02,0.98", "0/0:0.97,0.03,0"]),
            platform_record("illumina", ".", &["0/0:0.99,0.01,0", "0/1:0.3,0.4,0.3"]),
        ];
        let mut metrics = AllMetrics::default();

        let combined = reconcile(&records, &directory, &Config::default(), &mut metrics)?;

        assert_eq!(
            combined.samples,
            vec![
                "1/1:0,0.02,0.98:A",
                "0/0:0.97,0.03,0:A",
                "./.:0.3,0.4,0.3:I",
            ]
        );
        assert_eq!(metrics.overlap_test_count, 1);
        assert_eq!(metrics.two_overlap_count, 1);
        assert_eq!(metrics.mismatch_count, 0);
        assert_eq!(metrics.missing_count, 1);
        assert_eq!(metrics.unique_geno_count, 3);
        assert_eq!(metrics.all_geno_count, 4);

        Ok(())
    }

    #[test]
    fn two_versus_more_overlap() -> Result<(), anyhow::Error> {
        let cells = ["0/0:0.99,0.01,0"];

        let directory2 = directory(&[("affy", &["S1"]), ("illumina", &["S1"])]);
        let mut metrics = AllMetrics::default();
        reconcile(
            &[
                platform_record("affy", ".", &cells),
                platform_record("illumina", ".", &cells),
            ],
            &directory2,
            &Config::default(),
            &mut metrics,
        )?;
        assert_eq!(metrics.two_overlap_count, 1);
        assert_eq!(metrics.gt_two_overlap_count, 0);

        let directory3 = directory(&[
            ("affy", &["S1"]),
            ("illumina", &["S1"]),
            ("broad", &["S1"]),
        ]);
        let mut metrics = AllMetrics::default();
        reconcile(
            &[
                platform_record("affy", ".", &cells),
                platform_record("illumina", ".", &cells),
                platform_record("broad", ".", &cells),
            ],
            &directory3,
            &Config::default(),
            &mut metrics,
        )?;
        assert_eq!(metrics.two_overlap_count, 0);
        assert_eq!(metrics.gt_two_overlap_count, 1);

        Ok(())
    }

    #[rstest::rstest]
    #[case::three_codes(["0/0:0.99,0.01,0", "0/1:0,0.95,0.05", "1/1:0,0.02,0.98"], 2, 0)]
    #[case::missing_contributor(["0/0:0.99,0.01,0", "0/1:0.4,0.3,0.3", "1/1:0,0.02,0.98"], 2, 1)]
    #[case::same_codes(["0/0:0.99,0.01,0", "0/0:0.98,0.02,0", "0/0:0.97,0.03,0"], 0, 0)]
    fn three_platform_overlap(
        #[case] cells: [&str; 3],
        #[case] mismatch_count: usize,
        #[case] miss_test_count: usize,
    ) -> Result<(), anyhow::Error> {
        let directory = directory(&[
            ("affy", &["S1"]),
            ("illumina", &["S1"]),
            ("broad", &["S1"]),
        ]);
        let records = vec![
            platform_record("affy", ".", &[cells[0]]),
            platform_record("illumina", ".", &[cells[1]]),
            platform_record("broad", ".", &[cells[2]]),
        ];
        let mut metrics = AllMetrics::default();

        reconcile(&records, &directory, &Config::default(), &mut metrics)?;

        assert_eq!(metrics.mismatch_count, mismatch_count);
        assert_eq!(metrics.miss_test_count, miss_test_count);
        assert_eq!(metrics.overlap_test_count, 1);
        assert_eq!(metrics.two_overlap_count, 0);
        assert_eq!(metrics.gt_two_overlap_count, 1);

        Ok(())
    }

    #[test]
    fn contributors_carry_record_info_score() -> Result<(), anyhow::Error> {
        let directory = directory(&[("affy", &["S1", "S2"]), ("illumina", &["S1", "S2"])]);
        let records = vec![
            platform_record(
                "affy",
                "INFO=0.8",
                &["0/0:0.95,0.05,0", "1/1:0,0.05,0.95"],
            ),
            platform_record(
                "illumina",
                "INFO=0.97",
                &["1/1:0,0.05,0.95", "0/0:0.95,0.05,0"],
            ),
        ];
        let mut metrics = AllMetrics::default();

        let combined = reconcile(&records, &directory, &Config::default(), &mut metrics)?;

        assert_eq!(
            combined.samples,
            vec!["1/1:0,0.05,0.95:I", "0/0:0.95,0.05,0:I"]
        );
        assert_eq!(metrics.same_prob_diffs, 2);

        Ok(())
    }

    #[test]
    fn tie_broken_by_info_score() -> Result<(), anyhow::Error> {
        let directory = directory(&[("affy", &["S1"]), ("illumina", &["S1"])]);
        let records = vec![
            platform_record("affy", "INFO=0.8", &["0/0:0.95,0.05,0"]),
            platform_record("illumina", "INFO=0.97", &["1/1:0,0.05,0.95"]),
        ];
        let mut metrics = AllMetrics::default();

        let combined = reconcile(&records, &directory, &Config::default(), &mut metrics)?;

        assert_eq!(combined.samples, vec!["1/1:0,0.05,0.95:I"]);
        assert_eq!(metrics.same_prob_diffs, 1);
        assert_eq!(metrics.mismatch_count, 1);

        Ok(())
    }

    #[test]
    fn mismatching_identity_is_rejected() -> Result<(), anyhow::Error> {
        let directory = directory(&[("affy", &["S1"]), ("illumina", &["S1"])]);
        let mut other = platform_record("illumina", ".", &["1/1:0,0,1"]);
        other.record.prefix.alternative = "T".to_string();
        let records = vec![platform_record("affy", ".", &["0/0:1,0,0"]), other];
        let mut metrics = AllMetrics::default();

        let combined = reconcile(&records, &directory, &Config::default(), &mut metrics)?;

        assert_eq!(combined.samples, vec!["0/0:1,0,0:A"]);
        assert_eq!(metrics.overlap_test_count, 0);

        Ok(())
    }

    #[test]
    fn empty_input_is_an_error() {
        let directory = directory(&[("affy", &["S1"])]);
        let mut metrics = AllMetrics::default();

        assert!(reconcile(&[], &directory, &Config::default(), &mut metrics).is_err());
    }

    #[test]
    fn existing_assay_tag_is_kept() -> Result<(), anyhow::Error> {
        let directory = directory(&[("affy", &["S1", "S2"])]);
        let record: VariantRecord = "10\t5\trs1\tC\tT\t.\t.\t.\tGT:GP:AT\t0/0:1,0,0:X\t.".parse()?;
        let mut metrics = AllMetrics::default();

        let combined = reconcile(
            &[PlatformRecord::new("affy", record)],
            &directory,
            &Config::default(),
            &mut metrics,
        )?;

        assert_eq!(
            combined.to_string(),
            "10\t5\trs1\tC\tT\t.\t.\t.\tGT:GP:AT\t0/0:1,0,0:X\t."
        );
        assert_eq!(metrics.missing_count, 0);

        Ok(())
    }

    #[test]
    fn best_genotype_skips_not_present() {
        let mut metrics = AllMetrics::default();

        let best = best_genotype(
            &[contributor(".", 1.0), contributor("0/1:0.1,0.9,0", 1.0)],
            &mut metrics,
        );

        assert_eq!(best, "0/1:0.1,0.9,0");
        assert_eq!(metrics.no_assay_count, 1);
        assert_eq!(metrics.mismatch_count, 1);
    }

    #[test]
    fn best_genotype_all_missing() {
        let mut metrics = AllMetrics::default();

        let best = best_genotype(
            &[
                contributor("./.:0.5,0.3,0.2", 1.0),
                contributor("./.:0.4,0.4,0.2", 1.0),
            ],
            &mut metrics,
        );

        assert_eq!(best, "./.:0.5,0.3,0.2");
        assert_eq!(metrics.miss_test_count, 2);
        assert_eq!(metrics.mismatch_count, 0);
        assert_eq!(metrics.missing_count, 1);
    }
}

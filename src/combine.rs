//! Combination of the platform records of a list of variants.

use std::{collections::HashMap, io::Write, sync::Arc};

use clap::Parser;

use crate::{
    common::{
        self,
        contig::ChromosomeNaming,
        io::std::{open_output, read_lines},
    },
    fetch::{fetch_records_blocking, DEFAULT_MAX_OPEN_FILES},
    lookup::{CatalogLookup, VariantLookup},
    metrics::AllMetrics,
    reconcile::{self, reconcile, DEFAULT_THRESHOLD},
    record::CombinedRecord,
    sample::SampleDirectory,
    tabix::{GenotypeFileReader, TabixFileReader},
};

/// Command line arguments for `combine` sub command.
#[derive(Parser, Debug)]
#[command(about = "Combine the genotypes of variants across platforms", long_about = None)]
pub struct Args {
    /// Path to the variant catalog directory.
    #[arg(long)]
    pub path_catalog: String,
    /// Path to a file with one variant id per line.
    #[arg(long, short = 'r', required_unless_present = "variant_id")]
    pub path_variants: Option<String>,
    /// A single variant id, instead of `--path-variants`.
    #[arg(long, short = 'i', conflicts_with = "path_variants")]
    pub variant_id: Option<String>,
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

/// Result of combining a list of variants.
#[derive(Debug, Clone, Default)]
pub struct Combined {
    /// The column header line.
    pub header: String,
    /// Combined sample names in column order.
    pub sample_names: Vec<String>,
    /// One record per found variant, in request order.
    pub records: Vec<CombinedRecord>,
    /// Counters over all variants.
    pub totals: AllMetrics,
}

/// Fetch and reconcile the records of `variant_ids`.
#[allow(clippy::too_many_arguments)]
pub fn combine_variants<L, G>(
    lookup: &L,
    reader: Arc<G>,
    naming: Arc<ChromosomeNaming>,
    variant_ids: &[String],
    accepted: &[String],
    config: &reconcile::Config,
    max_open_files: usize,
    metrics_level: u8,
) -> Result<Combined, anyhow::Error>
where
    L: VariantLookup + ?Sized,
    G: GenotypeFileReader + 'static,
{
    let fetched = fetch_records_blocking(
        lookup,
        reader,
        naming,
        variant_ids,
        accepted,
        max_open_files,
    )?;

    let per_platform = fetched
        .platforms
        .iter()
        .filter_map(|platform| {
            lookup
                .platform_samples(platform)
                .map(|samples| (platform.clone(), samples.clone()))
        })
        .collect::<HashMap<_, _>>();
    let directory = SampleDirectory::new(per_platform, &fetched.platforms);
    let (header, sample_names) = directory.combined_column_headers();

    let mut totals = AllMetrics::default();
    let mut records = Vec::new();
    for (variant_id, platform_records) in &fetched.records {
        if platform_records.is_empty() {
            tracing::info!("no records for {}", variant_id);
            continue;
        }
        let mut metrics = AllMetrics::default();
        records.push(reconcile(platform_records, &directory, config, &mut metrics)?);
        metrics.log_metrics(metrics_level, variant_id, 1, "##VARIANT");
        totals += metrics;
    }
    totals.log_metrics(2, "all", records.len(), "##TOTAL");

    Ok(Combined {
        header,
        sample_names,
        records,
        totals,
    })
}

/// Variant ids from `--variant-id` or the lines of `--path-variants`.
pub fn load_variant_ids(
    variant_id: Option<&str>,
    path_variants: Option<&str>,
) -> Result<Vec<String>, anyhow::Error> {
    if let Some(variant_id) = variant_id {
        return Ok(vec![variant_id.to_string()]);
    }
    let Some(path) = path_variants else {
        anyhow::bail!("neither variant id nor variant list given");
    };
    let mut result = Vec::new();
    for line in read_lines(path)
        .map_err(|e| anyhow::anyhow!("could not open variant list {}: {}", path, e))?
    {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() {
            result.push(line.to_string());
        }
    }
    Ok(result)
}

/// Main entry point for `combine` sub command.
pub fn run(common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("Starting combine\ncommon args: {:#?}\nargs: {:#?}", common, args);

    let variant_ids = load_variant_ids(args.variant_id.as_deref(), args.path_variants.as_deref())?;
    tracing::info!("Combining {} variants", variant_ids.len());
    let lookup = CatalogLookup::load(&args.path_catalog, args.vcf_prefix.as_deref())?;
    let config = reconcile::ConfigBuilder::default()
        .threshold(args.threshold)
        .build()?;

    let combined = combine_variants(
        &lookup,
        Arc::new(TabixFileReader),
        Arc::new(lookup.naming()),
        &variant_ids,
        &common::split_platforms(&args.platforms),
        &config,
        args.max_open_files,
        common.metrics_level,
    )?;

    let mut writer = open_output(&args.path_output)?;
    writeln!(writer, "{}", &combined.header)?;
    for record in &combined.records {
        writeln!(writer, "{}", record)?;
    }
    writer.flush()?;

    combined.totals.log_totals("EXIT", combined.records.len());
    common::trace_rss_now();
    Ok(())
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::fetch::test::{fixture, naming};

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn combine_fixture() -> Result<(), anyhow::Error> {
        let (lookup, reader) = fixture();

        let combined = combine_variants(
            &lookup,
            Arc::new(reader),
            Arc::new(naming()),
            &strings(&["rs1", "rs404", "rs2"]),
            &strings(&["affy", "illumina"]),
            &reconcile::Config::default(),
            DEFAULT_MAX_OPEN_FILES,
            0,
        )?;

        assert_eq!(combined.sample_names, vec!["S1", "S2", "S3"]);
        assert_eq!(
            combined
                .records
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>(),
            vec![
                "2\t100\trs1\tA\tG\t.\tPASS\t.\tGT:GP:AT\t0/1:0.01,0.98,0.01:A\t0/0:0.95,0.03,0.02:A\t1/1:0,0.01,0.99:I",
                "10\t200\trs2\tC\tT\t.\tPASS\t.\tGT:GP:AT\t1/1:0,0,1:A\t0/1:0,1,0:A\t.",
            ]
        );
        assert_eq!(combined.totals.overlap_test_count, 1);
        assert_eq!(combined.totals.mismatch_count, 0);

        Ok(())
    }

    #[test]
    fn combine_repeated_variant_id() -> Result<(), anyhow::Error> {
        let (lookup, reader) = fixture();

        let combined = combine_variants(
            &lookup,
            Arc::new(reader),
            Arc::new(naming()),
            &strings(&["rs1", "rs2", "rs1"]),
            &strings(&["affy", "illumina"]),
            &reconcile::Config::default(),
            4,
            0,
        )?;

        assert_eq!(
            combined
                .records
                .iter()
                .map(|r| r.prefix.variant_id.as_str())
                .collect::<Vec<_>>(),
            vec!["rs1", "rs2"]
        );

        Ok(())
    }

    #[test]
    fn variant_ids_from_file() ->Result<(), anyhow::Error> {
        assert_eq!(
            load_variant_ids(None, Some("tests/data/combine/variants.txt"))?,
            vec!["rs123", "rs456"]
        );
        assert_eq!(load_variant_ids(Some("rs1"), None)?, vec!["rs1"]);
        assert!(load_variant_ids(None, None).is_err());

        Ok(())
    }
}

//! Lookup of variant locations and platform sample lists.
//!
//! The file-backed [`CatalogLookup`] reads a catalog directory with three TSV tables:
//!
//! 1. `variants.tsv`: `platform`, `variant_id`, `chromosome`, `position`, `reference`,
//!    `alternative`
//! 2. `filepaths.tsv`: `platform`, `directory`, `suffix`, `strip_leading_zero`
//! 3. `samples.tsv`: `platform`, `sample_id`, `list_posn`
//!
//! Genotype files are stored per chromosome as `chr<CC>.vcf.gz` with the chromosome
//! zero-padded to two characters.  Without a VCF path prefix, they live in the platform's
//! `directory`; with a prefix, in `<prefix>/<suffix>`.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{
    common::contig::{pad_chromosome, ChromosomeNaming},
    sample::PlatformSamples,
};

/// Location of a variant in the files of one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantLocation {
    pub platform: String,
    /// Chromosome, zero-padded to two characters.
    pub chromosome: String,
    pub position: u64,
    pub reference: String,
    pub alternative: String,
    /// The per-chromosome genotype file.
    pub path: PathBuf,
}

/// Source of variant locations and per-platform sample lists.
pub trait VariantLookup {
    /// Locations of `variant_id` on all platforms; empty if the variant is unknown.
    fn lookup(&self, variant_id: &str) -> Result<Vec<VariantLocation>, anyhow::Error>;

    /// Sample list of `platform`, if known.
    fn platform_samples(&self, platform: &str) -> Option<&PlatformSamples>;
}

/// Row of `variants.tsv`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct VariantRow {
    platform: String,
    variant_id: String,
    chromosome: String,
    position: u64,
    reference: String,
    alternative: String,
}

/// Row of `filepaths.tsv`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct FilePathRow {
    platform: String,
    directory: String,
    suffix: String,
    strip_leading_zero: bool,
}

/// Row of `samples.tsv`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct SampleRow {
    platform: String,
    sample_id: String,
    list_posn: usize,
}

fn read_table<T, P>(path: P) -> Result<Vec<T>, anyhow::Error>
where
    T: for<'de> Deserialize<'de>,
    P: AsRef<Path>,
{
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .has_headers(true)
        .from_path(path.as_ref())
        .map_err(|e| anyhow::anyhow!("could not open {}: {}", path.as_ref().display(), e))?;
    let mut result = Vec::new();
    for row in rdr.deserialize() {
        result.push(row?);
    }
    Ok(result)
}

/// [`VariantLookup`] backed by a catalog directory.
#[derive(Debug, Clone, Default)]
pub struct CatalogLookup {
    variants: HashMap<String, Vec<VariantRow>>,
    file_paths: HashMap<String, FilePathRow>,
    samples: HashMap<String, PlatformSamples>,
    vcf_prefix: Option<String>,
}

impl CatalogLookup {
    /// Load the catalog from `dir`; `vcf_prefix` overrides the file directories.
    pub fn load<P: AsRef<Path>>(dir: P, vcf_prefix: Option<&str>) -> Result<Self, anyhow::Error> {
        let dir = dir.as_ref();
        tracing::info!("Loading catalog from {}", dir.display());

        let mut variants: HashMap<String, Vec<VariantRow>> = HashMap::new();
        for row in read_table::<VariantRow, _>(dir.join("variants.tsv"))? {
            variants.entry(row.variant_id.clone()).or_default().push(row);
        }
        let file_paths = read_table::<FilePathRow, _>(dir.join("filepaths.tsv"))?
            .into_iter()
            .map(|row| (row.platform.clone(), row))
            .collect::<HashMap<_, _>>();

        let mut sample_rows: HashMap<String, Vec<(String, usize)>> = HashMap::new();
        for row in read_table::<SampleRow, _>(dir.join("samples.tsv"))? {
            sample_rows
                .entry(row.platform)
                .or_default()
                .push((row.sample_id, row.list_posn));
        }
        let samples = sample_rows
            .into_iter()
            .map(|(platform, rows)| (platform, PlatformSamples::from_entries(rows)))
            .collect::<HashMap<_, _>>();

        tracing::info!(
            "Catalog has {} variant ids, {} platform paths, {} sample lists",
            variants.len(),
            file_paths.len(),
            samples.len()
        );
        Ok(Self {
            variants,
            file_paths,
            samples,
            vcf_prefix: vcf_prefix.map(String::from),
        })
    }

    /// Per-platform chromosome naming as configured in `filepaths.tsv`.
    pub fn naming(&self) -> ChromosomeNaming {
        ChromosomeNaming::new(
            self.file_paths
                .values()
                .map(|row| (row.platform.clone(), row.strip_leading_zero)),
        )
    }

    fn file_path(&self, row: &FilePathRow, chromosome: &str) -> PathBuf {
        let file_name = format!("chr{}.vcf.gz", chromosome);
        match &self.vcf_prefix {
            Some(prefix) => Path::new(prefix).join(&row.suffix).join(file_name),
            None => Path::new(&row.directory).join(file_name),
        }
    }
}

impl VariantLookup for CatalogLookup {
    fn lookup(&self, variant_id: &str) -> Result<Vec<VariantLocation>, anyhow::Error> {
        let Some(rows) = self.variants.get(variant_id) else {
            tracing::info!("NOT FOUND {}", variant_id);
            return Ok(Vec::new());
        };

        rows.iter()
            .map(|row| {
                let file_path = self.file_paths.get(&row.platform).ok_or_else(|| {
                    anyhow::anyhow!("no file path configured for platform {}", row.platform)
                })?;
                let chromosome = pad_chromosome(&row.chromosome);
                Ok(VariantLocation {
                    platform: row.platform.clone(),
                    path: self.file_path(file_path, &chromosome),
                    chromosome,
                    position: row.position,
                    reference: row.reference.clone(),
                    alternative: row.alternative.clone(),
                })
            })
            .collect()
    }

    fn platform_samples(&self, platform: &str) -> Option<&PlatformSamples> {
        self.samples.get(platform)
    }
}

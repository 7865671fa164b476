//! Chromosome name harmonization.
//!
//! The variant catalog stores single-digit chromosomes zero-padded (`"02"`), which is also how
//! the per-chromosome files are named (`chr02.vcf.gz`).  Whether the contig names *inside* a
//! platform's files carry the leading zero depends on the platform.

use std::collections::HashMap;

/// Strip a single leading zero from a chromosome name, e.g. `"02"` becomes `"2"`.
///
/// Names that are only `"0"` are left untouched.
pub fn strip_leading_zero(chrom: &str) -> &str {
    match chrom.strip_prefix('0') {
        Some(rest) if !rest.is_empty() => rest,
        _ => chrom,
    }
}

/// Pad a single-character chromosome name with a leading zero, e.g. `"2"` becomes `"02"`.
pub fn pad_chromosome(chrom: &str) -> String {
    if chrom.len() == 1 {
        format!("0{}", chrom)
    } else {
        chrom.to_string()
    }
}

/// Per-platform chromosome naming convention used for querying files.
#[derive(Debug, Clone, Default)]
pub struct ChromosomeNaming {
    /// Platforms whose files use unpadded single-digit chromosome names.
    strip_leading_zero: HashMap<String, bool>,
}

impl ChromosomeNaming {
    /// Construct from `(platform, strip_leading_zero)` pairs.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        Self {
            strip_leading_zero: entries
                .into_iter()
                .map(|(platform, strip)| (platform.into(), strip))
                .collect(),
        }
    }

    /// Set the convention for one platform.
    pub fn set(&mut self, platform: &str, strip_leading_zero: bool) {
        self.strip_leading_zero
            .insert(platform.to_string(), strip_leading_zero);
    }

    /// Return the chromosome name to use for querying the files of `platform`.
    ///
    /// Platforms without a registered convention keep the name as given.
    pub fn query_name<'a>(&self, platform: &str, chrom: &'a str) -> &'a str {
        if self
            .strip_leading_zero
            .get(platform)
            .copied()
            .unwrap_or(false)
        {
            strip_leading_zero(chrom)
        } else {
            chrom
        }
    }
}

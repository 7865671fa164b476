//! Tab-delimited variant records as found in the platform VCF files.
//!
//! A record is split into the fixed nine-column prefix (`CHROM` to `FORMAT`) and the
//! per-sample genotype cells.  Only the fields read by the reconciliation and metrics code
//! are interpreted, everything else is carried through as text.

use std::{fmt::Display, str::FromStr, sync::Arc};

use quick_cache::unsync::Cache;

/// Number of fixed columns before the first sample column.
pub const PREFIX_COLUMNS: usize = 9;

/// Column names of the fixed prefix.
pub const HEADER_PREFIX: [&str; PREFIX_COLUMNS] = [
    "#CHROM", "POS", "ID", "REF", "ALT", "QUAL", "FILTER", "INFO", "FORMAT",
];

/// FORMAT tag of the genotype posterior probabilities.
pub const PROBABILITY_TAG: &str = "GP";

/// FORMAT tag of the assay type of origin.
pub const ASSAY_TYPE_TAG: &str = "AT";

/// INFO key of the imputation quality score.
pub const INFO_SCORE_KEY: &str = "INFO";

/// INFO key of the reference panel allele frequency.
pub const REF_PANEL_AF_KEY: &str = "RefPanelAF";

/// Build the column header line for the given sample names.
pub fn header_line<S: AsRef<str>>(sample_names: &[S]) -> String {
    HEADER_PREFIX
        .iter()
        .copied()
        .chain(sample_names.iter().map(|s| s.as_ref()))
        .collect::<Vec<_>>()
        .join("\t")
}

/// Offsets of the colon-separated FORMAT tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    tags: Vec<String>,
}

impl RecordLayout {
    /// Parse the FORMAT column.
    pub fn parse(format: &str) -> Self {
        Self {
            tags: format.split(':').map(String::from).collect(),
        }
    }

    /// Offset of `tag` in the genotype cells, `None` if absent.
    pub fn offset(&self, tag: &str) -> Option<usize> {
        self.tags.iter().position(|t| t == tag)
    }

    /// Offset of the `GP` field.
    pub fn probability_offset(&self) -> Option<usize> {
        self.offset(PROBABILITY_TAG)
    }

    /// Whether `tag` is present.
    pub fn has(&self, tag: &str) -> bool {
        self.offset(tag).is_some()
    }

    /// Return a copy with `tag` appended.
    pub fn with_tag(&self, tag: &str) -> Self {
        let mut tags = self.tags.clone();
        tags.push(tag.to_string());
        Self { tags }
    }

    /// The tags, in order.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl Display for RecordLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tags.join(":"))
    }
}

/// Cache of parsed `RecordLayout`s, keyed by the FORMAT string.
///
/// Platform files use one or very few distinct FORMAT strings, so the cache stays tiny.
pub struct LayoutCache {
    cache: Cache<String, Arc<RecordLayout>>,
}

impl Default for LayoutCache {
    fn default() -> Self {
        Self::new(64)
    }
}

impl LayoutCache {
    /// Construct a cache holding up to `capacity` layouts.
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Cache::new(capacity),
        }
    }

    /// Return the layout for `format`, parsing it on first use.
    pub fn get(&mut self, format: &str) -> Arc<RecordLayout> {
        if let Some(layout) = self.cache.get(format) {
            return layout.clone();
        }
        let layout = Arc::new(RecordLayout::parse(format));
        self.cache.insert(format.to_string(), layout.clone());
        layout
    }
}

/// The fixed nine columns of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPrefix {
    pub chromosome: String,
    pub position: u64,
    pub variant_id: String,
    pub reference: String,
    pub alternative: String,
    pub quality: String,
    pub filter: String,
    /// Semicolon-separated `key=value` pairs.
    pub info: String,
    pub format: Arc<RecordLayout>,
}

impl RecordPrefix {
    /// Value of INFO `key`, if present.
    pub fn info_value(&self, key: &str) -> Option<&str> {
        self.info.split(';').find_map(|entry| {
            let mut kv = entry.split('=');
            match (kv.next(), kv.next(), kv.next()) {
                (Some(k), Some(v), None) if k == key => Some(v),
                _ => None,
            }
        })
    }

    /// Platform imputation quality score; 1.0 when absent, 0.0 when unparsable.
    pub fn info_score(&self) -> f64 {
        self.info_value(INFO_SCORE_KEY)
            .map(|v| v.parse().unwrap_or(0.0))
            .unwrap_or(1.0)
    }

    /// Reference panel allele frequency; 0.0 when absent or unparsable.
    pub fn ref_panel_af(&self) -> f64 {
        self.info_value(REF_PANEL_AF_KEY)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0)
    }

    /// Whether id and alleles are the same as in `other`.
    pub fn same_variant(&self, other: &RecordPrefix) -> bool {
        self.variant_id == other.variant_id
            && self.reference == other.reference
            && self.alternative == other.alternative
    }
}

impl Display for RecordPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.chromosome,
            self.position,
            self.variant_id,
            self.reference,
            self.alternative,
            self.quality,
            self.filter,
            self.info,
            self.format
        )
    }
}

/// One record: prefix plus one genotype cell per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantRecord {
    pub prefix: RecordPrefix,
    pub samples: Vec<String>,
}

impl VariantRecord {
    /// Parse one tab-separated data line, looking up the FORMAT layout in `layouts`.
    pub fn parse(line: &str, layouts: &mut LayoutCache) -> Result<Self, anyhow::Error> {
        let line = line.trim_end_matches(['\n', '\r']);
        let fields = line.split('\t').collect::<Vec<_>>();
        if fields.len() < PREFIX_COLUMNS {
            anyhow::bail!(
                "expected at least {} columns but found {}",
                PREFIX_COLUMNS,
                fields.len()
            );
        }
        let position = fields[1]
            .parse::<u64>()
            .map_err(|e| anyhow::anyhow!("invalid position {:?}: {}", fields[1], e))?;

        Ok(Self {
            prefix: RecordPrefix {
                chromosome: fields[0].to_string(),
                position,
                variant_id: fields[2].to_string(),
                reference: fields[3].to_string(),
                alternative: fields[4].to_string(),
                quality: fields[5].to_string(),
                filter: fields[6].to_string(),
                info: fields[7].to_string(),
                format: layouts.get(fields[8]),
            },
            samples: fields[PREFIX_COLUMNS..]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        })
    }
}

impl FromStr for VariantRecord {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, &mut LayoutCache::new(1))
    }
}

impl Display for VariantRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.prefix)?;
        for sample in &self.samples {
            write!(f, "\t{}", sample)?;
        }
        Ok(())
    }
}

/// A record tagged with the platform (assay type) it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformRecord {
    pub platform: String,
    pub record: VariantRecord,
}

impl PlatformRecord {
    pub fn new(platform: &str, record: VariantRecord) -> Self {
        Self {
            platform: platform.to_string(),
            record,
        }
    }
}

/// The reconciled record for one variant, one cell per combined sample column.
pub type CombinedRecord = VariantRecord;

/// Sample names from a `#CHROM` header line.
pub fn sample_names_from_header(line: &str) -> Result<Vec<String>, anyhow::Error> {
    let line = line.trim_end_matches(['\n', '\r']);
    let fields = line.split('\t').collect::<Vec<_>>();
    if !line.starts_with("#CHROM") || fields.len() < PREFIX_COLUMNS {
        anyhow::bail!("not a column header line: {:?}", line);
    }
    Ok(fields[PREFIX_COLUMNS..]
        .iter()
        .map(|s| s.to_string())
        .collect())
}

/// Read the header lines of a VCF file up to and including the `#CHROM` line.
///
/// Leaves `reader` positioned at the first data line.
pub fn read_header_lines<R: std::io::BufRead>(reader: &mut R) -> Result<Vec<String>, anyhow::Error> {
    let mut lines = Vec::new();
    let mut buf = String::new();
    loop {
        buf.clear();
        if reader.read_line(&mut buf)? == 0 {
            anyhow::bail!("no column header line found");
        }
        let line = buf.trim_end_matches(['\n', '\r']).to_string();
        let is_column_header = !line.starts_with("##") && line.starts_with('#');
        lines.push(line);
        if is_column_header {
            return Ok(lines);
        }
    }
}

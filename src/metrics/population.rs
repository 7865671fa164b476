//! Per-record population genetics metrics: call rate, allele frequencies, HWE p-value.

use crate::genotype::{resolve_genotype, Genotype};
use crate::record::VariantRecord;

use super::hwe::hw_exact_p_value;

/// Genotype counts over the sample cells of one record.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenotypeCounts {
    pub hom_ref: u64,
    pub hom_alt: u64,
    pub het: u64,
    /// Cells other than the literal `.`.
    pub total_typed: u64,
    /// Typed cells resolving to `./.`.
    pub missing: u64,
    /// Literal `.` cells.
    pub not_present: u64,
    /// INFO `RefPanelAF`, 0.0 if absent.
    pub ref_panel_af: f64,
}

/// Count the resolved genotypes of `record` under probability `threshold`.
pub fn genotype_counts(record: &VariantRecord, threshold: f64) -> GenotypeCounts {
    let probability_offset = record.prefix.format.probability_offset();
    let mut counts = GenotypeCounts {
        ref_panel_af: record.prefix.ref_panel_af(),
        ..Default::default()
    };

    for cell in &record.samples {
        if cell == "." {
            counts.not_present += 1;
            continue;
        }
        counts.total_typed += 1;
        match resolve_genotype(cell, threshold, probability_offset).genotype {
            Genotype::HomRef => counts.hom_ref += 1,
            Genotype::Het => counts.het += 1,
            Genotype::HomAlt => counts.hom_alt += 1,
            Genotype::MissingCalled => counts.missing += 1,
            Genotype::NotPresent => counts.not_present += 1,
        }
    }

    counts
}

/// Metrics of one record.
///
/// With no typed samples (or no called samples) the rates and frequencies are NaN or
/// infinite, following IEEE division semantics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordMetrics {
    pub call_rate: f64,
    pub ref_af: f64,
    pub alt_af: f64,
    pub maf: f64,
    pub hwe_p: f64,
    pub het: u64,
    /// Count of the more frequent homozygote.
    pub major_hom: u64,
    /// Count of the less frequent homozygote.
    pub minor_hom: u64,
    /// Typed samples with a non-missing call.
    pub n: u64,
    pub missing: u64,
    pub not_present: u64,
    pub ref_panel_af: f64,
}

/// Compute the metrics of `record` under probability `threshold`.
pub fn metrics_for_record(record: &VariantRecord, threshold: f64) -> RecordMetrics {
    let counts = genotype_counts(record, threshold);
    let n = counts.total_typed - counts.missing;

    let call_rate =
        (counts.hom_ref + counts.het + counts.hom_alt) as f64 / counts.total_typed as f64;
    let ref_af = (2 * counts.hom_ref + counts.het) as f64 / (2 * n) as f64;
    let alt_af = (2 * counts.hom_alt + counts.het) as f64 / (2 * n) as f64;
    let maf = if ref_af < alt_af { ref_af } else { alt_af };

    RecordMetrics {
        call_rate,
        ref_af,
        alt_af,
        maf,
        hwe_p: hw_exact_p_value(counts.het, counts.hom_ref, counts.hom_alt),
        het: counts.het,
        major_hom: counts.hom_ref.max(counts.hom_alt),
        minor_hom: counts.hom_ref.min(counts.hom_alt),
        n,
        missing: counts.missing,
        not_present: counts.not_present,
        ref_panel_af: counts.ref_panel_af,
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn record(cells: &[&str]) -> VariantRecord {
        format!(
            "1\t100\trs1\tA\tG\t.\t.\tRefPanelAF=0.3\tGT:GP\t{}",
            cells.join("\t")
        )
        .parse()
        .expect("valid record")
    }

    #[test]
    fn counts() {
        let record = record(&[
            "0/0:0.99,0.01,0",
            "0/1:0.01,0.98,0.01",
            "1/0:0.01,0.98,0.01",
            "1/1:0,0.05,0.95",
            "0/0:0.5,0.4,0.1",
            ".",
        ]);

        assert_eq!(
            genotype_counts(&record, 0.9),
            GenotypeCounts {
                hom_ref: 1,
                hom_alt: 1,
                het: 2,
                total_typed: 5,
                missing: 1,
                not_present: 1,
                ref_panel_af: 0.3,
            }
        );
    }

    #[test]
    fn metrics() {
        let record = record(&[
            "0/0:0.99,0.01,0",
            "0/0:0.99,0.01,0",
            "0/1:0.01,0.98,0.01",
            "1/1:0,0.05,0.95",
            "./.:0.5,0.4,0.1",
        ]);
        let metrics = metrics_for_record(&record, 0.9);

        assert_eq!(metrics.call_rate, 0.8);
        assert_eq!(metrics.n, 4);
        assert_eq!(metrics.ref_af, 5.0 / 8.0);
        assert_eq!(metrics.alt_af, 3.0 / 8.0);
        assert_eq!(metrics.maf, 3.0 / 8.0);
        assert_eq!(metrics.major_hom, 2);
        assert_eq!(metrics.minor_hom, 1);
        assert_eq!(metrics.hwe_p, hw_exact_p_value(1, 2, 1));
    }

    #[test]
    fn metrics_without_typed_samples_are_nan() {
        let metrics = metrics_for_record(&record(&[".", "."]), 0.9);

        assert!(metrics.call_rate.is_nan());
        assert!(metrics.maf.is_nan());
        assert_eq!(metrics.hwe_p, 1.0);
        assert_eq!(metrics.not_present, 2);
    }
}

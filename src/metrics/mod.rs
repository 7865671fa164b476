//! Counters of the reconciliation and per-record population metrics.

pub mod hwe;
pub mod population;

use std::ops::AddAssign;

/// Counters accumulated while reconciling genotypes.
///
/// Zero-initialized per variant or per run; per-variant values are rolled up into run totals
/// with `+=`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllMetrics {
    /// Genotype cells seen in accepted platform records.
    pub all_geno_count: usize,
    /// Combined-record slots processed.
    pub unique_geno_count: usize,
    /// Slots with more than one contributing platform.
    pub overlap_test_count: usize,
    /// Overlapping slots with exactly two platforms.
    pub two_overlap_count: usize,
    /// Overlapping slots with more than two platforms.
    pub gt_two_overlap_count: usize,
    /// Number of differing genotypes in overlapping slots.
    pub mismatch_count: usize,
    /// Resolution decisions between different probabilities.
    pub diff_prob_diffs: usize,
    /// Resolution decisions between equal probabilities.
    pub same_prob_diffs: usize,
    /// Missing (`./.`) calls among overlapping contributors.
    pub miss_test_count: usize,
    /// Slots that are missing after resolution.
    pub missing_count: usize,
    /// Contributors without any assay data (`.`).
    pub no_assay_count: usize,
}

impl AddAssign for AllMetrics {
    fn add_assign(&mut self, rhs: Self) {
        self.all_geno_count += rhs.all_geno_count;
        self.unique_geno_count += rhs.unique_geno_count;
        self.overlap_test_count += rhs.overlap_test_count;
        self.two_overlap_count += rhs.two_overlap_count;
        self.gt_two_overlap_count += rhs.gt_two_overlap_count;
        self.mismatch_count += rhs.mismatch_count;
        self.diff_prob_diffs += rhs.diff_prob_diffs;
        self.same_prob_diffs += rhs.same_prob_diffs;
        self.miss_test_count += rhs.miss_test_count;
        self.missing_count += rhs.missing_count;
        self.no_assay_count += rhs.no_assay_count;
    }
}

impl AllMetrics {
    /// Percentage of mismatching genotypes among overlapping slots, 0 without mismatches.
    pub fn error_pct(&self) -> f64 {
        if self.mismatch_count == 0 {
            0.0
        } else {
            self.mismatch_count as f64 / self.overlap_test_count as f64 * 100.0
        }
    }

    /// Log the counters; `level` 0 logs nothing, 1 a summary, 2 everything.
    pub fn log_metrics(&self, level: u8, variant_id: &str, snp_count: usize, msg: &str) {
        if level > 0 {
            tracing::info!("{},{},SNPCount={}", msg, variant_id, snp_count);
            tracing::info!("{},{},ErrPct={:.3}", msg, variant_id, self.error_pct());
        }
        if level > 1 {
            tracing::info!("{},{},AllGenos={}", msg, variant_id, self.all_geno_count);
            tracing::info!("{},{},UniqueGenos={}", msg, variant_id, self.unique_geno_count);
            tracing::info!("{},{},Alloverlap={}", msg, variant_id, self.overlap_test_count);
            tracing::info!("{},{},Two={}", msg, variant_id, self.two_overlap_count);
            tracing::info!("{},{},GTTwo={}", msg, variant_id, self.gt_two_overlap_count);
            tracing::info!("{},{},OverlapGenoDiffs={}", msg, variant_id, self.mismatch_count);
            tracing::info!("{},{},DiffProbDiffs={}", msg, variant_id, self.diff_prob_diffs);
            tracing::info!("{},{},SameProbDiffs={}", msg, variant_id, self.same_prob_diffs);
            tracing::info!("{},{},MissingGenoTested={}", msg, variant_id, self.miss_test_count);
            tracing::info!("{},{},MissingUnresolved={}", msg, variant_id, self.missing_count);
            tracing::info!("{},{},NoAssay={}", msg, variant_id, self.no_assay_count);
        }
    }

    /// Log run totals, always at info level.
    pub fn log_totals(&self, msg: &str, written: usize) {
        tracing::info!(
            "{},wrt={},AllGenos={},UniqueGenos={},Alloverlap={},Two={},GTTwo={}",
            msg,
            written,
            self.all_geno_count,
            self.unique_geno_count,
            self.overlap_test_count,
            self.two_overlap_count,
            self.gt_two_overlap_count
        );
        tracing::info!(
            "{},OverlapGenoDiffs={},DiffProbDiffs={},SameProbDiffs={},MissingGenoTested={},\
             MissingUnresolved={},NoAssay={},ErrorPct={:.3}",
            msg,
            self.mismatch_count,
            self.diff_prob_diffs,
            self.same_prob_diffs,
            self.miss_test_count,
            self.missing_count,
            self.no_assay_count,
            self.error_pct()
        );
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::AllMetrics;

    #[test]
    fn add_assign_is_pointwise() {
        let mut total = AllMetrics {
            all_geno_count: 4,
            miss_test_count: 1,
            ..Default::default()
        };
        total += AllMetrics {
            all_geno_count: 2,
            miss_test_count: 3,
            no_assay_count: 1,
            ..Default::default()
        };

        assert_eq!(
            total,
            AllMetrics {
                all_geno_count: 6,
                miss_test_count: 4,
                no_assay_count: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn error_pct() {
        assert_eq!(AllMetrics::default().error_pct(), 0.0);

        let metrics = AllMetrics {
            overlap_test_count: 4,
            mismatch_count: 1,
            ..Default::default()
        };
        assert_eq!(metrics.error_pct(), 25.0);
    }

    #[test]
    #[tracing_test::traced_test]
    fn log_metrics_levels() {
        let metrics = AllMetrics {
            overlap_test_count: 2,
            mismatch_count: 1,
            ..Default::default()
        };

        metrics.log_metrics(0, "rs1", 1, "##ERRPCT");
        assert!(!logs_contain("SNPCount"));

        metrics.log_metrics(1, "rs1", 1, "##ERRPCT");
        assert!(logs_contain("##ERRPCT,rs1,ErrPct=50.000"));
        assert!(!logs_contain("AllGenos"));

        metrics.log_metrics(2, "rs1", 1, "##ERRPCT");
        assert!(logs_contain("##ERRPCT,rs1,NoAssay=0"));
    }
}

//! Exact test of Hardy-Weinberg equilibrium for bi-allelic variants.
//!
//! Implements the test described in Wigginton JE, Cutler DJ, Abecasis GR (2005) "A Note on
//! Exact Tests of Hardy-Weinberg Equilibrium", Am J Hum Genet 76:887-893.  The probabilities
//! of all heterozygote counts compatible with the observed allele counts are computed with the
//! recurrence relation starting from the most likely count, then the p-value is the sum over
//! all counts at most as likely as the observed one.

/// Compute the two-sided exact HWE p-value for the given genotype counts.
///
/// The homozygote counts may be given in any order.  Without any genotypes, 1.0 is returned.
pub fn hw_exact_p_value(hets: u64, hom1: u64, hom2: u64) -> f64 {
    let hom_common = hom1.max(hom2);
    let hom_rare = hom1.min(hom2);

    let rare_copies = 2 * hom_rare + hets;
    let genotypes = hets + hom_common + hom_rare;
    if genotypes == 0 {
        return 1.0;
    }

    let mut het_probs = vec![0.0f64; (rare_copies + 1) as usize];

    // Start at the midpoint, which must have the same parity as the rare allele count.
    let mut mid = rare_copies * (2 * genotypes - rare_copies) / (2 * genotypes);
    if (rare_copies & 1) ^ (mid & 1) != 0 {
        mid += 1;
    }

    let mut curr_homr = (rare_copies - mid) / 2;
    let mut curr_homc = genotypes - mid - curr_homr;

    het_probs[mid as usize] = 1.0;
    let mut sum = 1.0;

    let mut curr_hets = mid;
    while curr_hets > 1 {
        let h = curr_hets as usize;
        het_probs[h - 2] = het_probs[h] * curr_hets as f64 * (curr_hets as f64 - 1.0)
            / (4.0 * (curr_homr as f64 + 1.0) * (curr_homc as f64 + 1.0));
        sum += het_probs[h - 2];
        // two fewer heterozygotes: one more rare and one more common homozygote
        curr_homr += 1;
        curr_homc += 1;
        curr_hets -= 2;
    }

    let mut curr_homr = (rare_copies - mid) / 2;
    let mut curr_homc = genotypes - mid - curr_homr;

    let mut curr_hets = mid;
    while curr_hets + 2 <= rare_copies {
        let h = curr_hets as usize;
        het_probs[h + 2] = het_probs[h] * 4.0 * curr_homr as f64 * curr_homc as f64
            / ((curr_hets as f64 + 2.0) * (curr_hets as f64 + 1.0));
        sum += het_probs[h + 2];
        // two more heterozygotes: one less rare and one less common homozygote
        curr_homr = curr_homr.saturating_sub(1);
        curr_homc = curr_homc.saturating_sub(1);
        curr_hets += 2;
    }

    for prob in het_probs.iter_mut() {
        *prob /= sum;
    }

    let observed = het_probs[hets as usize];
    let p_hwe: f64 = het_probs.iter().filter(|&&p| p <= observed).sum();

    p_hwe.min(1.0)
}

//! Per-sample genotype cells and their confidence-based normalization.

use std::str::FromStr;

use strum::{Display, EnumString};

/// A diploid genotype call as found in the first field of a genotype cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString)]
pub enum Genotype {
    #[strum(to_string = "0/0")]
    HomRef,
    #[strum(to_string = "0/1", serialize = "1/0")]
    Het,
    #[strum(to_string = "1/1")]
    HomAlt,
    /// Called but not confident enough, or called as missing.
    #[strum(to_string = "./.")]
    MissingCalled,
    /// The sample has no data for this variant on this platform.
    #[strum(to_string = ".")]
    NotPresent,
}

impl Genotype {
    /// Genotype for the index of the largest posterior probability (hom-ref, het, hom-alt).
    pub fn from_probability_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Genotype::HomRef),
            1 => Some(Genotype::Het),
            2 => Some(Genotype::HomAlt),
            _ => None,
        }
    }

    /// Parse the genotype from the first field of a cell.
    pub fn from_cell(cell: &str) -> Result<Self, strum::ParseError> {
        Genotype::from_str(cell.split(':').next().unwrap_or_default())
    }

    /// Number of alternative alleles; `None` for missing calls.
    pub fn alt_dosage(self) -> Option<u8> {
        match self {
            Genotype::HomRef => Some(0),
            Genotype::Het => Some(1),
            Genotype::HomAlt => Some(2),
            Genotype::MissingCalled | Genotype::NotPresent => None,
        }
    }

    /// Number of copies of `effect` allele given the record's alternative allele.
    ///
    /// Homozygous calls count 2 when their allele is the effect allele, 0 otherwise; a
    /// heterozygous call always counts 1.
    pub fn effect_dosage(self, alternative: &str, effect: &str) -> Option<u8> {
        let alt_is_effect = alternative == effect;
        match self {
            Genotype::HomRef => Some(if alt_is_effect { 0 } else { 2 }),
            Genotype::Het => Some(1),
            Genotype::HomAlt => Some(if alt_is_effect { 2 } else { 0 }),
            Genotype::MissingCalled | Genotype::NotPresent => None,
        }
    }

    pub fn is_missing(self) -> bool {
        matches!(self, Genotype::MissingCalled | Genotype::NotPresent)
    }
}

/// The largest posterior probability of a cell.
#[derive(Debug, Clone, PartialEq)]
pub struct MaxProbability<'a> {
    /// Largest probability, 0.0 if none is positive.
    pub value: f64,
    /// Index of the largest probability, first one wins on ties.
    pub index: Option<usize>,
    /// The colon-separated fields of the cell.
    pub fields: Vec<&'a str>,
}

/// Find the largest entry of the probability triple at field `probability_offset`.
///
/// Entries that cannot be parsed count as 0.0.  A missing field yields a value of 0.0 and no
/// index.
pub fn max_probability(cell: &str, probability_offset: Option<usize>) -> MaxProbability<'_> {
    let fields = cell.split(':').collect::<Vec<_>>();

    let mut value = 0.0;
    let mut index = None;
    if let Some(probs) = probability_offset.and_then(|offset| fields.get(offset)) {
        for (i, prob) in probs.split(',').enumerate() {
            let prob = prob.parse::<f64>().unwrap_or(0.0);
            if prob > value {
                value = prob;
                index = Some(i);
            }
        }
    }

    MaxProbability {
        value,
        index,
        fields,
    }
}

/// A normalized genotype cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub genotype: Genotype,
    /// The full cell with the genotype field rewritten.
    pub cell: String,
}

impl Call {
    pub fn not_present() -> Self {
        Self {
            genotype: Genotype::NotPresent,
            cell: Genotype::NotPresent.to_string(),
        }
    }
}

/// Normalize a genotype cell against the probability `threshold`.
///
/// The literal `"."` passes through.  Otherwise the genotype becomes the one with the largest
/// posterior probability, or `./.` if that probability is below `threshold`.  Without a
/// probability field, the called genotype is kept as-is (or set to `./.` if unparsable).
pub fn resolve_genotype(cell: &str, threshold: f64, probability_offset: Option<usize>) -> Call {
    if cell == "." {
        return Call::not_present();
    }

    let max_prob = max_probability(cell, probability_offset);
    let genotype = if probability_offset.is_none() {
        match Genotype::from_cell(cell) {
            Ok(Genotype::NotPresent) | Err(_) => Genotype::MissingCalled,
            Ok(genotype) => genotype,
        }
    } else if max_prob.value < threshold {
        Genotype::MissingCalled
    } else {
        max_prob
            .index
            .and_then(Genotype::from_probability_index)
            .unwrap_or(Genotype::MissingCalled)
    };

    let code = genotype.to_string();
    let mut fields = max_prob.fields;
    fields[0] = &code;

    Call {
        genotype,
        cell: fields.join(":"),
    }
}

//! Reconciliation of genotypes called on multiple assay platforms.
//!
//! The same samples are often typed on several platforms.  This crate merges the per-platform
//! genotype files into one record per variant with one column per sample, choosing the most
//! reliable call where platforms overlap and keeping counters of their agreement.  On top of the
//! combined records it computes population metrics, filters, and genetic risk scores.

pub mod combine;
pub mod common;
pub mod fetch;
pub mod filter;
pub mod genotype;
pub mod grs;
pub mod lookup;
pub mod merge;
pub mod metrics;
pub mod reconcile;
pub mod record;
pub mod sample;
pub mod stats;
pub mod tabix;

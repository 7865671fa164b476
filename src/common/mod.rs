//! Commonly used code.

use byte_unit::{Byte, UnitType};
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

pub mod contig;
pub mod io;

/// Commonly used command line arguments.
#[derive(Parser, Debug, Default)]
pub struct Args {
    /// Verbosity of the program
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    /// Path to a log file to append to, default is to log to stderr.
    #[arg(long, global = true)]
    pub log_file: Option<String>,

    /// Detail of per-variant metrics logging (0=minimal, 1=summary, 2=all counters).
    #[arg(long, global = true, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub metrics_level: u8,
}

/// Helper to print the current memory resident set size via `tracing`.
pub fn trace_rss_now() {
    let rss = procfs::process::Process::myself()
        .and_then(|me| me.stat())
        .map(|stat| stat.rss * procfs::page_size());
    match rss.map(|rss| Byte::from_u128(rss as u128)) {
        Ok(Some(rss)) => tracing::debug!(
            "RSS now: {}",
            rss.get_appropriate_unit(UnitType::Binary)
        ),
        _ => tracing::debug!("RSS now: unknown"),
    }
}

/// The platforms that are accepted by default, in priority order.
pub const DEFAULT_PLATFORMS: &str = "affy,illumina,broad,metabo,exome";

/// Split a comma-separated platform list, dropping empty entries.
pub fn split_platforms(platforms: &str) -> Vec<String> {
    platforms
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// The version of `genocombine` package.
#[cfg(not(test))]
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// This allows us to override the version to `0.0.0` in tests.
pub fn version() -> &'static str {
    #[cfg(test)]
    return "0.0.0";
    #[cfg(not(test))]
    return VERSION;
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    #[test]
    fn split_platforms_default() {
        assert_eq!(
            super::split_platforms(super::DEFAULT_PLATFORMS),
            vec!["affy", "illumina", "broad", "metabo", "exome"]
        );
    }

    #[test]
    fn split_platforms_drops_empty() {
        assert_eq!(super::split_platforms(" affy,,exome, "), vec!["affy", "exome"]);
    }
}

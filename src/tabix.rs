//! Point queries against bgzip-compressed, tabix-indexed genotype files.

use std::path::Path;

use noodles::core::{Position, Region};
use noodles::vcf;

/// Read access to the records of genotype files at a given position.
pub trait GenotypeFileReader: Send + Sync {
    /// Raw tab-separated data lines of the file at `path` overlapping `chromosome:position`.
    ///
    /// `chromosome` is used as-is, naming conventions must already be applied.
    fn query_point(
        &self,
        path: &Path,
        chromosome: &str,
        position: u64,
    ) -> Result<Vec<String>, anyhow::Error>;
}

/// Region of the single 1-based `position` on `chromosome`.
pub fn point_region(chromosome: &str, position: u64) -> Result<Region, anyhow::Error> {
    let position = Position::try_from(usize::try_from(position)?)
        .map_err(|e| anyhow::anyhow!("invalid position {}: {}", position, e))?;
    Ok(Region::new(chromosome, position..=position))
}

/// [`GenotypeFileReader`] opening the tabix index of each file on every query.
#[derive(Debug, Clone, Copy, Default)]
pub struct TabixFileReader;

impl GenotypeFileReader for TabixFileReader {
    fn query_point(
        &self,
        path: &Path,
        chromosome: &str,
        position: u64,
    ) -> Result<Vec<String>, anyhow::Error> {
        tracing::trace!("Querying {}:{} in {}", chromosome, position, path.display());
        let mut reader = vcf::io::indexed_reader::Builder::default()
            .build_from_path(path)
            .map_err(|e| anyhow::anyhow!("could not open {}: {}", path.display(), e))?;
        let header = reader.read_header()?;
        let region = point_region(chromosome, position)?;

        let mut result = Vec::new();
        for record in reader.query(&header, &region)? {
            let record = record?;
            result.push(record.as_ref().to_string());
        }
        Ok(result)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn point_region_bounds() -> Result<(), anyhow::Error> {
        let region = point_region("2", 1000)?;

        let position = Position::try_from(1000)?;
        assert_eq!(region.interval().start(), Some(position));
        assert_eq!(region.interval().end(), Some(position));

        Ok(())
    }

    #[test]
    fn point_region_zero_position() {
        assert!(point_region("2", 0).is_err());
    }

    const INDEXED: &str = "tests/data/tabix/chr02.vcf.gz";

    #[rstest::rstest]
    #[case::two_records_at_position(
        "2",
        1000,
        &[
            "2\t1000\trs1\tA\tG\t.\tPASS\t.\tGT:GP\t0/1:0.01,0.98,0.01\t0/0:0.95,0.03,0.02",
            "2\t1000\trs1b\tA\tC\t.\tPASS\t.\tGT:GP\t0/0:0.99,0.01,0\t0/0:0.97,0.03,0",
        ]
    )]
    #[case::last_record_of_chromosome(
        "2",
        2000,
        &["2\t2000\trs2\tC\tT\t.\tPASS\t.\tGT:GP\t1/1:0,0.02,0.98\t0/1:0.02,0.96,0.02"]
    )]
    #[case::second_chromosome(
        "10",
        500,
        &["10\t500\trs3\tG\tA\t.\tPASS\t.\tGT:GP\t0/0:0.98,0.02,0\t./.:0.4,0.3,0.3"]
    )]
    #[case::between_records("2", 1500, &[])]
    #[case::neighbouring_position("2", 1001, &[])]
    #[case::other_chromosome_position("10", 1000, &[])]
    fn query_indexed_file(
        #[case] chromosome: &str,
        #[case] position: u64,
        #[case] expected: &[&str],
    ) -> Result<(), anyhow::Error> {
        let lines = TabixFileReader.query_point(Path::new(INDEXED), chromosome, position)?;

        assert_eq!(lines, expected);

        Ok(())
    }

    #[test]
    fn query_chromosome_not_in_index() {
        let result = TabixFileReader.query_point(Path::new(INDEXED), "7", 100);

        assert!(result.is_err());
    }

    #[test]
    fn query_missing_file() {
        let result = TabixFileReader.query_point(
            Path::new("tests/data/tabix/missing.vcf.gz"),
            "2",
            1000,
        );

        assert!(result.is_err());
    }
}

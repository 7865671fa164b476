//! Concurrent retrieval of the platform records of a list of variants.
//!
//! One blocking task is run per (variant, platform) location.  A semaphore bounds the number
//! of files open at the same time, matching records are sent through a bounded channel to a
//! collector task.  The records are grouped by variant afterwards, so the output order does not
//! depend on the order in which the tasks complete.

use std::{collections::HashMap, sync::Arc};

use indexmap::IndexMap;
use itertools::Itertools;
use tokio::{
    sync::{mpsc, Semaphore},
    task::JoinSet,
};

use crate::{
    common::contig::ChromosomeNaming,
    lookup::{VariantLocation, VariantLookup},
    record::{LayoutCache, PlatformRecord, VariantRecord},
    tabix::GenotypeFileReader,
};

/// Default number of genotype files open at the same time.
pub const DEFAULT_MAX_OPEN_FILES: usize = 64;

/// Capacity of the record channel.
const CHANNEL_CAPACITY: usize = 1024;

/// Records of the requested variants.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedRecords {
    /// Records per variant id, in request order; per variant sorted by platform priority.
    pub records: IndexMap<String, Vec<PlatformRecord>>,
    /// Platforms with at least one record, in priority order.
    pub platforms: Vec<String>,
}

/// Read the records at `location` and keep those starting there with the looked-up alleles.
pub fn read_location<G: GenotypeFileReader + ?Sized>(
    reader: &G,
    naming: &ChromosomeNaming,
    location: &VariantLocation,
) -> Result<Vec<PlatformRecord>, anyhow::Error> {
    let chromosome = naming.query_name(&location.platform, &location.chromosome);
    let lines = reader.query_point(&location.path, chromosome, location.position)?;

    let mut layouts = LayoutCache::default();
    let mut result = Vec::new();
    for line in lines {
        let record = match VariantRecord::parse(&line, &mut layouts) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("skipping record in {}: {}", location.path.display(), e);
                continue;
            }
        };
        if record.prefix.position == location.position
            && record.prefix.reference == location.reference
            && record.prefix.alternative == location.alternative
        {
            result.push(PlatformRecord::new(&location.platform, record));
        }
    }
    Ok(result)
}

/// Fetch the records of `variant_ids` on the `accepted` platforms.
///
/// Variants that are not found are logged and yield no records.  Repeated variant ids are
/// fetched once.  Any failing file access fails the whole fetch.
pub async fn fetch_records<L, G>(
    lookup: &L,
    reader: Arc<G>,
    naming: Arc<ChromosomeNaming>,
    variant_ids: &[String],
    accepted: &[String],
    max_open_files: usize,
) -> Result<FetchedRecords, anyhow::Error>
where
    L: VariantLookup + ?Sized,
    G: GenotypeFileReader + 'static,
{
    let variant_ids = variant_ids.iter().unique().collect::<Vec<_>>();
    let semaphore = Arc::new(Semaphore::new(max_open_files.max(1)));
    let (tx, mut rx) = mpsc::channel::<(String, PlatformRecord)>(CHANNEL_CAPACITY);

    let collector = tokio::spawn(async move {
        let mut collected: HashMap<String, Vec<PlatformRecord>> = HashMap::new();
        while let Some((variant_id, record)) = rx.recv().await {
            collected.entry(variant_id).or_default().push(record);
        }
        collected
    });

    let mut tasks = JoinSet::new();
    for &variant_id in &variant_ids {
        for location in lookup.lookup(variant_id)? {
            if !accepted.contains(&location.platform) {
                tracing::debug!("skipping {} on platform {}", variant_id, location.platform);
                continue;
            }
            let permit = semaphore.clone().acquire_owned().await?;
            let reader = reader.clone();
            let naming = naming.clone();
            let tx = tx.clone();
            let variant_id = variant_id.clone();
            tasks.spawn_blocking(move || -> Result<(), anyhow::Error> {
                let _permit = permit;
                for record in read_location(reader.as_ref(), naming.as_ref(), &location)? {
                    tx.blocking_send((variant_id.clone(), record))
                        .map_err(|_| anyhow::anyhow!("record channel closed"))?;
                }
                Ok(())
            });
        }
    }
    drop(tx);

    while let Some(result) = tasks.join_next().await {
        result??;
    }
    let mut collected = collector.await?;

    let priority = |platform: &str| {
        accepted
            .iter()
            .position(|p| p == platform)
            .unwrap_or(usize::MAX)
    };
    let mut result = FetchedRecords::default();
    for &variant_id in &variant_ids {
        let mut records = collected.remove(variant_id).unwrap_or_default();
        records.sort_by_key(|r| priority(&r.platform));
        result.records.insert(variant_id.clone(), records);
    }
    result.platforms = accepted
        .iter()
        .filter(|p| {
            result
                .records
                .values()
                .flatten()
                .any(|r| &r.platform == *p)
        })
        .cloned()
        .collect();

    tracing::info!(
        "Fetched {} records for {} variants from {} platforms",
        result.records.values().map(Vec::len).sum::<usize>(),
        variant_ids.len(),
        result.platforms.len()
    );
    Ok(result)
}

/// Run [`fetch_records`] on a new multi-threaded runtime.
pub fn fetch_records_blocking<L, G>(
    lookup: &L,
    reader: Arc<G>,
    naming: Arc<ChromosomeNaming>,
    variant_ids: &[String],
    accepted: &[String],
    max_open_files: usize,
) -> Result<FetchedRecords, anyhow::Error>
where
    L: VariantLookup + ?Sized,
    G: GenotypeFileReader + 'static,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(fetch_records(
        lookup,
        reader,
        naming,
        variant_ids,
        accepted,
        max_open_files,
    ))
}

#[cfg(test)]
pub(crate) mod test {
    use std::{
        collections::HashMap,
        path::{Path, PathBuf},
        sync::Arc,
    };

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::sample::PlatformSamples;

    /// In-memory lookup for tests.
    #[derive(Default)]
    pub struct FakeLookup {
        pub locations: HashMap<String, Vec<VariantLocation>>,
        pub samples: HashMap<String, PlatformSamples>,
    }

    impl VariantLookup for FakeLookup {
        fn lookup(&self, variant_id: &str) -> Result<Vec<VariantLocation>, anyhow::Error> {
            Ok(self.locations.get(variant_id).cloned().unwrap_or_default())
        }

        fn platform_samples(&self, platform: &str) -> Option<&PlatformSamples> {
            self.samples.get(platform)
        }
    }

    /// In-memory genotype files for tests, keyed by path, chromosome, and position.
    #[derive(Default)]
    pub struct FakeReader {
        pub lines: HashMap<(PathBuf, String, u64), Vec<String>>,
    }

    impl GenotypeFileReader for FakeReader {
        fn query_point(
            &self,
            path: &Path,
            chromosome: &str,
            position: u64,
        ) -> Result<Vec<String>, anyhow::Error> {
            self.lines
                .get(&(path.to_path_buf(), chromosome.to_string(), position))
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no such file {}", path.display()))
        }
    }

    pub fn location(platform: &str, variant: (&str, u64, &str, &str)) -> VariantLocation {
        VariantLocation {
            platform: platform.to_string(),
            chromosome: variant.0.to_string(),
            position: variant.1,
            reference: variant.2.to_string(),
            alternative: variant.3.to_string(),
            path: PathBuf::from(format!("/data/{}/chr{}.vcf.gz", platform, variant.0)),
        }
    }

    /// Two platforms, `affy` (S1, S2) and `illumina` (S2, S3), with records for rs1 and rs2.
    pub fn fixture() -> (FakeLookup, FakeReader) {
        let mut lookup = FakeLookup::default();
        let mut reader = FakeReader::default();

        let rs1 = ("02", 100, "A", "G");
        let rs2 = ("10", 200, "C", "T");
        lookup.locations.insert(
            "rs1".to_string(),
            vec![location("illumina", rs1), location("affy", rs1)],
        );
        lookup
            .locations
            .insert("rs2".to_string(), vec![location("affy", rs2)]);
        lookup
            .samples
            .insert("affy".to_string(), PlatformSamples::from_names(["S1", "S2"]));
        lookup.samples.insert(
            "illumina".to_string(),
            PlatformSamples::from_names(["S2", "S3"]),
        );

        reader.lines.insert(
            (PathBuf::from("/data/affy/chr02.vcf.gz"), "2".to_string(), 100),
            vec![
                "2\t100\trs1\tA\tG\t.\tPASS\t.\tGT:GP\t0/1:0.01,0.98,0.01\t0/0:0.95,0.03,0.02"
                    .to_string(),
                "2\t100\trs1b\tA\tC\t.\tPASS\t.\tGT:GP\t0/0:1,0,0\t0/0:1,0,0".to_string(),
                "2\t98\trs1c\tA\tG\t.\tPASS\t.\tGT:GP\t1/1:0,0,1\t1/1:0,0,1".to_string(),
            ],
        );
        reader.lines.insert(
            (
                PathBuf::from("/data/illumina/chr02.vcf.gz"),
                "02".to_string(),
                100,
            ),
            vec!["02\t100\trs1\tA\tG\t.\tPASS\t.\tGT:GP\t0/0:0.95,0.03,0.02\t1/1:0,0.01,0.99"
                .to_string()],
        );
        reader.lines.insert(
            (PathBuf::from("/data/affy/chr10.vcf.gz"), "10".to_string(), 200),
            vec!["10\t200\trs2\tC\tT\t.\tPASS\t.\tGT:GP\t1/1:0,0,1\t0/1:0,1,0".to_string()],
        );

        (lookup, reader)
    }

    pub fn naming() -> ChromosomeNaming {
        ChromosomeNaming::new([("affy", true), ("illumina", false)])
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn read_location_filters_alleles() -> Result<(), anyhow::Error> {
        let (_, reader) = fixture();

        let records = read_location(&reader, &naming(), &location("affy", ("02", 100, "A", "G")))?;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].platform, "affy");
        assert_eq!(records[0].record.prefix.variant_id, "rs1");

        Ok(())
    }

    #[test]
    fn read_location_requires_same_start() -> Result<(), anyhow::Error> {
        let (_, reader) = fixture();

        let records = read_location(&reader, &naming(), &location("affy", ("02", 100, "A", "G")))?;

        assert_eq!(
            records
                .iter()
                .map(|r| r.record.prefix.variant_id.as_str())
                .collect::<Vec<_>>(),
            vec!["rs1"]
        );

        Ok(())
    }

    #[test]
    fn read_location_missing_file() {
        let (_, reader) = fixture();

        assert!(read_location(&reader, &naming(), &location("broad", ("02", 100, "A", "G"))).is_err());
    }

    #[rstest::rstest]
    #[case(1)]
    #[case(64)]
    fn fetch_groups_and_orders(#[case] max_open_files: usize) -> Result<(), anyhow::Error> {
        let (lookup, reader) = fixture();

        let fetched = fetch_records_blocking(
            &lookup,
            Arc::new(reader),
            Arc::new(naming()),
            &strings(&["rs2", "rs404", "rs1"]),
            &strings(&["affy", "illumina"]),
            max_open_files,
        )?;

        assert_eq!(
            fetched.records.keys().collect::<Vec<_>>(),
            vec!["rs2", "rs404", "rs1"]
        );
        assert_eq!(
            fetched.records["rs1"]
                .iter()
                .map(|r| r.platform.as_str())
                .collect::<Vec<_>>(),
            vec!["affy", "illumina"]
        );
        assert!(fetched.records["rs404"].is_empty());
        assert_eq!(fetched.platforms, vec!["affy", "illumina"]);

        Ok(())
    }

    #[test]
    fn fetch_repeated_variant_ids_once() -> Result<(), anyhow::Error> {
        let (lookup, reader) = fixture();

        let fetched = fetch_records_blocking(
            &lookup,
            Arc::new(reader),
            Arc::new(naming()),
            &strings(&["rs1", "rs2", "rs1"]),
            &strings(&["illumina", "affy"]),
            4,
        )?;

        assert_eq!(fetched.records.keys().collect::<Vec<_>>(), vec!["rs1", "rs2"]);
        assert_eq!(
            fetched.records["rs1"]
                .iter()
                .map(|r| r.platform.as_str())
                .collect::<Vec<_>>(),
            vec!["illumina", "affy"]
        );
        assert_eq!(fetched.records["rs2"].len(), 1);

        Ok(())
    }

    #[test]
    fn fetch_skips_platforms_not_accepted() -> Result<(), anyhow::Error> {
        let (lookup, reader) = fixture();

        let fetched = fetch_records_blocking(
            &lookup,
            Arc::new(reader),
            Arc::new(naming()),
            &strings(&["rs1"]),
            &strings(&["illumina"]),
            DEFAULT_MAX_OPEN_FILES,
        )?;

        assert_eq!(fetched.records["rs1"].len(), 1);
        assert_eq!(fetched.platforms, vec!["illumina"]);

        Ok(())
    }

    #[test]
    fn fetch_fails_on_file_error() {
        let (mut lookup, reader) = fixture();
        lookup.locations.insert(
            "rs3".to_string(),
            vec![location("affy", ("03", 300, "G", "A"))],
        );

        let result = fetch_records_blocking(
            &lookup,
            Arc::new(reader),
            Arc::new(naming()),
            &strings(&["rs3"]),
            &strings(&["affy"]),
            DEFAULT_MAX_OPEN_FILES,
        );

        assert!(result.is_err());
    }
}

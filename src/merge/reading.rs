//! Streaming k-way merge of position-sorted platform files.

use std::{collections::HashMap, io::BufRead};

use crate::{
    metrics::AllMetrics,
    reconcile::{self, reconcile},
    record::{sample_names_from_header, CombinedRecord, LayoutCache, PlatformRecord, VariantRecord},
    sample::{PlatformSamples, SampleDirectory},
};

/// Key of a stream after its last record.
pub const END_OF_STREAM: u64 = u64::MAX;

/// State of one input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Holds a record that is not part of the current low-key set.
    Reading,
    /// Holds a record of the current low-key set.
    Emitting,
    /// All records consumed.
    Exhausted,
}

/// One platform file, read record by record.
pub struct PlatformStream<R: BufRead> {
    platform: String,
    reader: R,
    sample_names: Vec<String>,
    current: Option<VariantRecord>,
    state: StreamState,
    layouts: LayoutCache,
    line_no: usize,
}

impl<R: BufRead> PlatformStream<R> {
    /// Open the stream: skip meta lines, read the column header and the first record.
    pub fn new(platform: &str, mut reader: R) -> Result<Self, anyhow::Error> {
        let mut line = String::new();
        let mut line_no = 0;
        let sample_names = loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                anyhow::bail!("no column header line in file of platform {}", platform);
            }
            line_no += 1;
            if line.starts_with("##") {
                continue;
            }
            break sample_names_from_header(&line)
                .map_err(|e| anyhow::anyhow!("platform {}: {}", platform, e))?;
        };

        let mut result = Self {
            platform: platform.to_string(),
            reader,
            sample_names,
            current: None,
            state: StreamState::Reading,
            layouts: LayoutCache::default(),
            line_no,
        };
        result.advance()?;
        Ok(result)
    }

    /// Read the next record; unparsable lines are logged and skipped.
    pub fn advance(&mut self) -> Result<(), anyhow::Error> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                self.current = None;
                self.state = StreamState::Exhausted;
                return Ok(());
            }
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match VariantRecord::parse(&line, &mut self.layouts) {
                Ok(record) => {
                    self.current = Some(record);
                    self.state = StreamState::Reading;
                    return Ok(());
                }
                Err(e) => tracing::warn!(
                    "skipping line {} of platform {}: {}",
                    self.line_no,
                    self.platform,
                    e
                ),
            }
        }
    }

    /// Position of the current record, [`END_OF_STREAM`] when exhausted.
    pub fn key(&self) -> u64 {
        self.current
            .as_ref()
            .map_or(END_OF_STREAM, |record| record.prefix.position)
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn sample_names(&self) -> &[String] {
        &self.sample_names
    }

    pub fn state(&self) -> StreamState {
        self.state
    }
}

/// Result of one merge step.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// The combined record passed the error percentage filter.
    Emitted(CombinedRecord),
    /// The combined record exceeded the error percentage and is not written.
    Suppressed {
        variant_id: String,
        error_pct: f64,
    },
}

/// Merge of several platform streams covering the same chromosome.
pub struct StreamingMerger<R: BufRead> {
    /// Streams sorted by platform, descending.
    streams: Vec<PlatformStream<R>>,
    directory: SampleDirectory,
    config: reconcile::Config,
    max_error_pct: f64,
    metrics_level: u8,
    totals: AllMetrics,
}

impl<R: BufRead> StreamingMerger<R> {
    /// Construct the merger.
    ///
    /// Combined sample columns are numbered following `priority`, the platform order of the
    /// streams as configured.
    pub fn new<S: AsRef<str>>(
        mut streams: Vec<PlatformStream<R>>,
        priority: &[S],
        config: reconcile::Config,
        max_error_pct: f64,
        metrics_level: u8,
    ) -> Self {
        let per_platform = streams
            .iter()
            .map(|stream| {
                (
                    stream.platform.clone(),
                    PlatformSamples::from_names(stream.sample_names.iter().cloned()),
                )
            })
            .collect::<HashMap<_, _>>();
        let directory = SampleDirectory::new(per_platform, priority);
        streams.sort_by(|a, b| b.platform.cmp(&a.platform));

        Self {
            streams,
            directory,
            config,
            max_error_pct,
            metrics_level,
            totals: AllMetrics::default(),
        }
    }

    pub fn directory(&self) -> &SampleDirectory {
        &self.directory
    }

    /// Counters accumulated over all steps so far.
    pub fn totals(&self) -> &AllMetrics {
        &self.totals
    }

    /// Whether all streams are exhausted.
    pub fn is_done(&self) -> bool {
        self.streams.iter().all(|s| s.key() == END_OF_STREAM)
    }

    /// Reconcile the records at the smallest position and advance their streams.
    ///
    /// Returns `None` once all streams are exhausted.
    pub fn step(&mut self) -> Result<Option<MergeOutcome>, anyhow::Error> {
        let low_key = self
            .streams
            .iter()
            .map(PlatformStream::key)
            .min()
            .unwrap_or(END_OF_STREAM);
        if low_key == END_OF_STREAM {
            return Ok(None);
        }

        let mut records = Vec::new();
        for stream in self.streams.iter_mut() {
            if stream.key() == low_key {
                stream.state = StreamState::Emitting;
                if let Some(record) = stream.current.take() {
                    records.push(PlatformRecord {
                        platform: stream.platform.clone(),
                        record,
                    });
                }
            }
        }

        let mut metrics = AllMetrics::default();
        let combined = reconcile(&records, &self.directory, &self.config, &mut metrics)?;
        self.totals += metrics;

        for stream in self
            .streams
            .iter_mut()
            .filter(|s| s.state == StreamState::Emitting)
        {
            stream.advance()?;
        }

        let error_pct = metrics.error_pct();
        if error_pct < self.max_error_pct {
            Ok(Some(MergeOutcome::Emitted(combined)))
        } else {
            metrics.log_metrics(
                self.metrics_level.max(1),
                &combined.prefix.variant_id,
                1,
                "##ERRPCT",
            );
            Ok(Some(MergeOutcome::Suppressed {
                variant_id: combined.prefix.variant_id,
                error_pct,
            }))
        }
    }
}

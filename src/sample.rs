//! Sample directory: per-platform sample lists and the combined column layout.

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;

use crate::record::header_line;

/// The samples of one platform, both lookup directions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformSamples {
    by_name: HashMap<String, usize>,
    by_index: BTreeMap<usize, String>,
}

impl PlatformSamples {
    /// Construct from the sample names in slot order, e.g. from a file's column header.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_entries(names.into_iter().enumerate().map(|(i, n)| (n, i)))
    }

    /// Construct from `(name, slot)` pairs in any order.
    ///
    /// A repeated name keeps its first slot; later slots carrying it are logged and left
    /// without a sample.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, usize)>,
        S: Into<String>,
    {
        let mut result = Self::default();
        for (name, index) in entries {
            let name = name.into();
            if let Some(first) = result.by_name.get(&name) {
                tracing::warn!(
                    "duplicate sample {} in slot {}, keeping slot {}",
                    name,
                    index,
                    first
                );
                continue;
            }
            result.by_name.insert(name.clone(), index);
            result.by_index.insert(index, name);
        }
        result
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.by_index.get(&index).map(String::as_str)
    }

    /// Sample names in slot order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_index.values().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }
}

/// Assign combined column indices to the samples of all platforms.
///
/// Platforms are visited in `priority` order, samples in the platform's slot order.  Each
/// name not seen before gets the next free index.  Platforms listed in `priority` but absent
/// from `per_platform` are logged and skipped.
pub fn build_combined_column_map<S: AsRef<str>>(
    per_platform: &HashMap<String, PlatformSamples>,
    priority: &[S],
) -> IndexMap<String, usize> {
    let mut result = IndexMap::new();
    for platform in priority {
        let platform = platform.as_ref();
        let Some(samples) = per_platform.get(platform) else {
            tracing::error!("platform {} not found in sample lists", platform);
            continue;
        };
        for name in samples.names() {
            if !result.contains_key(name) {
                let index = result.len();
                result.insert(name.to_string(), index);
            }
        }
    }
    result
}

/// The column header line and sample names of a combined column map, ordered by index.
pub fn combined_column_headers(columns: &IndexMap<String, usize>) -> (String, Vec<String>) {
    let mut names = columns.iter().collect::<Vec<_>>();
    names.sort_by_key(|(_, index)| **index);
    let names = names
        .into_iter()
        .map(|(name, _)| name.clone())
        .collect::<Vec<_>>();
    (header_line(&names), names)
}

/// Per-run sample directory.
///
/// Holds the per-platform sample lists, the combined column map, and for each platform the
/// combined column of each of its slots.
#[derive(Debug, Clone, Default)]
pub struct SampleDirectory {
    platforms: HashMap<String, PlatformSamples>,
    columns: IndexMap<String, usize>,
    slot_columns: HashMap<String, Vec<Option<usize>>>,
}

impl SampleDirectory {
    /// Build the directory, numbering combined columns in `priority` order.
    pub fn new<S: AsRef<str>>(platforms: HashMap<String, PlatformSamples>, priority: &[S]) -> Self {
        let columns = build_combined_column_map(&platforms, priority);
        let slot_columns = platforms
            .iter()
            .map(|(platform, samples)| {
                let width = samples.by_index.keys().next_back().map_or(0, |i| i + 1);
                let mut slots = vec![None; width];
                for (index, name) in &samples.by_index {
                    slots[*index] = columns.get(name).copied();
                }
                (platform.clone(), slots)
            })
            .collect();

        Self {
            platforms,
            columns,
            slot_columns,
        }
    }

    /// Combined column of `platform`'s sample slot `slot`, if that sample is known.
    pub fn combined_column(&self, platform: &str, slot: usize) -> Option<usize> {
        self.slot_columns
            .get(platform)
            .and_then(|slots| slots.get(slot).copied().flatten())
    }

    /// Number of combined columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &IndexMap<String, usize> {
        &self.columns
    }

    pub fn platform(&self, platform: &str) -> Option<&PlatformSamples> {
        self.platforms.get(platform)
    }

    /// See [`combined_column_headers`].
    pub fn combined_column_headers(&self) -> (String, Vec<String>) {
        combined_column_headers(&self.columns)
    }
}

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use std::io::{self, BufRead};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a parse. Nothing else is ever surfaced to the caller:
/// unclassified lines are skipped and unmatched metrics are sentinel-filled.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The log file could not be opened
    #[error("Failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading failed part way through the file
    #[error("Failed to read log at line {line}: {source}")]
    Read {
        line: usize,
        #[source]
        source: io::Error,
    },

    /// A capture the pattern guarantees numeric did not parse
    #[error("Invalid number {value:?} for metric '{key}' on line {line}")]
    InvalidNumber {
        line: usize,
        key: String,
        value: String,
    },

    /// Two partial tables built from different registries
    #[error("Cannot merge tables with different metric keys")]
    ShardMismatch,
}

/// A record line: `Stats <timestamp>: ...`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClassifiedLine<'a> {
    pub timestamp: f64,
    pub raw_text: &'a str,
}

/// One metric's values, index-aligned with the table's timestamps
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Series {
    values: Vec<f64>,
    /// Whether the value at the same index came from a match (false = sentinel)
    present: Vec<bool>,
}

impl Series {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            present: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push_value(&mut self, value: f64) {
        self.values.push(value);
        self.present.push(true);
    }

    pub(crate) fn push_sentinel(&mut self, sentinel: f64) {
        self.values.push(sentinel);
        self.present.push(false);
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn present(&self) -> &[bool] {
        &self.present
    }

    pub fn len(&self) -> usize {
        self.values.len().min(self.present.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values that came from an actual match, skipping sentinels
    pub fn present_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values
            .iter()
            .zip(self.present.iter())
            .filter_map(|(v, p)| p.then_some(*v))
    }

    fn truncate(&mut self, len: usize) {
        self.values.truncate(len);
        self.present.truncate(len);
    }

    fn extend(&mut self, other: Series) {
        self.values.extend(other.values);
        self.present.extend(other.present);
    }
}

/// Rectangular table of time-aligned metric series.
///
/// Every series has exactly as many entries as `timestamps`; keys keep the
/// registry's declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeSeriesTable {
    timestamps: Vec<f64>,
    keys: Vec<String>,
    series: Vec<Series>,
}

impl TimeSeriesTable {
    /// Create an empty table with one empty series per key
    pub fn with_keys(keys: Vec<String>) -> Self {
        Self::with_capacity(keys, 0)
    }

    pub(crate) fn with_capacity(keys: Vec<String>, capacity: usize) -> Self {
        let series = keys.iter().map(|_| Series::with_capacity(capacity)).collect();
        Self {
            timestamps: Vec::with_capacity(capacity),
            keys,
            series,
        }
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Number of records (rows)
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Find series index by key
    pub fn find_key_index(&self, key: &str) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&Series> {
        self.find_key_index(key).map(|i| &self.series[i])
    }

    /// Values of one metric, sentinel-filled where it did not match
    pub fn series(&self, key: &str) -> Option<&[f64]> {
        self.get(key).map(Series::values)
    }

    /// Per-index match flags of one metric
    pub fn presence(&self, key: &str) -> Option<&[bool]> {
        self.get(key).map(Series::present)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Series)> {
        self.keys.iter().map(String::as_str).zip(self.series.iter())
    }

    /// Elapsed minutes since the first record, for plotting
    pub fn relative_minutes(&self) -> Vec<f64> {
        let Some(&start) = self.timestamps.first() else {
            return Vec::new();
        };
        self.timestamps.iter().map(|t| (t - start) / 60.0).collect()
    }

    /// Sub-table with only the requested keys, in the requested order.
    /// Unknown keys are skipped.
    pub fn select(&self, keys: &[&str]) -> TimeSeriesTable {
        let mut selected = TimeSeriesTable {
            timestamps: self.timestamps.clone(),
            keys: Vec::with_capacity(keys.len()),
            series: Vec::with_capacity(keys.len()),
        };
        for key in keys {
            if let Some(series) = self.get(key) {
                selected.keys.push((*key).to_string());
                selected.series.push(series.clone());
            } else {
                tracing::warn!("Unknown metric key: {}", key);
            }
        }
        selected
    }

    /// Every series is as long as the timestamp axis
    pub fn is_rectangular(&self) -> bool {
        let n = self.timestamps.len();
        self.series
            .iter()
            .all(|s| s.values.len() == n && s.present.len() == n)
    }

    /// Ordered concatenation of a table parsed from a later range of the same log
    pub fn append(&mut self, other: TimeSeriesTable) -> Result<(), ParseError> {
        if self.keys != other.keys {
            return Err(ParseError::ShardMismatch);
        }
        self.timestamps.extend(other.timestamps);
        for (series, tail) in self.series.iter_mut().zip(other.series) {
            series.extend(tail);
        }
        Ok(())
    }

    pub(crate) fn push_timestamp(&mut self, timestamp: f64) {
        self.timestamps.push(timestamp);
    }

    pub(crate) fn series_mut(&mut self, index: usize) -> &mut Series {
        &mut self.series[index]
    }

    /// Shortest length across the timestamp axis and every series
    pub(crate) fn min_len(&self) -> usize {
        self.series
            .iter()
            .map(|s| s.values.len().min(s.present.len()))
            .fold(self.timestamps.len(), usize::min)
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.timestamps.truncate(len);
        for series in &mut self.series {
            series.truncate(len);
        }
    }
}

struct SeriesMap<'a>(&'a TimeSeriesTable);

impl Serialize for SeriesMap<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.keys.len()))?;
        for (key, series) in self.0.iter() {
            map.serialize_entry(key, series.values())?;
        }
        map.end()
    }
}

impl Serialize for TimeSeriesTable {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("TimeSeriesTable", 3)?;
        state.serialize_field("timestamps", &self.timestamps)?;
        state.serialize_field("keys", &self.keys)?;
        state.serialize_field("series", &SeriesMap(self))?;
        state.end()
    }
}

/// Trait for log parsers that stream a reader into a table
pub trait Parseable {
    fn parse_reader<R: BufRead>(&self, reader: R) -> Result<TimeSeriesTable, ParseError>;

    fn parse(&self, data: &str) -> Result<TimeSeriesTable, ParseError> {
        self.parse_reader(data.as_bytes())
    }
}

//! Klipper host log (`klippy.log`) reader.
//!
//! Streams the file one line at a time, decoding each line lossily so that
//! invalid byte sequences never abort a parse, and feeds record lines
//! through the classifier, extractor and series builder.
//!
//! Format: free text, with periodic record lines such as
//! `Stats 1234.5: gcodein=0 mcu: mcu_awake=0.005 ... buffer_time=1.2 sysload=0.4`

use memmap2::Mmap;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use super::builder::SeriesBuilder;
use super::classifier::classify_line;
use super::registry::{default_registry, Registry};
use super::types::{ParseError, Parseable, TimeSeriesTable};
use crate::state::INITIAL_CAPACITY;

/// Klipper log parser. Holds only the immutable registry, so one parser can
/// serve any number of concurrent parses.
#[derive(Clone, Debug)]
pub struct Klippy {
    registry: Arc<Registry>,
}

impl Default for Klippy {
    fn default() -> Self {
        Self::new(default_registry())
    }
}

impl Klippy {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn from_shared(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Parse a log file from disk. The file handle is released when this
    /// returns, on success and on error alike.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<TimeSeriesTable, ParseError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ParseError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse_reader(BufReader::new(file))
    }

    /// Parse a memory-mapped file split into `shards` line ranges in parallel.
    /// Produces the same table as [`Klippy::parse_file`].
    pub fn parse_file_parallel(
        &self,
        path: impl AsRef<Path>,
        shards: usize,
    ) -> Result<TimeSeriesTable, ParseError> {
        let path = path.as_ref();
        let open_error = |source| ParseError::Open {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(open_error)?;
        if file.metadata().map_err(open_error)?.len() == 0 {
            return Ok(self.empty_table());
        }

        // SAFETY: the map is read-only and dropped before this returns; a log
        // being appended to concurrently only grows past the mapped length.
        let mmap = unsafe { Mmap::map(&file) }.map_err(open_error)?;
        self.parse_bytes_parallel(&mmap, shards)
    }

    /// Split `bytes` at line boundaries, parse each range independently,
    /// then concatenate the partial tables in file order.
    pub fn parse_bytes_parallel(
        &self,
        bytes: &[u8],
        shards: usize,
    ) -> Result<TimeSeriesTable, ParseError> {
        let start = Instant::now();
        let bounds = shard_bounds(bytes, shards.max(1));

        let partials: Vec<TimeSeriesTable> = bounds
            .par_iter()
            .map(|range| {
                let first_line = bytes[..range.start].iter().filter(|&&b| b == b'\n').count();
                self.parse_lines(&bytes[range.clone()], first_line)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut partials = partials.into_iter();
        let mut table = partials.next().unwrap_or_else(|| self.empty_table());
        for partial in partials {
            table.append(partial)?;
        }

        tracing::info!(
            "Parsed Klipper log in {} shards: {} records, {} metrics in {:?}",
            bounds.len(),
            table.len(),
            table.keys().len(),
            start.elapsed()
        );

        Ok(table)
    }

    fn empty_table(&self) -> TimeSeriesTable {
        TimeSeriesTable::with_keys(self.registry.keys().to_vec())
    }

    /// Line-at-a-time loop shared by the sequential and sharded paths.
    /// `line_offset` is the number of lines preceding this reader in the file.
    fn parse_lines<R: BufRead>(
        &self,
        mut reader: R,
        line_offset: usize,
    ) -> Result<TimeSeriesTable, ParseError> {
        let mut builder = SeriesBuilder::with_capacity(&self.registry, INITIAL_CAPACITY);
        let mut buf = Vec::with_capacity(1024);
        let mut line_number = line_offset;

        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|source| ParseError::Read {
                    line: line_number + 1,
                    source,
                })?;
            if read == 0 {
                break;
            }
            line_number += 1;

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\n', '\r']);

            if let Some(record) = classify_line(line) {
                builder.push_line(&record, line_number)?;
            }
        }

        Ok(builder.finish())
    }
}

impl Parseable for Klippy {
    fn parse_reader<R: BufRead>(&self, reader: R) -> Result<TimeSeriesTable, ParseError> {
        let start = Instant::now();
        let table = self.parse_lines(reader, 0)?;

        tracing::info!(
            "Parsed Klipper log: {} records, {} metrics in {:?}",
            table.len(),
            table.keys().len(),
            start.elapsed()
        );

        Ok(table)
    }
}

/// Byte ranges of roughly equal size, each ending just after a newline
/// (or at the end of the buffer).
fn shard_bounds(bytes: &[u8], shards: usize) -> Vec<Range<usize>> {
    let target = bytes.len().div_ceil(shards).max(1);
    let mut bounds = Vec::with_capacity(shards);
    let mut start = 0;

    while start < bytes.len() {
        let tentative = (start + target).min(bytes.len());
        let end = bytes[tentative - 1..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(bytes.len(), |offset| tentative + offset);
        bounds.push(start..end);
        start = end;
    }

    bounds
}

/// Parse a file with the default registry
pub fn parse_file(path: impl AsRef<Path>) -> Result<TimeSeriesTable, ParseError> {
    Klippy::default().parse_file(path)
}

//! Accumulates timestamps and metric values in lockstep.

use super::extractor::Extractor;
use super::registry::Registry;
use super::types::{ClassifiedLine, ParseError, TimeSeriesTable};

/// Owns the table under construction for one parse.
///
/// Each record line appends one timestamp and exactly one value per
/// registry key, so every series stays as long as the timestamp axis.
pub struct SeriesBuilder<'r> {
    extractor: Extractor<'r>,
    table: TimeSeriesTable,
    sentinels: Vec<f64>,
    row: Vec<Option<f64>>,
}

impl<'r> SeriesBuilder<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self::with_capacity(registry, 0)
    }

    pub fn with_capacity(registry: &'r Registry, capacity: usize) -> Self {
        let sentinels = registry
            .definitions()
            .iter()
            .flat_map(|d| d.outputs.iter().map(move |_| d.sentinel))
            .collect();

        Self {
            extractor: Extractor::new(registry),
            table: TimeSeriesTable::with_capacity(registry.keys().to_vec(), capacity),
            sentinels,
            row: Vec::with_capacity(registry.keys().len()),
        }
    }

    /// Records accepted so far
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Append one record line
    pub fn push_line(
        &mut self,
        line: &ClassifiedLine,
        line_number: usize,
    ) -> Result<(), ParseError> {
        self.extractor.extract(line, line_number, &mut self.row)?;

        self.table.push_timestamp(line.timestamp);
        for (index, (value, sentinel)) in self.row.iter().zip(&self.sentinels).enumerate() {
            let series = self.table.series_mut(index);
            match value {
                Some(v) => series.push_value(*v),
                None => series.push_sentinel(*sentinel),
            }
        }

        Ok(())
    }

    /// Close the table: truncate every sequence to the shortest one
    pub fn finish(self) -> TimeSeriesTable {
        let mut table = self.table;
        let min_len = table.min_len();
        if min_len < table.len() || !table.is_rectangular() {
            tracing::warn!(
                "Series lengths diverged; truncating {} records to {}",
                table.len(),
                min_len
            );
            table.truncate(min_len);
        }
        table
    }
}

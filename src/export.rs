//! Table export (CSV, JSON) and per-metric summaries.

use serde::Serialize;
use std::io::{self, Write};

use crate::parsers::{MetricShape, Registry, TimeSeriesTable};
use crate::units::Unit;

/// Write the table as CSV: `timestamp,<keys...>`, one row per record
pub fn to_csv<W: Write>(table: &TimeSeriesTable, mut writer: W) -> io::Result<()> {
    write!(writer, "timestamp")?;
    for key in table.keys() {
        write!(writer, ",{}", key)?;
    }
    writeln!(writer)?;

    let columns: Vec<&[f64]> = table.iter().map(|(_, s)| s.values()).collect();
    for (row, timestamp) in table.timestamps().iter().enumerate() {
        write!(writer, "{}", timestamp)?;
        for column in &columns {
            write!(writer, ",{}", column[row])?;
        }
        writeln!(writer)?;
    }

    writer.flush()
}

/// Serialize the table as pretty JSON
pub fn to_json(table: &TimeSeriesTable) -> serde_json::Result<String> {
    serde_json::to_string_pretty(table)
}

/// Statistics over the values of one metric that came from a match
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricSummary {
    pub key: String,
    pub label: String,
    pub unit: Unit,
    /// Shape of the definition feeding the key; `None` for keys the registry
    /// does not know
    pub shape: Option<MetricShape>,
    /// Records where the metric was reported
    pub samples: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

/// Summarize every series of `table`. Sentinel entries are excluded, so a
/// metric that never matched reports zero samples and no statistics.
pub fn summarize(table: &TimeSeriesTable, registry: &Registry) -> Vec<MetricSummary> {
    table
        .iter()
        .map(|(key, series)| {
            let definition = registry.definition(key);
            let (label, unit) = registry
                .output(key)
                .map(|o| (o.label.clone(), o.unit))
                .unwrap_or_else(|| (key.to_string(), Unit::None));

            let mut samples = 0usize;
            let mut sum = 0.0;
            let mut min: Option<f64> = None;
            let mut max: Option<f64> = None;
            for v in series.present_values() {
                samples += 1;
                sum += v;
                min = Some(min.map_or(v, |m| m.min(v)));
                max = Some(max.map_or(v, |m| m.max(v)));
            }

            MetricSummary {
                key: key.to_string(),
                label,
                unit,
                shape: definition.map(|d| d.shape),
                samples,
                min,
                max,
                mean: (samples > 0).then(|| sum / samples as f64),
            }
        })
        .collect()
}

//! Display units for extracted metrics.
//!
//! Every registry output is scaled into one of these units before it is
//! appended to its series, so the unit is a property of the metric key and
//! never of an individual value.

use serde::Serialize;
use std::fmt;
use strum::{AsRefStr, EnumString};

/// Unit of an extracted metric series
#[derive(AsRefStr, Clone, Copy, Debug, Default, EnumString, PartialEq, Eq, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    /// Fraction scaled by 100
    Percent,
    /// Byte counts divided by 1024
    Kilobytes,
    /// Available memory (reported in kB) divided by 1024
    Megabytes,
    /// Round-trip statistics scaled from seconds
    Milliseconds,
    /// Oscillator frequency divided by 1,000,000
    Megahertz,
    Celsius,
    Seconds,
    /// Monotonic counters (sequence numbers, stalls, raw bytes)
    Count,
    /// Amplified task-average load, dimensionless
    Score,
    #[default]
    None,
}

impl Unit {
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Percent => "%",
            Unit::Kilobytes => "KB",
            Unit::Megabytes => "MB",
            Unit::Milliseconds => "ms",
            Unit::Megahertz => "MHz",
            Unit::Celsius => "°C",
            Unit::Seconds => "s",
            Unit::Count | Unit::Score | Unit::None => "",
        }
    }

    /// Format a value with this unit's symbol appended
    pub fn format_value(&self, value: f64, precision: usize) -> String {
        let symbol = self.symbol();
        if symbol.is_empty() {
            format!("{:.*}", precision, value)
        } else {
            format!("{:.*} {}", precision, value, symbol)
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

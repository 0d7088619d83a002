//! Core constants and the result types handed to callers.
//!
//! A parse is run to completion and produces exactly one [`LoadResult`]:
//! either a complete table or a single error description.

use std::path::PathBuf;

use crate::parsers::TimeSeriesTable;

// ============================================================================
// Constants
// ============================================================================

/// Literal prefix of every record line
pub const RECORD_PREFIX: &str = "Stats ";

/// Group label of the host's primary controller
pub const MAIN_CONTROLLER: &str = "mcu";

/// Auxiliary controller boards expanded by default
pub const DEFAULT_CONTROLLERS: &[&str] = &["toolhead0", "toolhead1"];

/// Heaters expanded by default
pub const DEFAULT_HEATERS: &[&str] = &["extruder", "extruder1", "heater_bed"];

/// Value appended when a metric's pattern does not match a record line
pub const DEFAULT_SENTINEL: f64 = 0.0;

/// Initial series capacity, avoids early reallocation on typical logs
pub const INITIAL_CAPACITY: usize = 4096;

// ============================================================================
// Core Types
// ============================================================================

/// A parsed log file
#[derive(Clone, Debug)]
pub struct LoadedFile {
    /// Path to the original file
    pub path: PathBuf,
    /// Display name for the file
    pub name: String,
    /// Parsed, time-aligned series
    pub table: TimeSeriesTable,
}

/// Result from a background load: never both, never a partial table
#[derive(Debug)]
pub enum LoadResult {
    Success(Box<LoadedFile>),
    Error(String),
}

//! klippylog - A fast Klipper host log performance analyzer written in Rust
//!
//! This library extracts the numeric telemetry embedded in `Stats` lines of a
//! Klipper `klippy.log` and returns it as a rectangular table of time-aligned
//! series, ready for plotting or export.
//!
//! ## Module Structure
//!
//! - [`parsers`] - Log reading and multi-metric extraction
//!   - `registry` - Declarative metric catalog (patterns, transforms, units)
//!   - `classifier` - Record line recognition
//!   - `extractor` - Applies every registry definition to a record line
//!   - `builder` - Lockstep accumulation of timestamps and series
//!   - `klippy` - Streaming and sharded-parallel file readers
//! - [`state`] - Core constants and load result types
//! - [`units`] - Display units for metric series
//! - [`export`] - CSV and JSON rendering of a parsed table
//! - [`loader`] - Background-thread loading with a single terminal result

pub mod export;
pub mod loader;
pub mod parsers;
pub mod state;
pub mod units;

//! Parser integration tests
//!
//! - Record counting and rectangularity
//! - Literal scenarios for controller and host metrics
//! - Instance isolation, sentinel fill, decode robustness
//! - Sharded parsing and error handling

pub mod klippy_tests;
pub mod registry_tests;

pub mod builder;
pub mod classifier;
pub mod extractor;
pub mod klippy;
pub mod registry;
pub mod types;

pub use builder::SeriesBuilder;
pub use classifier::classify_line;
pub use extractor::Extractor;
pub use klippy::{parse_file, Klippy};
pub use registry::{
    default_registry, MetricDefinition, MetricShape, Output, Registry, RegistryConfig,
    RegistryError, Transform,
};
pub use types::{ClassifiedLine, ParseError, Parseable, Series, TimeSeriesTable};

//! Applies every registry definition to a record line.

use super::registry::Registry;
use super::types::{ClassifiedLine, ParseError};

/// Evaluates each definition's pattern independently against a line.
///
/// Patterns are searched anywhere in the line, so one line may satisfy
/// several unrelated definitions at once.
pub struct Extractor<'r> {
    registry: &'r Registry,
}

impl<'r> Extractor<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    /// Fill `row` with exactly one slot per registry key, in key order.
    /// `None` marks an output whose definition did not match.
    ///
    /// A capture that matched but does not parse as a number aborts with
    /// [`ParseError::InvalidNumber`].
    pub fn extract(
        &self,
        line: &ClassifiedLine,
        line_number: usize,
        row: &mut Vec<Option<f64>>,
    ) -> Result<(), ParseError> {
        row.clear();

        for definition in self.registry.definitions() {
            match definition.pattern.captures(line.raw_text) {
                Some(caps) => {
                    for output in &definition.outputs {
                        let value = output.transform.apply(&caps).map_err(|value| {
                            ParseError::InvalidNumber {
                                line: line_number,
                                key: output.key.clone(),
                                value,
                            }
                        })?;
                        row.push(value);
                    }
                }
                None => row.extend(definition.outputs.iter().map(|_| None)),
            }
        }

        Ok(())
    }
}

//! Record line recognition.

use super::types::ClassifiedLine;
use crate::state::RECORD_PREFIX;

/// Classify one line. Returns `None` for anything that is not a
/// `Stats <float>:` record line, including a record prefix whose timestamp
/// does not parse; such lines are skipped, never fatal.
pub fn classify_line(line: &str) -> Option<ClassifiedLine<'_>> {
    if line.trim().is_empty() {
        return None;
    }

    let rest = line.strip_prefix(RECORD_PREFIX)?;
    let (timestamp, _) = rest.split_once(':')?;

    match parse_timestamp(timestamp) {
        Some(timestamp) => Some(ClassifiedLine {
            timestamp,
            raw_text: line,
        }),
        None => {
            tracing::debug!("Skipping record line with malformed timestamp: {:?}", timestamp);
            None
        }
    }
}

/// Parse the timestamp token of a record line (seconds, as logged).
/// Only `<digits>.<digits>` is a timestamp; integers, signs and exponents
/// are not.
fn parse_timestamp(token: &str) -> Option<f64> {
    let (whole, fraction) = token.split_once('.')?;
    let is_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !is_digits(whole) || !is_digits(fraction) {
        return None;
    }
    token.parse::<f64>().ok()
}

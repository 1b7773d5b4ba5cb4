//! Parsing of human-written durations such as `10s`, `500ms` or `1m30s`

use baokit_core::{Error, Result};
use std::time::Duration;

fn invalid(input: &str, reason: impl std::fmt::Display) -> Error {
    Error::configuration(format!("could not parse timeout duration '{input}': {reason}"))
}

fn unit_seconds(unit: &str) -> Option<f64> {
    match unit {
        "ns" => Some(1e-9),
        "us" | "µs" => Some(1e-6),
        "ms" => Some(1e-3),
        "s" => Some(1.0),
        "m" => Some(60.0),
        "h" => Some(3600.0),
        _ => None,
    }
}

/// Parse a duration written as one or more `<number><unit>` parts, e.g. `1h2m3.5s`.
///
/// Supported units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`; fractions are
/// accepted in every part. A bare number is read as seconds. Values too large for
/// a [`Duration`] are rejected.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid(input, "empty value"));
    }

    let total = match trimmed.parse::<f64>() {
        Ok(seconds) if trimmed.chars().all(|c| c.is_ascii_digit() || c == '.') => seconds,
        _ => compound_seconds(input, trimmed)?,
    };

    Duration::try_from_secs_f64(total).map_err(|e| invalid(input, e))
}

fn compound_seconds(input: &str, mut rest: &str) -> Result<f64> {
    let mut total = 0.0;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_end);
        if number.is_empty() {
            return Err(invalid(input, "expected a number"));
        }
        let value: f64 = number
            .parse()
            .map_err(|_| invalid(input, format!("bad number '{number}'")))?;

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);
        if unit.is_empty() {
            return Err(invalid(input, format!("missing unit after '{number}'")));
        }
        let scale = unit_seconds(unit).ok_or_else(|| invalid(input, format!("unknown unit '{unit}'")))?;

        total += value * scale;
        rest = next;
    }
    Ok(total)
}

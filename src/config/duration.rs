//! Go-style duration strings: `"500ms"`, `"30s"`, `"1m"`, `"1h30m"`, `"1.5s"`.

use super::ConfigError;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Parse a duration made of one or more `<number><unit>` pairs.
///
/// Units: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. Numbers may carry a decimal
/// fraction. A bare `"0"` is accepted; signs are not.
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(input.to_string());

    let s = input.trim();
    if s.is_empty() {
        return Err(invalid());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total_nanos = 0.0_f64;
    let mut rest = s;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if number_len == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];

        total_nanos += value * scale;
    }

    let total_nanos = total_nanos.round();
    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(total_nanos as u64))
}

/// serde helper for `#[serde(deserialize_with = ...)]` on `Duration` fields.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

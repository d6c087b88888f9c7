//! Prometheus-style duration strings (`30s`, `5m`, `1h30m`, `500ms`).

use std::time::Duration;

use crate::error::DurationError;

/// Units ordered from largest to smallest, with their size in milliseconds.
const UNITS: &[(&str, u64)] = &[
    ("y", 365 * 86_400_000),
    ("w", 7 * 86_400_000),
    ("d", 86_400_000),
    ("h", 3_600_000),
    ("m", 60_000),
    ("s", 1_000),
    ("ms", 1),
];

/// Parse a duration string into a [`Duration`].
///
/// Components can be combined ("2h30m", "1d12h") but must appear from the
/// largest unit to the smallest, each at most once. A bare `0` is accepted;
/// any other number needs a unit.
pub fn parse_duration(s: &str) -> Result<Duration, DurationError> {
    let err = |reason| DurationError {
        input: s.to_string(),
        reason,
    };

    let input = s.trim();
    if input.is_empty() {
        return Err(err("empty duration"));
    }
    if input == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total_ms: u64 = 0;
    let mut last_rank: Option<usize> = None;
    let mut rest = input;

    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits == 0 {
            return Err(err("expected a number"));
        }
        let n: u64 = rest[..digits]
            .parse()
            .map_err(|_| err("number out of range"))?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        if unit_len == 0 {
            return Err(err("missing unit"));
        }
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let rank = UNITS
            .iter()
            .position(|(u, _)| *u == unit)
            .ok_or_else(|| err("unknown unit"))?;
        if last_rank.is_some_and(|r| rank <= r) {
            return Err(err("units must go from largest to smallest"));
        }
        last_rank = Some(rank);

        total_ms = n
            .checked_mul(UNITS[rank].1)
            .and_then(|ms| total_ms.checked_add(ms))
            .ok_or_else(|| err("duration overflows"))?;
    }

    Ok(Duration::from_millis(total_ms))
}

/// Render a [`Duration`] in the same notation [`parse_duration`] accepts.
///
/// Sub-millisecond precision is dropped.
pub fn format_duration(d: Duration) -> String {
    let mut ms = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
    if ms == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    for (unit, size) in UNITS {
        if ms >= *size {
            out.push_str(&format!("{}{}", ms / size, unit));
            ms %= size;
        }
    }
    out
}

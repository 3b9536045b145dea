// SPDX-License-Identifier: Apache-2.0

//! Parsing of unit-suffixed duration strings such as `"5m"`, `"1h30m"`,
//! `"1.5h"` or `"-300ms"`.
//!
//! The accepted grammar is an optional sign followed by one or more
//! `<decimal><unit>` terms, where unit is one of `ns`, `us` (`µs`, `μs`), `ms`,
//! `s`, `m` or `h`. A bare `"0"` is also accepted. The result must fit in a
//! signed 64-bit count of nanoseconds.

use chrono::TimeDelta;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DurationError {
    #[error("invalid duration {0:?}")]
    Invalid(String),

    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),

    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },
}

const NANOS_PER_MICRO: u64 = 1_000;
const NANOS_PER_MILLI: u64 = 1_000_000;
const NANOS_PER_SEC: u64 = 1_000_000_000;

fn unit_nanos(unit: &str) -> Option<u64> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(60 * NANOS_PER_SEC),
        "h" => Some(3600 * NANOS_PER_SEC),
        _ => None,
    }
}

/// Consume leading ASCII digits. Returns the value, the rest of the input and
/// whether any digit was consumed; `None` on overflow.
fn leading_int(s: &str) -> Option<(u64, &str, bool)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let mut value: u64 = 0;
    for b in s[..end].bytes() {
        value = value.checked_mul(10)?.checked_add(u64::from(b - b'0'))?;
        if value > 1 << 63 {
            return None;
        }
    }
    Some((value, &s[end..], end > 0))
}

/// Consume the digits after a decimal point as `value / scale`. Digits beyond
/// what fits are dropped, losing only precision.
fn leading_fraction(s: &str) -> (u64, f64, &str, bool) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let mut value: u64 = 0;
    let mut scale = 1.0;
    let mut overflow = false;
    for b in s[..end].bytes() {
        if overflow {
            continue;
        }
        match value
            .checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(b - b'0')))
        {
            Some(v) if v <= 1 << 63 => {
                value = v;
                scale *= 10.0;
            }
            _ => overflow = true,
        }
    }
    (value, scale, &s[end..], end > 0)
}

/// Parse a duration string into a signed [`TimeDelta`].
pub fn parse_duration(input: &str) -> Result<TimeDelta, DurationError> {
    let invalid = || DurationError::Invalid(input.to_string());

    let mut s = input;
    let mut negative = false;
    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }

    if s == "0" {
        return Ok(TimeDelta::zero());
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total: u64 = 0;
    while !s.is_empty() {
        if !s.starts_with(|c: char| c == '.' || c.is_ascii_digit()) {
            return Err(invalid());
        }

        let (mut value, rest, has_int) = leading_int(s).ok_or_else(invalid)?;
        s = rest;

        let mut fraction = 0;
        let mut scale = 1.0;
        let mut has_fraction = false;
        if let Some(rest) = s.strip_prefix('.') {
            let (f, sc, rest, any) = leading_fraction(rest);
            fraction = f;
            scale = sc;
            has_fraction = any;
            s = rest;
        }
        if !has_int && !has_fraction {
            // ".s" or "."
            return Err(invalid());
        }

        let unit_end = s
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(s.len());
        if unit_end == 0 {
            return Err(DurationError::MissingUnit(input.to_string()));
        }
        let unit = &s[..unit_end];
        s = &s[unit_end..];
        let per_unit = unit_nanos(unit).ok_or_else(|| DurationError::UnknownUnit {
            unit: unit.to_string(),
            input: input.to_string(),
        })?;

        value = value.checked_mul(per_unit).ok_or_else(invalid)?;
        if value > 1 << 63 {
            return Err(invalid());
        }
        if fraction > 0 {
            let extra = (fraction as f64 * (per_unit as f64 / scale)) as u64;
            value = value.checked_add(extra).ok_or_else(invalid)?;
            if value > 1 << 63 {
                return Err(invalid());
            }
        }

        total = total.checked_add(value).ok_or_else(invalid)?;
        if total > 1 << 63 {
            return Err(invalid());
        }
    }

    let nanos = if negative {
        // -2^63 is representable, +2^63 is not
        0i64.checked_sub_unsigned(total).ok_or_else(invalid)?
    } else {
        i64::try_from(total).map_err(|_| invalid())?
    };

    Ok(TimeDelta::nanoseconds(nanos))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_units() {
        assert_eq!(parse_duration("0").unwrap(), TimeDelta::zero());
        assert_eq!(parse_duration("5s").unwrap(), TimeDelta::seconds(5));
        assert_eq!(parse_duration("5m").unwrap(), TimeDelta::minutes(5));
        assert_eq!(parse_duration("2h").unwrap(), TimeDelta::hours(2));
        assert_eq!(parse_duration("300ms").unwrap(), TimeDelta::milliseconds(300));
        assert_eq!(parse_duration("7us").unwrap(), TimeDelta::microseconds(7));
        assert_eq!(parse_duration("7µs").unwrap(), TimeDelta::microseconds(7));
        assert_eq!(parse_duration("12ns").unwrap(), TimeDelta::nanoseconds(12));
    }

    #[test]
    fn test_compound_and_fractional() {
        assert_eq!(parse_duration("1h30m").unwrap(), TimeDelta::minutes(90));
        assert_eq!(
            parse_duration("2h45m30.5s").unwrap(),
            TimeDelta::hours(2) + TimeDelta::minutes(45) + TimeDelta::milliseconds(30_500)
        );
        assert_eq!(parse_duration("1.5h").unwrap(), TimeDelta::minutes(90));
        assert_eq!(parse_duration(".5s").unwrap(), TimeDelta::milliseconds(500));
        assert_eq!(parse_duration("1.s").unwrap(), TimeDelta::seconds(1));
    }

    #[test]
    fn test_signs() {
        assert_eq!(parse_duration("-2s").unwrap(), TimeDelta::seconds(-2));
        assert_eq!(parse_duration("+2s").unwrap(), TimeDelta::seconds(2));
        assert_eq!(parse_duration("-0").unwrap(), TimeDelta::zero());
    }

    #[test]
    fn test_rejects_malformed() {
        for input in [
            "",
            "-",
            "not-a-duration",
            "5",
            "1h30",
            ".",
            ".s",
            "s",
            "1 h",
            "1h 30m",
        ] {
            assert!(parse_duration(input).is_err(), "{input:?} should not parse");
        }
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            parse_duration("10"),
            Err(DurationError::MissingUnit("10".to_string()))
        );
        assert_eq!(
            parse_duration("10d"),
            Err(DurationError::UnknownUnit {
                unit: "d".to_string(),
                input: "10d".to_string()
            })
        );
        assert_eq!(
            parse_duration("abc"),
            Err(DurationError::Invalid("abc".to_string()))
        );
    }

    #[test]
    fn test_overflow() {
        assert!(parse_duration("9223372036854775807ns").is_ok());
        assert!(parse_duration("9223372036854775808ns").is_err());
        assert!(parse_duration("-9223372036854775808ns").is_ok());
        assert!(parse_duration("3000000h").is_err());
    }
}

// SPDX-License-Identifier: Apache-2.0

use crate::watcher::duration::parse_duration;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tower::BoxError;

/// Parse a non-negative duration flag such as `"10s"` or `"1m30s"`.
pub(crate) fn parse_std_duration(s: &str) -> Result<Duration, BoxError> {
    let delta = parse_duration(s)?;
    Ok(delta
        .to_std()
        .map_err(|_| format!("duration must not be negative: {}", s))?)
}

// Support deser into a string from multiple value types. This allows a
// lookback of `0` to be written as a bare number.
pub(crate) fn deser_into_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Number(num) => Ok(num.to_string()),
        serde_json::Value::String(s) => Ok(s),
        _ => Err(serde::de::Error::custom(
            "unexpected value for string parameter",
        )),
    }
}

pub(crate) fn deser_into_string_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    deser_into_string(deserializer).map(Some)
}

//! Deep date coercion for remote reply payloads.
//!
//! Backends send instants as ISO-8601 UTC strings. Every string in a reply that
//! matches `YYYY-MM-DDTHH:mm:ss[.sss]Z` and denotes a real instant is turned
//! into [`Value::Date`]; everything else passes through unchanged.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::types::Value;

static TIMESTAMP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d{3})?Z$")
        .unwrap_or_else(|e| unreachable!("timestamp pattern is a valid regex: {e}"))
});

/// Parses a string in the fixed timestamp format.
///
/// Returns `None` when the string does not match the pattern, or matches it
/// but does not denote a valid instant (e.g. month 13).
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if !TIMESTAMP_PATTERN.is_match(s) {
        return None;
    }
    match DateTime::parse_from_rfc3339(s) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            tracing::warn!(value = s, error = %e, "timestamp-shaped string is not a valid instant");
            None
        }
    }
}

/// Recursively coerces timestamp strings into structured dates.
///
/// Walks maps and arrays at any depth. Already-coerced dates are left as they
/// are, so `coerce_dates(coerce_dates(x)) == coerce_dates(x)`.
#[must_use]
pub fn coerce_dates(value: Value) -> Value {
    match value {
        Value::String(s) => match parse_timestamp(&s) {
            Some(date) => Value::Date(date),
            None => Value::String(s),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(coerce_dates).collect()),
        Value::Map(map) => Value::Map(
            map.into_iter()
                .map(|(key, v)| (key, coerce_dates(v)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Timelike};
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    #[test]
    fn coerces_millisecond_timestamp() {
        let coerced = coerce_dates(Value::from("2025-06-21T06:52:09.461Z"));
        let date = coerced.as_date().expect("should be a date");
        assert_eq!(date.timestamp_subsec_millis(), 461);
        assert_eq!(date.second(), 9);
    }

    #[test]
    fn coerces_timestamp_without_fraction() {
        let coerced = coerce_dates(Value::from("2024-01-02T03:04:05Z"));
        assert_eq!(
            coerced,
            Value::Date(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
        );
    }

    #[test]
    fn leaves_non_matching_strings_alone() {
        for s in [
            "2024-01-02",
            "2024-01-02T03:04:05+00:00",
            "2024-01-02T03:04:05.1Z",
            "2024-01-02 03:04:05Z",
            "hello",
            "",
        ] {
            assert_eq!(coerce_dates(Value::from(s)), Value::from(s), "input {s}");
        }
    }

    #[test]
    fn pattern_match_with_invalid_instant_stays_string() {
        let s = "2024-13-40T25:61:61Z";
        assert_eq!(coerce_dates(Value::from(s)), Value::from(s));
    }

    #[test]
    fn walks_nested_maps_and_arrays() {
        let payload = Value::from(json!({
            "user": {
                "id": 1,
                "createdAt": "2025-06-21T06:52:09.461Z",
                "role": { "permissions": [ { "updatedAt": "2025-06-22T00:00:00Z" } ] }
            },
            "stamps": ["2025-06-21T06:52:09.461Z", 3, null],
            "note": "not a date"
        }));

        let coerced = coerce_dates(payload);
        let user = coerced.get("user").unwrap();
        assert!(user.get("createdAt").unwrap().as_date().is_some());
        assert_eq!(user.get("id"), Some(&Value::Int(1)));

        let permission = &user
            .get("role")
            .and_then(|r| r.get("permissions"))
            .and_then(Value::as_array)
            .unwrap()[0];
        assert!(permission.get("updatedAt").unwrap().as_date().is_some());

        let stamps = coerced.get("stamps").and_then(Value::as_array).unwrap();
        assert!(stamps[0].as_date().is_some());
        assert_eq!(stamps[1], Value::Int(3));
        assert_eq!(stamps[2], Value::Null);
        assert_eq!(coerced.get("note"), Some(&Value::from("not a date")));
    }

    #[test]
    fn scalars_pass_through() {
        assert_eq!(coerce_dates(Value::Null), Value::Null);
        assert_eq!(coerce_dates(Value::Bool(true)), Value::Bool(true));
        assert_eq!(coerce_dates(Value::Float(1.5)), Value::Float(1.5));
    }

    fn arb_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            "[a-z ]{0,12}".prop_map(Value::String),
            (0i64..4_102_444_800, 0u32..1000).prop_map(|(secs, millis)| {
                let dt = DateTime::from_timestamp(secs, millis * 1_000_000).unwrap();
                Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
            }),
        ]
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        arb_leaf().prop_recursive(4, 48, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-zA-Z]{1,8}", inner, 0..6).prop_map(Value::Map),
            ]
        })
    }

    proptest! {
        #[test]
        fn coercion_is_idempotent(value in arb_value()) {
            let once = coerce_dates(value);
            let twice = coerce_dates(once.clone());
            prop_assert_eq!(once, twice);
        }
    }
}

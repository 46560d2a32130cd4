//! Cell conversions between data types.

use super::value::{DataType, Value, DATE_FORMAT, TIMESTAMP_FORMAT};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

const DATE_INPUTS: &[&str] = &[DATE_FORMAT, "%Y/%m/%d", "%d.%m.%Y", "%m/%d/%Y", "%Y%m%d"];

const TIMESTAMP_INPUTS: &[&str] = &[
    TIMESTAMP_FORMAT,
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parses a timestamp from common textual forms.
///
/// RFC 3339 strings with offsets are converted to naive UTC. Bare dates
/// parse as midnight.
#[must_use]
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    TIMESTAMP_INPUTS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| parse_date(text).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

/// Parses a date from common textual forms. Timestamps are truncated.
#[must_use]
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_INPUTS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            TIMESTAMP_INPUTS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive()))
}

/// Converts one cell to `target`.
///
/// Nulls stay null. Returns a short reason when the cell cannot be
/// represented in the target type.
///
/// # Errors
///
/// Returns the reason as a string.
pub fn cast_value(value: &Value, target: DataType) -> Result<Value, String> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if value.data_type() == Some(target) {
        return Ok(value.clone());
    }

    let fail = || format!("cannot cast {value} to {target}");

    match (target, value) {
        (DataType::Null, _) => Err(fail()),
        (DataType::Json, v) => Ok(Value::Json(v.to_json())),
        (DataType::Utf8, Value::Json(serde_json::Value::String(s))) => Ok(Value::Str(s.clone())),
        (DataType::Utf8, v) => Ok(Value::Str(v.to_string())),

        (DataType::Int64, Value::Bool(b)) => Ok(Value::Int(i64::from(*b))),
        (DataType::Int64, Value::Float(f)) => float_to_int(*f).map(Value::Int).ok_or_else(fail),
        (DataType::Int64, Value::Str(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(float_to_int))
                .map(Value::Int)
                .ok_or_else(fail)
        }

        (DataType::Float64, Value::Bool(b)) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        #[allow(clippy::cast_precision_loss)]
        (DataType::Float64, Value::Int(i)) => Ok(Value::Float(*i as f64)),
        (DataType::Float64, Value::Str(s)) => {
            s.trim().parse::<f64>().map(Value::Float).map_err(|_| fail())
        }

        (DataType::Bool, Value::Int(i)) => match i {
            0 => Ok(Value::Bool(false)),
            1 => Ok(Value::Bool(true)),
            _ => Err(fail()),
        },
        (DataType::Bool, Value::Str(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Ok(Value::Bool(true)),
            "false" | "f" | "no" | "n" | "0" => Ok(Value::Bool(false)),
            _ => Err(fail()),
        },

        (DataType::Date, Value::Str(s)) => parse_date(s).map(Value::Date).ok_or_else(fail),
        (DataType::Date, Value::Timestamp(t)) => Ok(Value::Date(t.date())),

        (DataType::Timestamp, Value::Str(s)) => {
            parse_timestamp(s).map(Value::Timestamp).ok_or_else(fail)
        }
        (DataType::Timestamp, Value::Date(d)) => d
            .and_hms_opt(0, 0, 0)
            .map(Value::Timestamp)
            .ok_or_else(fail),

        _ => Err(fail()),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn float_to_int(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_to_int() {
        assert_eq!(cast_value(&Value::Str(" 42 ".into()), DataType::Int64), Ok(Value::Int(42)));
        assert_eq!(cast_value(&Value::Str("4.0".into()), DataType::Int64), Ok(Value::Int(4)));
        assert!(cast_value(&Value::Str("4.5".into()), DataType::Int64).is_err());
        assert!(cast_value(&Value::Str("abc".into()), DataType::Int64).is_err());
    }

    #[test]
    fn test_int_to_string_and_float() {
        assert_eq!(cast_value(&Value::Int(7), DataType::Utf8), Ok(Value::Str("7".into())));
        assert_eq!(cast_value(&Value::Int(7), DataType::Float64), Ok(Value::Float(7.0)));
    }

    #[test]
    fn test_null_passes_through() {
        assert_eq!(cast_value(&Value::Null, DataType::Int64), Ok(Value::Null));
    }

    #[test]
    fn test_bool_parsing() {
        assert_eq!(cast_value(&Value::Str("Yes".into()), DataType::Bool), Ok(Value::Bool(true)));
        assert!(cast_value(&Value::Int(2), DataType::Bool).is_err());
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        for text in [
            "2024-03-15",
            "2024/03/15",
            "15.03.2024",
            "2024-03-15T10:30:00",
            "2024-03-15T10:30:00+02:00",
        ] {
            assert_eq!(parse_date(text), Some(expected), "{text}");
        }
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn test_parse_timestamp_rfc3339_to_utc() {
        let ts = parse_timestamp("2024-03-15T10:30:00+02:00").unwrap();
        assert_eq!(ts.format(TIMESTAMP_FORMAT).to_string(), "2024-03-15T08:30:00");
        let midnight = parse_timestamp("2024-03-15").unwrap();
        assert_eq!(midnight.format(TIMESTAMP_FORMAT).to_string(), "2024-03-15T00:00:00");
    }
}

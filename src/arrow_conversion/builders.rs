//! Array builders for converting JSON row values to Arrow arrays.
//!
//! Each builder consumes one column of values with NULL handling and reports
//! the offending row and column on conversion failures.

use crate::error::ConversionError;
use crate::types::SqlType;
use arrow::array::{
    ArrayRef, BinaryBuilder, BooleanBuilder, Date32Builder, Decimal128Builder, Float32Builder,
    Float64Builder, Int16Builder, Int32Builder, Int64Builder, StringBuilder,
    Time64MicrosecondBuilder, TimestampMicrosecondBuilder,
};
use serde_json::Value;
use std::sync::Arc;

const MICROS_PER_SECOND: i64 = 1_000_000;
const SECONDS_PER_DAY: i64 = 86_400;

/// Build an Arrow array from JSON values for a specific engine type.
///
/// # Arguments
/// * `sql_type` - The engine column type
/// * `values` - Column of JSON values (one per row)
/// * `column` - Column index for error reporting
pub fn build_array(
    sql_type: &SqlType,
    values: &[&Value],
    column: usize,
) -> Result<ArrayRef, ConversionError> {
    match sql_type {
        SqlType::Boolean => build_boolean_array(values, column),
        SqlType::SmallInt => {
            let mut builder = Int16Builder::with_capacity(values.len());
            for (row, value) in values.iter().enumerate() {
                match integer_value(value, row, column)? {
                    Some(v) => builder.append_value(narrow(v, row, column)?),
                    None => builder.append_null(),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        SqlType::Integer => {
            let mut builder = Int32Builder::with_capacity(values.len());
            for (row, value) in values.iter().enumerate() {
                match integer_value(value, row, column)? {
                    Some(v) => builder.append_value(narrow(v, row, column)?),
                    None => builder.append_null(),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        SqlType::BigInt => {
            let mut builder = Int64Builder::with_capacity(values.len());
            for (row, value) in values.iter().enumerate() {
                builder.append_option(integer_value(value, row, column)?);
            }
            Ok(Arc::new(builder.finish()))
        }
        SqlType::Float => {
            let mut builder = Float32Builder::with_capacity(values.len());
            for (row, value) in values.iter().enumerate() {
                builder.append_option(float_value(value, row, column)?.map(|v| v as f32));
            }
            Ok(Arc::new(builder.finish()))
        }
        SqlType::Double => {
            let mut builder = Float64Builder::with_capacity(values.len());
            for (row, value) in values.iter().enumerate() {
                builder.append_option(float_value(value, row, column)?);
            }
            Ok(Arc::new(builder.finish()))
        }
        SqlType::Decimal { precision, scale } => {
            build_decimal128_array(values, *precision, *scale, column)
        }
        SqlType::Char { .. } | SqlType::Varchar { .. } => build_string_array(values, column),
        SqlType::Date => {
            let mut builder = Date32Builder::with_capacity(values.len());
            for (row, value) in values.iter().enumerate() {
                match text_value(value, "date", row, column)? {
                    Some(s) => builder.append_value(parse_date_to_days(s, row, column)?),
                    None => builder.append_null(),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        SqlType::Time => {
            let mut builder = Time64MicrosecondBuilder::with_capacity(values.len());
            for (row, value) in values.iter().enumerate() {
                match text_value(value, "time", row, column)? {
                    Some(s) => builder.append_value(parse_time_to_micros(s, row, column)?),
                    None => builder.append_null(),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        SqlType::Timestamp => {
            let mut builder = TimestampMicrosecondBuilder::with_capacity(values.len());
            for (row, value) in values.iter().enumerate() {
                match text_value(value, "timestamp", row, column)? {
                    Some(s) => builder.append_value(parse_timestamp_to_micros(s, row, column)?),
                    None => builder.append_null(),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        SqlType::Binary => build_binary_array(values, column),
    }
}

fn conversion_failed(row: usize, column: usize, message: String) -> ConversionError {
    ConversionError::ValueConversionFailed {
        row,
        column,
        message,
    }
}

fn narrow<T: TryFrom<i64>>(value: i64, row: usize, column: usize) -> Result<T, ConversionError> {
    T::try_from(value)
        .map_err(|_| conversion_failed(row, column, format!("Value {} out of range", value)))
}

pub(crate) fn integer_value(
    value: &Value,
    row: usize,
    column: usize,
) -> Result<Option<i64>, ConversionError> {
    if value.is_null() {
        return Ok(None);
    }
    if let Some(i) = value.as_i64() {
        return Ok(Some(i));
    }
    if let Some(s) = value.as_str() {
        return s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| conversion_failed(row, column, format!("Invalid integer: {}", s)));
    }
    Err(conversion_failed(
        row,
        column,
        format!("Expected integer, got: {:?}", value),
    ))
}

pub(crate) fn float_value(
    value: &Value,
    row: usize,
    column: usize,
) -> Result<Option<f64>, ConversionError> {
    if value.is_null() {
        return Ok(None);
    }
    if let Some(f) = value.as_f64() {
        return Ok(Some(f));
    }
    if let Some(s) = value.as_str() {
        let f = match s {
            "Infinity" => f64::INFINITY,
            "-Infinity" => f64::NEG_INFINITY,
            "NaN" => f64::NAN,
            _ => s
                .trim()
                .parse::<f64>()
                .map_err(|_| conversion_failed(row, column, format!("Invalid float: {}", s)))?,
        };
        return Ok(Some(f));
    }
    Err(conversion_failed(
        row,
        column,
        format!("Expected number, got: {:?}", value),
    ))
}

fn text_value<'a>(
    value: &'a Value,
    expected: &str,
    row: usize,
    column: usize,
) -> Result<Option<&'a str>, ConversionError> {
    if value.is_null() {
        return Ok(None);
    }
    value.as_str().map(Some).ok_or_else(|| {
        conversion_failed(
            row,
            column,
            format!("Expected {} string, got: {:?}", expected, value),
        )
    })
}

fn build_boolean_array(values: &[&Value], column: usize) -> Result<ArrayRef, ConversionError> {
    let mut builder = BooleanBuilder::with_capacity(values.len());

    for (row, value) in values.iter().enumerate() {
        if value.is_null() {
            builder.append_null();
        } else if let Some(b) = value.as_bool() {
            builder.append_value(b);
        } else {
            return Err(conversion_failed(
                row,
                column,
                format!("Expected boolean, got: {:?}", value),
            ));
        }
    }

    Ok(Arc::new(builder.finish()))
}

fn build_string_array(values: &[&Value], column: usize) -> Result<ArrayRef, ConversionError> {
    let estimated_bytes: usize = values
        .iter()
        .filter_map(|v| v.as_str())
        .map(str::len)
        .sum();
    let mut builder = StringBuilder::with_capacity(values.len(), estimated_bytes);

    for (row, value) in values.iter().enumerate() {
        match value {
            Value::Null => builder.append_null(),
            Value::String(s) => builder.append_value(s),
            Value::Number(n) => builder.append_value(n.to_string()),
            Value::Bool(b) => builder.append_value(b.to_string()),
            other => {
                return Err(conversion_failed(
                    row,
                    column,
                    format!("Expected string, got: {:?}", other),
                ))
            }
        }
    }

    Ok(Arc::new(builder.finish()))
}

fn build_decimal128_array(
    values: &[&Value],
    precision: u8,
    scale: i8,
    column: usize,
) -> Result<ArrayRef, ConversionError> {
    let precision = precision.clamp(1, 38);
    let mut builder = Decimal128Builder::with_capacity(values.len())
        .with_precision_and_scale(precision, scale)?;

    for (row, value) in values.iter().enumerate() {
        if value.is_null() {
            builder.append_null();
        } else {
            builder.append_value(parse_decimal_to_i128(value, scale, row, column)?);
        }
    }

    Ok(Arc::new(builder.finish()))
}

/// Parse a JSON number or decimal string into an unscaled i128.
fn parse_decimal_to_i128(
    value: &Value,
    scale: i8,
    row: usize,
    column: usize,
) -> Result<i128, ConversionError> {
    let scale = scale.max(0) as u32;
    let factor = 10_i128.pow(scale);
    let overflow = || conversion_failed(row, column, "Decimal value overflows".to_string());

    let text = match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return i128::from(i).checked_mul(factor).ok_or_else(overflow);
            }
            n.to_string()
        }
        Value::String(s) => s.trim().to_string(),
        other => {
            return Err(conversion_failed(
                row,
                column,
                format!("Expected numeric value, got: {:?}", other),
            ))
        }
    };

    let negative = text.starts_with('-');
    let unsigned = text.trim_start_matches(['-', '+']);
    let (integer_part, fraction_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));

    let invalid = || conversion_failed(row, column, format!("Invalid decimal format: {}", text));
    if integer_part.is_empty() && fraction_part.is_empty() {
        return Err(invalid());
    }
    if !integer_part.chars().all(|c| c.is_ascii_digit())
        || !fraction_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }

    let integer: i128 = if integer_part.is_empty() {
        0
    } else {
        integer_part.parse().map_err(|_| overflow())?
    };

    let digits = fraction_part.len().min(scale as usize);
    let mut fraction: i128 = if digits == 0 {
        0
    } else {
        fraction_part[..digits].parse().map_err(|_| invalid())?
    };
    fraction *= 10_i128.pow(scale - digits as u32);

    let unscaled = integer
        .checked_mul(factor)
        .and_then(|v| v.checked_add(fraction))
        .ok_or_else(overflow)?;

    Ok(if negative { -unscaled } else { unscaled })
}

/// Parse a `YYYY-MM-DD` date to days since the Unix epoch.
fn parse_date_to_days(date_str: &str, row: usize, column: usize) -> Result<i32, ConversionError> {
    let invalid = || conversion_failed(row, column, format!("Invalid date format: {}", date_str));

    let mut parts = date_str.trim().splitn(3, '-');
    let year: i64 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(invalid)?;
    let month: i64 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(invalid)?;
    let day: i64 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(invalid)?;

    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(invalid());
    }

    narrow(days_from_civil(year, month, day), row, column)
}

/// Days since 1970-01-01 in the proleptic Gregorian calendar.
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = (if year >= 0 { year } else { year - 399 }) / 400;
    let year_of_era = year - era * 400;
    let shifted_month = (month + 9) % 12;
    let day_of_year = (153 * shifted_month + 2) / 5 + day - 1;
    let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
    era * 146_097 + day_of_era - 719_468
}

/// Parse `HH:MM[:SS[.ffffff]]` to microseconds since midnight.
fn parse_time_to_micros(time_str: &str, row: usize, column: usize) -> Result<i64, ConversionError> {
    let invalid = || conversion_failed(row, column, format!("Invalid time format: {}", time_str));
    let overflow = || conversion_failed(row, column, format!("Time value overflows: {}", time_str));

    let mut parts = time_str.trim().split(':');
    let hours: i64 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(invalid)?;
    let minutes: i64 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(invalid)?;

    let mut micros = hours
        .checked_mul(3600)
        .and_then(|h| minutes.checked_mul(60).and_then(|m| h.checked_add(m)))
        .and_then(|secs| secs.checked_mul(MICROS_PER_SECOND))
        .ok_or_else(overflow)?;

    if let Some(seconds) = parts.next() {
        let (whole, fraction) = seconds.split_once('.').unwrap_or((seconds, ""));
        let whole: i64 = whole.parse().map_err(|_| invalid())?;
        micros = whole
            .checked_mul(MICROS_PER_SECOND)
            .and_then(|w| micros.checked_add(w))
            .ok_or_else(overflow)?;

        if !fraction.is_empty() {
            let digits: String = fraction.chars().take(6).collect();
            let padded = format!("{:0<6}", digits);
            let fraction = padded.parse::<i64>().map_err(|_| invalid())?;
            micros = micros.checked_add(fraction).ok_or_else(overflow)?;
        }
    }

    Ok(micros)
}

/// Parse `YYYY-MM-DD[ HH:MM[:SS[.ffffff]]]` to microseconds since the Unix epoch.
fn parse_timestamp_to_micros(
    timestamp_str: &str,
    row: usize,
    column: usize,
) -> Result<i64, ConversionError> {
    let overflow = || {
        conversion_failed(
            row,
            column,
            format!("Timestamp value overflows: {}", timestamp_str),
        )
    };
    let trimmed = timestamp_str.trim();
    let (date, time) = trimmed
        .split_once([' ', 'T'])
        .map(|(d, t)| (d, Some(t)))
        .unwrap_or((trimmed, None));

    let days = i64::from(parse_date_to_days(date, row, column)?);
    let mut micros = days
        .checked_mul(SECONDS_PER_DAY * MICROS_PER_SECOND)
        .ok_or_else(overflow)?;

    if let Some(time) = time {
        micros = micros
            .checked_add(parse_time_to_micros(time, row, column)?)
            .ok_or_else(overflow)?;
    }

    Ok(micros)
}

/// Build a Binary array from JSON byte arrays.
fn build_binary_array(values: &[&Value], column: usize) -> Result<ArrayRef, ConversionError> {
    let mut builder = BinaryBuilder::with_capacity(values.len(), values.len() * 16);

    for (row, value) in values.iter().enumerate() {
        match value {
            Value::Null => builder.append_null(),
            Value::String(s) => builder.append_value(s.as_bytes()),
            Value::Array(items) => {
                let bytes = items
                    .iter()
                    .map(|item| {
                        item.as_u64()
                            .and_then(|b| u8::try_from(b).ok())
                            .ok_or_else(|| {
                                conversion_failed(
                                    row,
                                    column,
                                    format!("Invalid byte value: {:?}", item),
                                )
                            })
                    })
                    .collect::<Result<Vec<u8>, _>>()?;
                builder.append_value(bytes);
            }
            other => {
                return Err(conversion_failed(
                    row,
                    column,
                    format!("Expected binary value, got: {:?}", other),
                ))
            }
        }
    }

    Ok(Arc::new(builder.finish()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Date32Array, Decimal128Array, Int32Array, StringArray};
    use serde_json::json;

    #[test]
    fn test_integer_array_with_nulls() {
        let values = [json!(1), json!(null), json!("3")];
        let refs: Vec<&Value> = values.iter().collect();
        let array = build_array(&SqlType::Integer, &refs, 0).unwrap();
        let array = array.as_any().downcast_ref::<Int32Array>().unwrap();

        assert_eq!(array.value(0), 1);
        assert!(array.is_null(1));
        assert_eq!(array.value(2), 3);
    }

    #[test]
    fn test_integer_out_of_range() {
        let values = [json!(70000)];
        let refs: Vec<&Value> = values.iter().collect();
        let err = build_array(&SqlType::SmallInt, &refs, 2).unwrap_err();
        assert!(matches!(
            err,
            ConversionError::ValueConversionFailed { row: 0, column: 2, .. }
        ));
    }

    #[test]
    fn test_decimal_parsing() {
        assert_eq!(parse_decimal_to_i128(&json!("123.45"), 2, 0, 0).unwrap(), 12345);
        assert_eq!(parse_decimal_to_i128(&json!("-1.5"), 2, 0, 0).unwrap(), -150);
        assert_eq!(parse_decimal_to_i128(&json!(7), 3, 0, 0).unwrap(), 7000);
        assert_eq!(parse_decimal_to_i128(&json!("0.129"), 2, 0, 0).unwrap(), 12);
        assert!(parse_decimal_to_i128(&json!("1.2.3"), 2, 0, 0).is_err());
    }

    #[test]
    fn test_decimal_array() {
        let values = [json!("10.50"), json!(null)];
        let refs: Vec<&Value> = values.iter().collect();
        let array = build_array(
            &SqlType::Decimal {
                precision: 10,
                scale: 2,
            },
            &refs,
            0,
        )
        .unwrap();
        let array = array.as_any().downcast_ref::<Decimal128Array>().unwrap();
        assert_eq!(array.value(0), 1050);
        assert!(array.is_null(1));
    }

    #[test]
    fn test_date_parsing() {
        assert_eq!(parse_date_to_days("1970-01-01", 0, 0).unwrap(), 0);
        assert_eq!(parse_date_to_days("2000-03-01", 0, 0).unwrap(), 11017);
        assert_eq!(parse_date_to_days("1969-12-31", 0, 0).unwrap(), -1);
        assert!(parse_date_to_days("2024-13-01", 0, 0).is_err());
    }

    #[test]
    fn test_date_array() {
        let values = [json!("2024-01-31")];
        let refs: Vec<&Value> = values.iter().collect();
        let array = build_array(&SqlType::Date, &refs, 0).unwrap();
        let array = array.as_any().downcast_ref::<Date32Array>().unwrap();
        assert_eq!(array.value(0), 19753);
    }

    #[test]
    fn test_time_and_timestamp_parsing() {
        assert_eq!(
            parse_time_to_micros("01:02:03.5", 0, 0).unwrap(),
            3_723_500_000
        );
        assert_eq!(
            parse_timestamp_to_micros("1970-01-02 00:00:01", 0, 0).unwrap(),
            86_401_000_000
        );
        assert_eq!(
            parse_timestamp_to_micros("1970-01-01", 0, 0).unwrap(),
            0
        );
    }

    #[test]
    fn test_time_overflow_is_a_conversion_error() {
        for text in [
            "9223372036854775807:00",
            "00:9223372036854775807",
            "00:00:9223372036854775807",
        ] {
            assert!(matches!(
                parse_time_to_micros(text, 3, 1).unwrap_err(),
                ConversionError::ValueConversionFailed { row: 3, column: 1, .. }
            ));
        }
        assert!(parse_timestamp_to_micros("1970-01-01 2562047789:00", 0, 0).is_err());
    }

    #[test]
    fn test_string_array_accepts_scalars() {
        let values = [json!("a"), json!(5), json!(null)];
        let refs: Vec<&Value> = values.iter().collect();
        let array = build_array(&SqlType::Varchar { size: 10 }, &refs, 0).unwrap();
        let array = array.as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(array.value(0), "a");
        assert_eq!(array.value(1), "5");
        assert!(array.is_null(2));
    }

    #[test]
    fn test_boolean_rejects_numbers() {
        let values = [json!(1)];
        let refs: Vec<&Value> = values.iter().collect();
        assert!(build_array(&SqlType::Boolean, &refs, 0).is_err());
    }
}

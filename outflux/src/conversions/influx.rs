use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::{bail, etl_error};
use crate::types::{Cell, DataType};

/// Converts one JSON value of an InfluxDB result into a [`Cell`].
pub type CellConverter = fn(&Value) -> EtlResult<Cell>;

/// Returns the converter for values of a column of type `data_type`.
///
/// JSON `null` becomes [`Cell::Null`] for every type. Fails with
/// [`ErrorKind::UnsupportedType`] for [`DataType::Unknown`].
pub fn converter_for(data_type: DataType) -> EtlResult<CellConverter> {
    let converter: CellConverter = match data_type {
        DataType::Int32 => to_i32,
        DataType::Int64 => to_i64,
        DataType::Float32 => to_f32,
        DataType::Float64 => to_f64,
        DataType::String => to_string,
        DataType::Boolean => to_bool,
        DataType::Timestamp => to_timestamp,
        DataType::TimestampTz => to_timestamptz,
        DataType::Json => to_json,
        DataType::Unknown => bail!(
            ErrorKind::UnsupportedType,
            "No converter for column type",
            data_type
        ),
    };

    Ok(converter)
}

fn mismatch(expected: DataType, value: &Value) -> EtlError {
    etl_error!(
        ErrorKind::ConversionError,
        "Source value does not match the column type",
        format!("expected {expected}, got {value}")
    )
}

fn to_i32(value: &Value) -> EtlResult<Cell> {
    match value {
        Value::Null => Ok(Cell::Null),
        Value::Number(number) => number
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .map(Cell::I32)
            .ok_or_else(|| mismatch(DataType::Int32, value)),
        _ => Err(mismatch(DataType::Int32, value)),
    }
}

fn to_i64(value: &Value) -> EtlResult<Cell> {
    match value {
        Value::Null => Ok(Cell::Null),
        Value::Number(number) => number
            .as_i64()
            .map(Cell::I64)
            .ok_or_else(|| mismatch(DataType::Int64, value)),
        _ => Err(mismatch(DataType::Int64, value)),
    }
}

fn to_f32(value: &Value) -> EtlResult<Cell> {
    match value {
        Value::Null => Ok(Cell::Null),
        Value::Number(number) => number
            .as_f64()
            .map(|n| Cell::F32(n as f32))
            .ok_or_else(|| mismatch(DataType::Float32, value)),
        _ => Err(mismatch(DataType::Float32, value)),
    }
}

fn to_f64(value: &Value) -> EtlResult<Cell> {
    match value {
        Value::Null => Ok(Cell::Null),
        // Integers are widened, a float field may hold integral JSON numbers.
        Value::Number(number) => number
            .as_f64()
            .map(Cell::F64)
            .ok_or_else(|| mismatch(DataType::Float64, value)),
        _ => Err(mismatch(DataType::Float64, value)),
    }
}

fn to_string(value: &Value) -> EtlResult<Cell> {
    match value {
        Value::Null => Ok(Cell::Null),
        Value::String(s) => Ok(Cell::String(s.clone())),
        _ => Err(mismatch(DataType::String, value)),
    }
}

fn to_bool(value: &Value) -> EtlResult<Cell> {
    match value {
        Value::Null => Ok(Cell::Null),
        Value::Bool(b) => Ok(Cell::Bool(*b)),
        _ => Err(mismatch(DataType::Boolean, value)),
    }
}

/// Parses an RFC3339 timestamp, or an integer number of nanoseconds since the epoch.
fn parse_time(value: &Value, expected: DataType) -> EtlResult<Option<DateTime<Utc>>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => {
            let parsed = DateTime::parse_from_rfc3339(s)?;
            Ok(Some(parsed.with_timezone(&Utc)))
        }
        Value::Number(number) => number
            .as_i64()
            .map(|nanos| Some(DateTime::<Utc>::from_timestamp_nanos(nanos)))
            .ok_or_else(|| mismatch(expected, value)),
        _ => Err(mismatch(expected, value)),
    }
}

fn to_timestamp(value: &Value) -> EtlResult<Cell> {
    let parsed = parse_time(value, DataType::Timestamp)?;
    Ok(parsed
        .map(|ts| Cell::TimeStamp(ts.naive_utc()))
        .unwrap_or(Cell::Null))
}

fn to_timestamptz(value: &Value) -> EtlResult<Cell> {
    let parsed = parse_time(value, DataType::TimestampTz)?;
    Ok(parsed.map(Cell::TimeStampTz).unwrap_or(Cell::Null))
}

fn to_json(value: &Value) -> EtlResult<Cell> {
    match value {
        Value::Null => Ok(Cell::Null),
        other => Ok(Cell::Json(other.clone())),
    }
}

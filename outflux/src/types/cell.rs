use chrono::{DateTime, NaiveDateTime, Utc};

use crate::types::DataType;

/// A single canonical value of a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    TimeStamp(NaiveDateTime),
    TimeStampTz(DateTime<Utc>),
    Json(serde_json::Value),
}

impl Cell {
    /// Returns the type of the value, `None` for [`Cell::Null`].
    pub fn data_type(&self) -> Option<DataType> {
        let data_type = match self {
            Cell::Null => return None,
            Cell::Bool(_) => DataType::Boolean,
            Cell::I32(_) => DataType::Int32,
            Cell::I64(_) => DataType::Int64,
            Cell::F32(_) => DataType::Float32,
            Cell::F64(_) => DataType::Float64,
            Cell::String(_) => DataType::String,
            Cell::TimeStamp(_) => DataType::Timestamp,
            Cell::TimeStampTz(_) => DataType::TimestampTz,
            Cell::Json(_) => DataType::Json,
        };

        Some(data_type)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Converts the value into JSON, used when several columns are folded into one.
    ///
    /// Non finite floats have no JSON representation and become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            Cell::Null => Value::Null,
            Cell::Bool(value) => Value::Bool(*value),
            Cell::I32(value) => Value::from(*value),
            Cell::I64(value) => Value::from(*value),
            Cell::F32(value) => serde_json::Number::from_f64(f64::from(*value))
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Cell::F64(value) => serde_json::Number::from_f64(*value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Cell::String(value) => Value::String(value.clone()),
            Cell::TimeStamp(value) => {
                Value::String(value.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            Cell::TimeStampTz(value) => Value::String(value.to_rfc3339()),
            Cell::Json(value) => value.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reports_data_type() {
        assert_eq!(Cell::Null.data_type(), None);
        assert_eq!(Cell::I32(1).data_type(), Some(DataType::Int32));
        assert_eq!(
            Cell::Json(json!({"a": 1})).data_type(),
            Some(DataType::Json)
        );
    }

    #[test]
    fn converts_to_json() {
        assert_eq!(Cell::I64(42).to_json(), json!(42));
        assert_eq!(Cell::F64(1.5).to_json(), json!(1.5));
        assert_eq!(Cell::F64(f64::NAN).to_json(), json!(null));
        assert_eq!(Cell::String("eu".to_string()).to_json(), json!("eu"));
        assert_eq!(Cell::Bool(true).to_json(), json!(true));

        let ts = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            Cell::TimeStampTz(ts).to_json(),
            json!("2024-01-01T00:00:00+00:00")
        );
    }
}

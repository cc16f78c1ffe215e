use std::fmt;

/// Canonical column type, independent of both the source and the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    Boolean,
    /// Timestamp without time zone.
    Timestamp,
    /// Timestamp with time zone, always normalized to UTC.
    TimestampTz,
    Json,
    /// A destination type with no canonical counterpart.
    Unknown,
}

impl DataType {
    /// Returns whether every value of `self` can be stored in a column of type `target`
    /// without loss.
    ///
    /// Widening is partial: `Int32` fits `Int64`, `Float32` and `Float64`; `Int64` and
    /// `Float32` fit `Float64`; `Timestamp` fits `TimestampTz`. Every type fits itself.
    pub fn can_fit_into(self, target: DataType) -> bool {
        use DataType::*;

        if self == target {
            return true;
        }

        matches!(
            (self, target),
            (Int32, Int64 | Float32 | Float64)
                | (Int64, Float64)
                | (Float32, Float64)
                | (Timestamp, TimestampTz)
        )
    }

    pub fn is_timestamp(self) -> bool {
        matches!(self, DataType::Timestamp | DataType::TimestampTz)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
            DataType::String => "string",
            DataType::Boolean => "boolean",
            DataType::Timestamp => "timestamp",
            DataType::TimestampTz => "timestamptz",
            DataType::Json => "json",
            DataType::Unknown => "unknown",
        };

        f.write_str(name)
    }
}

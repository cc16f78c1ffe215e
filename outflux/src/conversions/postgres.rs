use std::error::Error;

use bytes::BytesMut;
use chrono::{DateTime, Utc};
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};

use crate::{bail, etl_error};
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::types::{Cell, DataType};

/// Returns the Postgres column type used to store values of `data_type`.
pub fn pg_type(data_type: DataType) -> EtlResult<Type> {
    let typ = match data_type {
        DataType::Int32 => Type::INT4,
        DataType::Int64 => Type::INT8,
        DataType::Float32 => Type::FLOAT4,
        DataType::Float64 => Type::FLOAT8,
        DataType::String => Type::TEXT,
        DataType::Boolean => Type::BOOL,
        DataType::Timestamp => Type::TIMESTAMP,
        DataType::TimestampTz => Type::TIMESTAMPTZ,
        DataType::Json => Type::JSONB,
        DataType::Unknown => bail!(
            ErrorKind::UnsupportedType,
            "Column type has no Postgres mapping",
            data_type
        ),
    };

    Ok(typ)
}

/// Returns the SQL type name used in `CREATE TABLE` for `data_type`.
pub fn sql_type_name(data_type: DataType) -> EtlResult<&'static str> {
    let name = match data_type {
        DataType::Int32 => "integer",
        DataType::Int64 => "bigint",
        DataType::Float32 => "real",
        DataType::Float64 => "double precision",
        DataType::String => "text",
        DataType::Boolean => "boolean",
        DataType::Timestamp => "timestamp",
        DataType::TimestampTz => "timestamptz",
        DataType::Json => "jsonb",
        DataType::Unknown => bail!(
            ErrorKind::UnsupportedType,
            "Column type has no Postgres mapping",
            data_type
        ),
    };

    Ok(name)
}

/// Maps an `information_schema.columns.data_type` value to a [`DataType`].
///
/// Types with no canonical counterpart map to [`DataType::Unknown`].
pub fn data_type_from_information_schema(name: &str) -> DataType {
    match name {
        "integer" => DataType::Int32,
        "bigint" => DataType::Int64,
        "real" => DataType::Float32,
        "double precision" => DataType::Float64,
        "text" | "character varying" | "character" => DataType::String,
        "boolean" => DataType::Boolean,
        "timestamp without time zone" => DataType::Timestamp,
        "timestamp with time zone" => DataType::TimestampTz,
        "json" | "jsonb" => DataType::Json,
        _ => DataType::Unknown,
    }
}

/// Encodes a cell for a destination column of type `ty`.
///
/// Values are widened to the column type following [`DataType::can_fit_into`], so a cell can
/// be written to any column it fits into.
impl ToSql for Cell {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            Cell::Null => return Ok(IsNull::Yes),
            Cell::Bool(value) => {
                if *ty == Type::BOOL {
                    return value.to_sql(ty, out);
                }
            }
            Cell::I32(value) => match *ty {
                Type::INT4 => return value.to_sql(ty, out),
                Type::INT8 => return i64::from(*value).to_sql(ty, out),
                Type::FLOAT4 => return (*value as f32).to_sql(ty, out),
                Type::FLOAT8 => return f64::from(*value).to_sql(ty, out),
                _ => {}
            },
            Cell::I64(value) => match *ty {
                Type::INT8 => return value.to_sql(ty, out),
                Type::FLOAT8 => return (*value as f64).to_sql(ty, out),
                _ => {}
            },
            Cell::F32(value) => match *ty {
                Type::FLOAT4 => return value.to_sql(ty, out),
                Type::FLOAT8 => return f64::from(*value).to_sql(ty, out),
                _ => {}
            },
            Cell::F64(value) => {
                if *ty == Type::FLOAT8 {
                    return value.to_sql(ty, out);
                }
            }
            Cell::String(value) => match *ty {
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => return value.as_str().to_sql(ty, out),
                _ => {}
            },
            Cell::TimeStamp(value) => match *ty {
                Type::TIMESTAMP => return value.to_sql(ty, out),
                Type::TIMESTAMPTZ => {
                    return DateTime::<Utc>::from_naive_utc_and_offset(*value, Utc).to_sql(ty, out);
                }
                _ => {}
            },
            Cell::TimeStampTz(value) => {
                if *ty == Type::TIMESTAMPTZ {
                    return value.to_sql(ty, out);
                }
            }
            Cell::Json(value) => match *ty {
                Type::JSON | Type::JSONB => return value.to_sql(ty, out),
                _ => {}
            },
        }

        Err(Box::new(etl_error!(
            ErrorKind::ConversionError,
            "Cell cannot be encoded for the destination column",
            format!("{self:?} as {ty}")
        )))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            *ty,
            Type::BOOL
                | Type::INT4
                | Type::INT8
                | Type::FLOAT4
                | Type::FLOAT8
                | Type::TEXT
                | Type::VARCHAR
                | Type::BPCHAR
                | Type::TIMESTAMP
                | Type::TIMESTAMPTZ
                | Type::JSON
                | Type::JSONB
        )
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use serde_json::json;
    use tokio_postgres::types::FromSql;

    fn encode(cell: &Cell, ty: &Type) -> BytesMut {
        let mut out = BytesMut::new();
        let is_null = cell.to_sql(ty, &mut out).unwrap();
        assert!(matches!(is_null, IsNull::No));
        out
    }

    fn decode<'a, T: FromSql<'a>>(ty: &Type, raw: &'a [u8]) -> T {
        T::from_sql(ty, raw).unwrap()
    }

    #[test]
    fn every_supported_type_survives_binary_encoding() {
        let ts = DateTime::parse_from_rfc3339("2024-05-01T12:30:00.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        let naive: NaiveDateTime = ts.naive_utc();
        let doc = json!({"host": "a", "cpu": 3});

        assert!(decode::<bool>(&Type::BOOL, &encode(&Cell::Bool(true), &Type::BOOL)));
        assert_eq!(decode::<i32>(&Type::INT4, &encode(&Cell::I32(-7), &Type::INT4)), -7);
        assert_eq!(
            decode::<i64>(&Type::INT8, &encode(&Cell::I64(1 << 40), &Type::INT8)),
            1 << 40
        );
        assert_eq!(
            decode::<f32>(&Type::FLOAT4, &encode(&Cell::F32(0.25), &Type::FLOAT4)),
            0.25
        );
        assert_eq!(
            decode::<f64>(&Type::FLOAT8, &encode(&Cell::F64(-1.5e10), &Type::FLOAT8)),
            -1.5e10
        );
        assert_eq!(
            decode::<String>(
                &Type::TEXT,
                &encode(&Cell::String("eu-west".to_string()), &Type::TEXT)
            ),
            "eu-west"
        );
        assert_eq!(
            decode::<NaiveDateTime>(
                &Type::TIMESTAMP,
                &encode(&Cell::TimeStamp(naive), &Type::TIMESTAMP)
            ),
            naive
        );
        assert_eq!(
            decode::<DateTime<Utc>>(
                &Type::TIMESTAMPTZ,
                &encode(&Cell::TimeStampTz(ts), &Type::TIMESTAMPTZ)
            ),
            ts
        );
        assert_eq!(
            decode::<serde_json::Value>(
                &Type::JSONB,
                &encode(&Cell::Json(doc.clone()), &Type::JSONB)
            ),
            doc
        );
    }

    #[test]
    fn narrower_values_are_widened_to_the_column_type() {
        assert_eq!(decode::<i64>(&Type::INT8, &encode(&Cell::I32(5), &Type::INT8)), 5);
        assert_eq!(
            decode::<f64>(&Type::FLOAT8, &encode(&Cell::I64(5), &Type::FLOAT8)),
            5.0
        );
        assert_eq!(
            decode::<f64>(&Type::FLOAT8, &encode(&Cell::F32(0.5), &Type::FLOAT8)),
            0.5
        );

        let naive = DateTime::<Utc>::from_timestamp(60, 0).unwrap().naive_utc();
        assert_eq!(
            decode::<DateTime<Utc>>(
                &Type::TIMESTAMPTZ,
                &encode(&Cell::TimeStamp(naive), &Type::TIMESTAMPTZ)
            ),
            DateTime::<Utc>::from_timestamp(60, 0).unwrap()
        );
    }

    #[test]
    fn null_is_encoded_as_sql_null() {
        let mut out = BytesMut::new();
        assert!(matches!(
            Cell::Null.to_sql(&Type::INT8, &mut out).unwrap(),
            IsNull::Yes
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn narrowing_is_refused() {
        let mut out = BytesMut::new();
        assert!(Cell::I64(1).to_sql(&Type::INT4, &mut out).is_err());
        assert!(Cell::String("1".to_string()).to_sql(&Type::INT4, &mut out).is_err());
    }

    #[test]
    fn encoding_failure_is_a_conversion_error() {
        let mut out = BytesMut::new();
        let err = Cell::F64(1.5).to_sql(&Type::INT4, &mut out).err().unwrap();

        let err = err.downcast_ref::<EtlError>().unwrap();
        assert_eq!(err.kind(), ErrorKind::ConversionError);
    }

    #[test]
    fn maps_types_both_ways() {
        for data_type in [
            DataType::Int32,
            DataType::Int64,
            DataType::Float32,
            DataType::Float64,
            DataType::String,
            DataType::Boolean,
            DataType::Timestamp,
            DataType::TimestampTz,
            DataType::Json,
        ] {
            let sql_name = sql_type_name(data_type).unwrap();
            let information_schema_name = match sql_name {
                "timestamp" => "timestamp without time zone",
                "timestamptz" => "timestamp with time zone",
                other => other,
            };
            assert_eq!(
                data_type_from_information_schema(information_schema_name),
                data_type
            );
            assert!(pg_type(data_type).is_ok());
        }

        assert_eq!(data_type_from_information_schema("numeric"), DataType::Unknown);
        assert_eq!(
            pg_type(DataType::Unknown).unwrap_err().kind(),
            ErrorKind::UnsupportedType
        );
    }
}

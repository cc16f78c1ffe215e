use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::extraction::influx::client::InfluxClient;
use crate::extraction::influx::chunks::Series;
use crate::extraction::influx::query::qualified_measure;
use crate::types::{Column, DataSet, DataType, TableName};

/// Name of the timestamp column of every InfluxDB measure.
pub const TIME_COLUMN: &str = "time";

/// Discovered layout of a measure.
///
/// The data set lists the time column first, then the tags and the fields, each in
/// lexicographic order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasureSchema {
    pub data_set: DataSet,
    pub tag_keys: Vec<String>,
    pub field_keys: Vec<String>,
}

impl MeasureSchema {
    /// Builds the schema of a measure from its tag keys and typed field keys.
    ///
    /// Tags are always strings. A key that is both a tag and a field is rejected by the
    /// data set as a duplicate column.
    pub fn new(
        table: TableName,
        tag_keys: Vec<String>,
        fields: BTreeMap<String, DataType>,
    ) -> EtlResult<Self> {
        let mut tag_keys = tag_keys;
        tag_keys.sort();
        tag_keys.dedup();

        let mut columns = Vec::with_capacity(1 + tag_keys.len() + fields.len());
        columns.push(Column::new(TIME_COLUMN, DataType::TimestampTz));
        columns.extend(
            tag_keys
                .iter()
                .map(|tag| Column::new(tag.as_str(), DataType::String)),
        );
        columns.extend(
            fields
                .iter()
                .map(|(field, data_type)| Column::new(field.as_str(), *data_type)),
        );

        let data_set = DataSet::new(table, columns, TIME_COLUMN)?;

        Ok(Self {
            data_set,
            tag_keys,
            field_keys: fields.into_keys().collect(),
        })
    }
}

/// Maps an InfluxDB field type, as reported by `SHOW FIELD KEYS`, to a [`DataType`].
pub fn field_data_type(influx_type: &str) -> EtlResult<DataType> {
    let data_type = match influx_type {
        "float" => DataType::Float64,
        "integer" => DataType::Int64,
        "string" => DataType::String,
        "boolean" => DataType::Boolean,
        other => bail!(
            ErrorKind::UnsupportedType,
            "Unsupported InfluxDB field type",
            other
        ),
    };

    Ok(data_type)
}

/// Merges the types a field has across shards.
///
/// An integer field that was also written as float is read as float.
fn merge_field_types(field: &str, current: DataType, other: DataType) -> EtlResult<DataType> {
    match (current, other) {
        (a, b) if a == b => Ok(a),
        (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
            Ok(DataType::Float64)
        }
        (a, b) => bail!(
            ErrorKind::UnsupportedType,
            "Field has conflicting types",
            format!("field '{field}' is both {a} and {b}")
        ),
    }
}

/// Returns the string values of the column `column` of every series.
fn column_strings(series: &[Series], column: &str) -> EtlResult<Vec<String>> {
    let mut values = Vec::new();
    for s in series {
        let Some(index) = s.columns.iter().position(|c| c == column) else {
            bail!(
                ErrorKind::SourceProtocolError,
                "Missing column in InfluxDB response",
                column
            );
        };

        for row in &s.values {
            match row.get(index) {
                Some(Value::String(value)) => values.push(value.clone()),
                other => bail!(
                    ErrorKind::SourceProtocolError,
                    "Unexpected value in InfluxDB response",
                    format!("column '{column}': {other:?}")
                ),
            }
        }
    }

    Ok(values)
}

/// Lists the measures of the client's database.
pub async fn discover_data_sets(client: &InfluxClient) -> EtlResult<Vec<String>> {
    let series = client.query("SHOW MEASUREMENTS").await?;
    let mut measures = column_strings(&series, "name")?;
    measures.sort();

    info!(
        database = client.database(),
        count = measures.len(),
        "discovered measures"
    );

    Ok(measures)
}

/// Fetches the tag and field keys of `measure` and builds its [`MeasureSchema`].
///
/// The data set is named `schema.measure`.
pub async fn fetch_data_set(
    client: &InfluxClient,
    measure: &str,
    retention_policy: Option<&str>,
    schema: &str,
) -> EtlResult<MeasureSchema> {
    let target = qualified_measure(measure, retention_policy);

    let tag_series = client.query(&format!("SHOW TAG KEYS FROM {target}")).await?;
    let tag_keys = column_strings(&tag_series, "tagKey")?;

    let field_series = client
        .query(&format!("SHOW FIELD KEYS FROM {target}"))
        .await?;
    let field_keys = column_strings(&field_series, "fieldKey")?;
    let field_types = column_strings(&field_series, "fieldType")?;

    if field_keys.is_empty() {
        return Err(etl_error!(
            ErrorKind::SourceQueryFailed,
            "Measure has no fields",
            measure
        ));
    }

    let mut fields = BTreeMap::new();
    for (key, influx_type) in field_keys.into_iter().zip(field_types) {
        let data_type = field_data_type(&influx_type)?;
        let merged = match fields.get(&key) {
            Some(current) => merge_field_types(&key, *current, data_type)?,
            None => data_type,
        };
        fields.insert(key, merged);
    }

    debug!(measure, tags = ?tag_keys, fields = ?fields, "fetched measure schema");

    MeasureSchema::new(TableName::new(schema, measure), tag_keys, fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_time_tags_then_fields() {
        let fields = BTreeMap::from([
            ("usage_user".to_string(), DataType::Float64),
            ("count".to_string(), DataType::Int64),
        ]);
        let schema = MeasureSchema::new(
            TableName::new("public", "cpu"),
            vec!["region".to_string(), "host".to_string()],
            fields,
        )
        .unwrap();

        let names = schema
            .data_set
            .columns()
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["time", "host", "region", "count", "usage_user"]);
        assert_eq!(schema.tag_keys, vec!["host", "region"]);
        assert_eq!(schema.field_keys, vec!["count", "usage_user"]);
        assert_eq!(
            schema.data_set.column("time").unwrap().data_type,
            DataType::TimestampTz
        );
    }

    #[test]
    fn key_used_as_tag_and_field_is_invalid() {
        let fields = BTreeMap::from([("host".to_string(), DataType::String)]);
        let err = MeasureSchema::new(
            TableName::new("public", "cpu"),
            vec!["host".to_string()],
            fields,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSchema);
    }

    #[test]
    fn maps_field_types() {
        assert_eq!(field_data_type("float").unwrap(), DataType::Float64);
        assert_eq!(field_data_type("integer").unwrap(), DataType::Int64);
        assert_eq!(field_data_type("string").unwrap(), DataType::String);
        assert_eq!(field_data_type("boolean").unwrap(), DataType::Boolean);
        assert_eq!(
            field_data_type("unsigned").unwrap_err().kind(),
            ErrorKind::UnsupportedType
        );
    }

    #[test]
    fn merges_numeric_field_types() {
        assert_eq!(
            merge_field_types("v", DataType::Int64, DataType::Float64).unwrap(),
            DataType::Float64
        );
        assert_eq!(
            merge_field_types("v", DataType::String, DataType::Int64)
                .unwrap_err()
                .kind(),
            ErrorKind::UnsupportedType
        );
    }
}

use serde_json::{Value, json};

/// Renders one line of a chunked `/query` response holding a single series.
pub fn series_chunk(measure: &str, columns: &[&str], values: Vec<Vec<Value>>) -> String {
    let line = json!({
        "results": [{
            "statement_id": 0,
            "series": [{
                "name": measure,
                "columns": columns,
                "values": values,
            }],
            "partial": true,
        }]
    });

    format!("{line}\n")
}

/// Renders a non-chunked `/query` response with the given column values, one row each.
pub fn show_response(column: &str, values: &[&str]) -> Value {
    let values = values.iter().map(|v| json!([v])).collect::<Vec<_>>();

    json!({
        "results": [{
            "statement_id": 0,
            "series": [{
                "columns": [column],
                "values": values,
            }]
        }]
    })
}

/// Renders a `SHOW FIELD KEYS` response.
pub fn field_keys_response(fields: &[(&str, &str)]) -> Value {
    let values = fields
        .iter()
        .map(|(key, field_type)| json!([key, field_type]))
        .collect::<Vec<_>>();

    json!({
        "results": [{
            "statement_id": 0,
            "series": [{
                "name": "cpu",
                "columns": ["fieldKey", "fieldType"],
                "values": values,
            }]
        }]
    })
}

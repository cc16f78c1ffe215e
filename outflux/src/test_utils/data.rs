use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::types::{Cell, Column, DataSet, DataType, Row, TableName};

/// Timestamp of the `n`th fixture row.
pub fn timestamp(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(n)
}

/// `public.cpu` with a time column, one tag and one field.
pub fn cpu_data_set() -> DataSet {
    DataSet::new(
        TableName::new("public", "cpu"),
        vec![
            Column::new("time", DataType::TimestampTz),
            Column::new("host", DataType::String),
            Column::new("usage", DataType::Float64),
        ],
        "time",
    )
    .unwrap()
}

/// Row `n` of [`cpu_data_set`].
pub fn cpu_row(n: i64) -> Row {
    Row::new(vec![
        Cell::TimeStampTz(timestamp(n)),
        Cell::String(format!("host-{}", n % 2)),
        Cell::F64(n as f64 / 2.0),
    ])
}

pub fn cpu_rows(count: usize) -> Vec<Row> {
    (0..count as i64).map(cpu_row).collect()
}

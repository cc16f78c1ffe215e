use std::collections::HashSet;
use std::fmt;

use pg_escape::quote_identifier;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::types::DataType;

/// Schema used for destination tables when none is configured.
pub const DEFAULT_SCHEMA: &str = "public";

/// A fully qualified destination table name.
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct TableName {
    pub schema: String,
    pub name: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> TableName {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Returns the name as a quoted Postgres identifier, `"schema"."name"`.
    pub fn as_quoted_identifier(&self) -> String {
        let quoted_schema = quote_identifier(&self.schema);
        let quoted_name = quote_identifier(&self.name);

        format!("{quoted_schema}.{quoted_name}")
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Column {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Schema of the rows flowing through a pipe.
///
/// Column names are unique and exactly one of the columns is the time column, which has a
/// timestamp type. Both hold for every constructed value.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DataSet {
    name: TableName,
    columns: Vec<Column>,
    time_column: String,
}

impl DataSet {
    pub fn new(
        name: TableName,
        columns: Vec<Column>,
        time_column: impl Into<String>,
    ) -> EtlResult<DataSet> {
        let time_column = time_column.into();

        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                bail!(
                    ErrorKind::InvalidSchema,
                    "Duplicate column name in data set",
                    format!("column '{}' of {name}", column.name)
                );
            }
        }

        let Some(time) = columns.iter().find(|column| column.name == time_column) else {
            bail!(
                ErrorKind::InvalidSchema,
                "Time column is missing from data set",
                format!("column '{time_column}' of {name}")
            );
        };

        if !time.data_type.is_timestamp() {
            bail!(
                ErrorKind::InvalidSchema,
                "Time column must have a timestamp type",
                format!(
                    "column '{time_column}' of {name} has type {}",
                    time.data_type
                )
            );
        }

        Ok(DataSet {
            name,
            columns,
            time_column,
        })
    }

    pub fn name(&self) -> &TableName {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn time_column(&self) -> &str {
        &self.time_column
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    /// Returns the same data set under another table name.
    pub fn renamed(&self, name: TableName) -> DataSet {
        DataSet {
            name,
            columns: self.columns.clone(),
            time_column: self.time_column.clone(),
        }
    }
}

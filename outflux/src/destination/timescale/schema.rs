use outflux_config::shared::SchemaStrategy;
use pg_escape::{quote_identifier, quote_literal};
use tokio_postgres::Client;
use tracing::{debug, info, warn};

use crate::bail;
use crate::conversions::postgres::{data_type_from_information_schema, sql_type_name};
use crate::error::{ErrorKind, EtlResult};
use crate::types::{DataSet, DataType, TableName};

/// A column of an existing destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingColumn {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

/// What the destination knows about a table that already exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingTable {
    pub columns: Vec<ExistingColumn>,
    /// Time column of the hypertable, `None` for a plain table.
    pub hypertable_time_column: Option<String>,
}

/// Checks that rows of `data_set` can be written into `table`.
///
/// Every data set column must exist with a type its values fit into, no column other than
/// the time column may be `NOT NULL`, and the table must be a hypertable partitioned on the
/// data set's time column.
pub fn validate_existing_table(data_set: &DataSet, table: &ExistingTable) -> EtlResult<()> {
    let name = data_set.name();

    for column in data_set.columns() {
        let Some(existing) = table.columns.iter().find(|c| c.name == column.name) else {
            bail!(
                ErrorKind::SchemaIncompatible,
                "Destination table is missing a column",
                format!("column '{}' of {name}", column.name)
            );
        };

        if !column.data_type.can_fit_into(existing.data_type) {
            bail!(
                ErrorKind::SchemaIncompatible,
                "Destination column has an incompatible type",
                format!(
                    "column '{}' of {name} is {}, values are {}",
                    column.name, existing.data_type, column.data_type
                )
            );
        }
    }

    for existing in &table.columns {
        if !existing.nullable && existing.name != data_set.time_column() {
            bail!(
                ErrorKind::SchemaIncompatible,
                "Destination column must be nullable",
                format!("column '{}' of {name} is NOT NULL", existing.name)
            );
        }
    }

    match &table.hypertable_time_column {
        None => bail!(
            ErrorKind::SchemaIncompatible,
            "Destination table is not a hypertable",
            name
        ),
        Some(time_column) if time_column != data_set.time_column() => bail!(
            ErrorKind::SchemaIncompatible,
            "Hypertable is partitioned on another column",
            format!(
                "{name} is partitioned on '{time_column}', expected '{}'",
                data_set.time_column()
            )
        ),
        Some(_) => Ok(()),
    }
}

pub(super) fn create_table_query(data_set: &DataSet) -> EtlResult<String> {
    let mut columns = Vec::with_capacity(data_set.columns().len());
    for column in data_set.columns() {
        let mut definition = format!(
            "{} {}",
            quote_identifier(&column.name),
            sql_type_name(column.data_type)?
        );
        if column.name == data_set.time_column() {
            definition.push_str(" not null");
        }
        columns.push(definition);
    }

    Ok(format!(
        "create table {} ({});",
        data_set.name().as_quoted_identifier(),
        columns.join(", ")
    ))
}

pub(super) fn create_hypertable_query(data_set: &DataSet) -> String {
    format!(
        "select create_hypertable({}, {});",
        quote_literal(&data_set.name().as_quoted_identifier()),
        quote_literal(data_set.time_column())
    )
}

pub(super) fn drop_table_query(table: &TableName, cascade: bool) -> String {
    let mut query = format!("drop table if exists {}", table.as_quoted_identifier());
    if cascade {
        query.push_str(" cascade");
    }
    query.push(';');

    query
}

async fn timescale_installed(client: &Client) -> EtlResult<bool> {
    let rows = client
        .query_opt(
            "select extversion from pg_extension where extname = 'timescaledb'",
            &[],
        )
        .await?;

    Ok(rows.is_some())
}

async fn load_existing_table(
    client: &Client,
    table: &TableName,
) -> EtlResult<Option<ExistingTable>> {
    let rows = client
        .query(
            "select column_name::text, data_type::text, is_nullable::text \
             from information_schema.columns \
             where table_schema = $1 and table_name = $2 \
             order by ordinal_position",
            &[&table.schema, &table.name],
        )
        .await?;

    if rows.is_empty() {
        return Ok(None);
    }

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let name: String = row.try_get(0)?;
        let data_type: String = row.try_get(1)?;
        let is_nullable: String = row.try_get(2)?;
        columns.push(ExistingColumn {
            name,
            data_type: data_type_from_information_schema(&data_type),
            nullable: is_nullable == "YES",
        });
    }

    let hypertable_time_column = client
        .query_opt(
            "select column_name::text from timescaledb_information.dimensions \
             where hypertable_schema = $1 and hypertable_name = $2 and dimension_number = 1",
            &[&table.schema, &table.name],
        )
        .await?
        .map(|row| row.try_get::<_, String>(0))
        .transpose()?;

    Ok(Some(ExistingTable {
        columns,
        hypertable_time_column,
    }))
}

async fn run_in_transaction(client: &Client, statements: &[String]) -> EtlResult<()> {
    client.simple_query("begin;").await?;
    for statement in statements {
        debug!(statement, "running ddl");
        if let Err(err) = client.simple_query(statement).await {
            if let Err(rollback_err) = client.simple_query("rollback;").await {
                warn!("failed to roll back ddl transaction: {}", rollback_err);
            }
            return Err(err.into());
        }
    }

    client.simple_query("commit;").await?;

    Ok(())
}

async fn create_data_set(client: &Client, data_set: &DataSet, drop: Option<bool>) -> EtlResult<()> {
    let mut statements = vec![format!(
        "create schema if not exists {};",
        quote_identifier(&data_set.name().schema)
    )];
    if let Some(cascade) = drop {
        statements.push(drop_table_query(data_set.name(), cascade));
    }
    statements.push(create_table_query(data_set)?);
    statements.push(create_hypertable_query(data_set));

    run_in_transaction(client, &statements).await?;

    info!(data_set = %data_set.name(), "created hypertable");

    Ok(())
}

/// Prepares the destination table of `data_set` following `strategy`.
pub(super) async fn prepare_data_set(
    client: &Client,
    data_set: &DataSet,
    strategy: SchemaStrategy,
) -> EtlResult<()> {
    if strategy == SchemaStrategy::ValidateOnly {
        if !timescale_installed(client).await? {
            bail!(
                ErrorKind::SchemaIncompatible,
                "TimescaleDB extension is not installed in the destination"
            );
        }
    } else {
        client
            .simple_query("create extension if not exists timescaledb;")
            .await?;
    }

    match strategy {
        SchemaStrategy::ValidateOnly => match load_existing_table(client, data_set.name()).await? {
            Some(table) => validate_existing_table(data_set, &table)?,
            None => bail!(
                ErrorKind::SchemaIncompatible,
                "Destination table does not exist",
                data_set.name()
            ),
        },
        SchemaStrategy::CreateIfMissing => {
            match load_existing_table(client, data_set.name()).await? {
                Some(table) => {
                    validate_existing_table(data_set, &table)?;
                    info!(data_set = %data_set.name(), "using existing hypertable");
                }
                None => create_data_set(client, data_set, None).await?,
            }
        }
        SchemaStrategy::DropAndCreate => create_data_set(client, data_set, Some(false)).await?,
        SchemaStrategy::DropCascadeAndCreate => {
            create_data_set(client, data_set, Some(true)).await?
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Column;

    fn cpu() -> DataSet {
        DataSet::new(
            TableName::new("metrics", "cpu"),
            vec![
                Column::new("time", DataType::TimestampTz),
                Column::new("host", DataType::String),
                Column::new("count", DataType::Int32),
            ],
            "time",
        )
        .unwrap()
    }

    fn column(name: &str, data_type: DataType, nullable: bool) -> ExistingColumn {
        ExistingColumn {
            name: name.to_string(),
            data_type,
            nullable,
        }
    }

    fn matching_table() -> ExistingTable {
        ExistingTable {
            columns: vec![
                column("time", DataType::TimestampTz, false),
                column("host", DataType::String, true),
                column("count", DataType::Int64, true),
                column("extra", DataType::Json, true),
            ],
            hypertable_time_column: Some("time".to_string()),
        }
    }

    #[test]
    fn accepts_wider_columns_and_extra_nullable_columns() {
        validate_existing_table(&cpu(), &matching_table()).unwrap();
    }

    #[test]
    fn rejects_missing_column() {
        let mut table = matching_table();
        table.columns.retain(|c| c.name != "host");
        let err = validate_existing_table(&cpu(), &table).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaIncompatible);
    }

    #[test]
    fn rejects_narrower_column() {
        let mut table = matching_table();
        table.columns[2].data_type = DataType::String;
        let err = validate_existing_table(&cpu(), &table).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaIncompatible);
    }

    #[test]
    fn rejects_not_null_column_other_than_time() {
        let mut table = matching_table();
        table.columns[3].nullable = false;
        let err = validate_existing_table(&cpu(), &table).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaIncompatible);
    }

    #[test]
    fn rejects_plain_table_and_other_partitioning() {
        let mut table = matching_table();
        table.hypertable_time_column = None;
        assert_eq!(
            validate_existing_table(&cpu(), &table).unwrap_err().kind(),
            ErrorKind::SchemaIncompatible
        );

        table.hypertable_time_column = Some("created_at".to_string());
        assert_eq!(
            validate_existing_table(&cpu(), &table).unwrap_err().kind(),
            ErrorKind::SchemaIncompatible
        );
    }

    #[test]
    fn builds_ddl() {
        let create = create_table_query(&cpu()).unwrap();
        assert!(create.starts_with("create table metrics.cpu ("));
        assert!(create.contains(r#""time" timestamptz not null, host text, count integer"#));
        assert_eq!(
            create_hypertable_query(&cpu()),
            "select create_hypertable('metrics.cpu', 'time');"
        );
        assert_eq!(
            drop_table_query(&TableName::new("metrics", "cpu"), true),
            "drop table if exists metrics.cpu cascade;"
        );
    }
}

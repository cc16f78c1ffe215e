use outflux_config::shared::{PgConnectionConfig, SchemaStrategy};
use pg_escape::quote_identifier;
use tokio_postgres::Client;
use tokio_postgres::binary_copy::BinaryCopyInWriter;
use tokio_postgres::types::{ToSql, Type};
use tracing::{debug, info};

use crate::conversions::postgres::pg_type;
use crate::destination::base::{Destination, SchemaManager};
use crate::destination::timescale::{client, schema};
use crate::error::{ErrorKind, EtlResult};
use crate::types::{DataSet, Row};
use crate::{bail, etl_error};

/// Writes rows into a TimescaleDB hypertable with binary `COPY`.
#[derive(Debug)]
pub struct TimescaleDestination {
    client: Client,
    in_transaction: bool,
}

impl TimescaleDestination {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            in_transaction: false,
        }
    }

    pub async fn connect(config: &PgConnectionConfig) -> EtlResult<Self> {
        let client = client::connect(config).await?;

        Ok(Self::new(client))
    }
}

fn copy_query(data_set: &DataSet) -> String {
    let columns = data_set
        .columns()
        .iter()
        .map(|column| quote_identifier(&column.name).into_owned())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "copy {} ({columns}) from stdin binary;",
        data_set.name().as_quoted_identifier()
    )
}

impl SchemaManager for TimescaleDestination {
    async fn prepare_data_set(
        &mut self,
        data_set: &DataSet,
        strategy: SchemaStrategy,
    ) -> EtlResult<()> {
        schema::prepare_data_set(&self.client, data_set, strategy).await
    }
}

impl Destination for TimescaleDestination {
    async fn begin(&mut self) -> EtlResult<()> {
        if self.in_transaction {
            bail!(
                ErrorKind::DestinationTransactionFailed,
                "A transaction is already open"
            );
        }

        self.client.simple_query("begin;").await?;
        self.in_transaction = true;

        Ok(())
    }

    async fn write_rows(&mut self, data_set: &DataSet, rows: &[Row]) -> EtlResult<()> {
        if !self.in_transaction {
            bail!(
                ErrorKind::DestinationTransactionFailed,
                "Write outside of a transaction"
            );
        }

        let types = data_set
            .columns()
            .iter()
            .map(|column| pg_type(column.data_type))
            .collect::<EtlResult<Vec<Type>>>()?;

        let query = copy_query(data_set);
        let sink = self.client.copy_in(query.as_str()).await?;
        let writer = BinaryCopyInWriter::new(sink, &types);
        tokio::pin!(writer);

        for row in rows {
            row.check_arity(data_set)?;
            let values = row
                .values
                .iter()
                .map(|cell| cell as &(dyn ToSql + Sync))
                .collect::<Vec<_>>();
            writer.as_mut().write(&values).await?;
        }

        let written = writer.finish().await?;
        debug!(data_set = %data_set.name(), written, "copied rows");

        if written != rows.len() as u64 {
            return Err(etl_error!(
                ErrorKind::DestinationQueryFailed,
                "Copy wrote an unexpected number of rows",
                format!("expected {}, wrote {written}", rows.len())
            ));
        }

        Ok(())
    }

    async fn commit(&mut self) -> EtlResult<()> {
        if !self.in_transaction {
            bail!(
                ErrorKind::DestinationTransactionFailed,
                "No transaction to commit"
            );
        }

        self.in_transaction = false;
        self.client.simple_query("commit;").await?;

        Ok(())
    }

    async fn rollback(&mut self) -> EtlResult<()> {
        if !self.in_transaction {
            return Ok(());
        }

        self.in_transaction = false;
        self.client.simple_query("rollback;").await?;
        info!("rolled back destination transaction");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Column, DataType, TableName};

    #[test]
    fn copies_every_column_in_order() {
        let data_set = DataSet::new(
            TableName::new("metrics", "cpu"),
            vec![
                Column::new("time", DataType::TimestampTz),
                Column::new("usage", DataType::Float64),
            ],
            "time",
        )
        .unwrap();

        assert_eq!(
            copy_query(&data_set),
            r#"copy metrics.cpu ("time", usage) from stdin binary;"#
        );
    }
}

use async_trait::async_trait;
use outflux_config::shared::{CommitStrategy, IngestionConfig};
use tracing::{debug, info, warn};

use crate::bail;
use crate::concurrency::cancellation::{Cancellation, CancellationRx};
use crate::destination::{Destination, SchemaManager};
use crate::error::{ErrorKind, EtlResult};
use crate::stage::Ingestor;
use crate::types::{Bundle, DataSet, Row};

/// Lifecycle of a [`BatchIngestor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionState {
    NotPrepared,
    Prepared,
    /// Accumulating rows into the current batch.
    Batching,
    /// Writing a full or final batch to the destination.
    Flushing,
    Committed,
    RolledBack,
}

/// Writes rows to a [`Destination`] in batches of `batch_size` rows.
///
/// A transaction is opened when ingestion starts. With [`CommitStrategy::CommitOnEachBatch`]
/// it is committed after every written batch and the next one opens with the next write, so
/// `R` rows take `ceil(R / batch_size)` commits, and a single one when no row arrives. With
/// [`CommitStrategy::CommitOnEnd`] everything is committed once at the end.
#[derive(Debug)]
pub struct BatchIngestor<D> {
    id: String,
    destination: D,
    config: IngestionConfig,
    input: Option<Bundle>,
    state: IngestionState,
    in_transaction: bool,
    rows_written: u64,
}

impl<D> BatchIngestor<D>
where
    D: Destination + SchemaManager + Send,
{
    pub fn new(id: impl Into<String>, destination: D, config: IngestionConfig) -> Self {
        Self {
            id: id.into(),
            destination,
            config,
            input: None,
            state: IngestionState::NotPrepared,
            in_transaction: false,
            rows_written: 0,
        }
    }

    pub fn state(&self) -> IngestionState {
        self.state
    }

    async fn begin(&mut self) -> EtlResult<()> {
        self.destination.begin().await?;
        self.in_transaction = true;

        Ok(())
    }

    async fn commit(&mut self) -> EtlResult<()> {
        self.in_transaction = false;
        self.destination.commit().await?;
        self.state = IngestionState::Committed;

        Ok(())
    }

    async fn rollback(&mut self) {
        self.in_transaction = false;
        if let Err(err) = self.destination.rollback().await {
            warn!("failed to roll back destination transaction: {}", err);
        }
        self.state = IngestionState::RolledBack;
    }

    /// Writes `batch` in the current transaction, opening one if needed.
    async fn flush(&mut self, data_set: &DataSet, batch: &mut Vec<Row>) -> EtlResult<()> {
        self.state = IngestionState::Flushing;

        if !self.in_transaction {
            self.begin().await?;
        }

        self.destination.write_rows(data_set, batch).await?;
        self.rows_written += batch.len() as u64;
        debug!(rows = batch.len(), "wrote batch");
        batch.clear();

        if self.config.commit_strategy == CommitStrategy::CommitOnEachBatch {
            self.commit().await?;
        }

        self.state = IngestionState::Batching;

        Ok(())
    }

    /// Flushes what is left and commits the open transaction.
    async fn finish(&mut self, data_set: &DataSet, batch: &mut Vec<Row>) -> EtlResult<()> {
        if !batch.is_empty() {
            self.flush(data_set, batch).await?;
        }

        if self.in_transaction {
            self.commit().await?;
        }
        self.state = IngestionState::Committed;

        Ok(())
    }

    /// Handles a pending cancellation, returns whether ingestion has to stop.
    async fn handle_cancellation(
        &mut self,
        cancel: &mut CancellationRx,
        data_set: &DataSet,
        batch: &mut Vec<Row>,
    ) -> EtlResult<bool> {
        let Some(cancellation) = cancel.poll() else {
            return Ok(false);
        };

        match cancellation {
            Cancellation::Error(err) => info!("another stage failed, stopping ingestion: {}", err),
            Cancellation::Closed => info!("cancellation channel closed, stopping ingestion"),
        }

        if self.config.rollback_on_external_error {
            self.rollback().await;
        } else {
            self.finish(data_set, batch).await?;
        }

        Ok(true)
    }

    async fn ingest(
        &mut self,
        cancel: &mut CancellationRx,
        mut input: Bundle,
    ) -> EtlResult<()> {
        let data_set = input.data_set;
        let batch_size = self.config.batch_size;
        let mut batch = Vec::with_capacity(batch_size);

        self.begin().await?;
        self.state = IngestionState::Batching;

        while let Some(row) = input.rows.recv().await {
            row.check_arity(&data_set)?;
            batch.push(row);

            if batch.len() < batch_size {
                continue;
            }

            if self.handle_cancellation(cancel, &data_set, &mut batch).await? {
                return Ok(());
            }

            self.flush(&data_set, &mut batch).await?;
        }

        if self.handle_cancellation(cancel, &data_set, &mut batch).await? {
            return Ok(());
        }

        self.finish(&data_set, &mut batch).await
    }
}

#[async_trait]
impl<D> Ingestor for BatchIngestor<D>
where
    D: Destination + SchemaManager + Send,
{
    fn id(&self) -> &str {
        &self.id
    }

    async fn prepare(&mut self, input: Bundle) -> EtlResult<()> {
        self.config.validate()?;
        self.destination
            .prepare_data_set(&input.data_set, self.config.schema_strategy)
            .await?;

        info!(
            data_set = %input.data_set.name(),
            strategy = ?self.config.schema_strategy,
            "prepared destination"
        );

        self.input = Some(input);
        self.state = IngestionState::Prepared;

        Ok(())
    }

    async fn start(&mut self, mut cancel: CancellationRx) -> EtlResult<()> {
        let Some(input) = self.input.take() else {
            bail!(
                ErrorKind::InvalidState,
                "Ingestor started before it was prepared",
                self.id
            );
        };

        let data_set = input.data_set.name().clone();
        let result = self.ingest(&mut cancel, input).await;

        if let Err(err) = &result {
            warn!(data_set = %data_set, "ingestion failed, rolling back: {}", err);
            self.rollback().await;
        } else {
            info!(
                data_set = %data_set,
                rows = self.rows_written,
                state = ?self.state,
                "ingestion finished"
            );
        }

        result
    }
}

use std::sync::Arc;

use outflux_config::shared::SchemaStrategy;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::bail;
use crate::destination::base::{Destination, SchemaManager};
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::types::{DataSet, Row};

/// A transactional operation recorded by [`MemoryDestination`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionEvent {
    Begin,
    Write(usize),
    Commit,
    Rollback,
}

#[derive(Debug, Default)]
struct Inner {
    prepared: Vec<(DataSet, SchemaStrategy)>,
    events: Vec<TransactionEvent>,
    /// Rows of the open transaction, `None` when no transaction is open.
    pending: Option<Vec<Row>>,
    commits: Vec<Vec<Row>>,
    writes: usize,
    fail_prepare: Option<EtlError>,
    fail_write_at: Option<usize>,
    fail_commit: bool,
}

/// Destination keeping everything in memory.
///
/// Clones share their state, so a test can keep one handle and inspect what the ingestor
/// wrote through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryDestination {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `prepare_data_set` fail with `err`.
    pub async fn fail_prepare(&self, err: EtlError) {
        self.inner.lock().await.fail_prepare = Some(err);
    }

    /// Makes the write with the given zero based index fail.
    pub async fn fail_write_at(&self, write: usize) {
        self.inner.lock().await.fail_write_at = Some(write);
    }

    /// Makes every commit fail.
    pub async fn fail_commits(&self) {
        self.inner.lock().await.fail_commit = true;
    }

    pub async fn prepared_data_sets(&self) -> Vec<(DataSet, SchemaStrategy)> {
        self.inner.lock().await.prepared.clone()
    }

    pub async fn events(&self) -> Vec<TransactionEvent> {
        self.inner.lock().await.events.clone()
    }

    /// Rows of every committed transaction, one entry per commit.
    pub async fn commits(&self) -> Vec<Vec<Row>> {
        self.inner.lock().await.commits.clone()
    }

    pub async fn committed_rows(&self) -> Vec<Row> {
        self.inner.lock().await.commits.concat()
    }

    pub async fn rollbacks(&self) -> usize {
        self.count(TransactionEvent::Rollback).await
    }

    pub async fn begins(&self) -> usize {
        self.count(TransactionEvent::Begin).await
    }

    async fn count(&self, event: TransactionEvent) -> usize {
        let inner = self.inner.lock().await;
        inner.events.iter().filter(|e| **e == event).count()
    }
}

impl SchemaManager for MemoryDestination {
    async fn prepare_data_set(
        &mut self,
        data_set: &DataSet,
        strategy: SchemaStrategy,
    ) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(err) = inner.fail_prepare.clone() {
            return Err(err);
        }

        info!(data_set = %data_set.name(), ?strategy, "preparing data set in memory");
        inner.prepared.push((data_set.clone(), strategy));

        Ok(())
    }
}

impl Destination for MemoryDestination {
    async fn begin(&mut self) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.pending.is_some() {
            bail!(
                ErrorKind::DestinationTransactionFailed,
                "A transaction is already open"
            );
        }

        inner.pending = Some(Vec::new());
        inner.events.push(TransactionEvent::Begin);

        Ok(())
    }

    async fn write_rows(&mut self, data_set: &DataSet, rows: &[Row]) -> EtlResult<()> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let write = inner.writes;
        inner.writes += 1;
        if inner.fail_write_at == Some(write) {
            bail!(
                ErrorKind::DestinationQueryFailed,
                "Injected write failure",
                format!("write {write} to {}", data_set.name())
            );
        }

        let Some(pending) = inner.pending.as_mut() else {
            bail!(
                ErrorKind::DestinationTransactionFailed,
                "Write outside of a transaction"
            );
        };

        debug!(data_set = %data_set.name(), rows = rows.len(), "writing rows to memory");
        pending.extend_from_slice(rows);
        inner.events.push(TransactionEvent::Write(rows.len()));

        Ok(())
    }

    async fn commit(&mut self) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.fail_commit {
            bail!(
                ErrorKind::DestinationTransactionFailed,
                "Injected commit failure"
            );
        }

        let Some(rows) = inner.pending.take() else {
            bail!(
                ErrorKind::DestinationTransactionFailed,
                "No transaction to commit"
            );
        };

        inner.commits.push(rows);
        inner.events.push(TransactionEvent::Commit);

        Ok(())
    }

    async fn rollback(&mut self) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.pending.take().is_some() {
            inner.events.push(TransactionEvent::Rollback);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cell, Column, DataType, TableName};

    fn data_set() -> DataSet {
        DataSet::new(
            TableName::new("public", "cpu"),
            vec![Column::new("time", DataType::TimestampTz)],
            "time",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn keeps_only_committed_rows() {
        let handle = MemoryDestination::new();
        let mut destination = handle.clone();
        let row = Row::new(vec![Cell::Null]);

        destination.begin().await.unwrap();
        destination.write_rows(&data_set(), &[row.clone()]).await.unwrap();
        destination.commit().await.unwrap();

        destination.begin().await.unwrap();
        destination.write_rows(&data_set(), &[row.clone()]).await.unwrap();
        destination.rollback().await.unwrap();

        assert_eq!(handle.commits().await, vec![vec![row]]);
        assert_eq!(handle.rollbacks().await, 1);
        assert_eq!(
            handle.events().await,
            vec![
                TransactionEvent::Begin,
                TransactionEvent::Write(1),
                TransactionEvent::Commit,
                TransactionEvent::Begin,
                TransactionEvent::Write(1),
                TransactionEvent::Rollback,
            ]
        );
    }

    #[tokio::test]
    async fn rejects_writes_outside_a_transaction() {
        let mut destination = MemoryDestination::new();
        let err = destination
            .write_rows(&data_set(), &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DestinationTransactionFailed);
    }
}

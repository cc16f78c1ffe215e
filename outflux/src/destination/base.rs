use std::future::Future;

use outflux_config::shared::SchemaStrategy;

use crate::error::EtlResult;
use crate::types::{DataSet, Row};

/// A sink accepting rows inside explicit transactions.
///
/// At most one transaction is open at a time. `write_rows` is only valid between `begin`
/// and `commit` or `rollback`.
pub trait Destination {
    fn begin(&mut self) -> impl Future<Output = EtlResult<()>> + Send;

    fn write_rows(
        &mut self,
        data_set: &DataSet,
        rows: &[Row],
    ) -> impl Future<Output = EtlResult<()>> + Send;

    fn commit(&mut self) -> impl Future<Output = EtlResult<()>> + Send;

    /// Discards the open transaction. A no-op when none is open.
    fn rollback(&mut self) -> impl Future<Output = EtlResult<()>> + Send;
}

/// Creates or checks the destination table of a data set.
pub trait SchemaManager {
    fn prepare_data_set(
        &mut self,
        data_set: &DataSet,
        strategy: SchemaStrategy,
    ) -> impl Future<Output = EtlResult<()>> + Send;
}

//! Stages reshaping rows between extraction and ingestion.

mod json_combiner;
mod schema_renamer;

pub use json_combiner::JsonCombiner;
pub use schema_renamer::SchemaRenamer;

use tracing::{debug, info};

use crate::concurrency::cancellation::CancellationRx;
use crate::error::EtlResult;
use crate::types::{Row, RowReceiver, RowSender};

/// Moves every row of `input` through `transform` into `output`.
///
/// Returns without reading anything when a cancellation is already pending, and stops with
/// `Ok` when the consumer of `output` went away.
pub(crate) async fn pump<F>(
    input: &mut RowReceiver,
    output: &RowSender,
    cancel: &mut CancellationRx,
    mut transform: F,
) -> EtlResult<()>
where
    F: FnMut(Row) -> EtlResult<Row> + Send,
{
    if cancel.is_cancelled() {
        info!("cancellation pending, closing output");
        return Ok(());
    }

    let mut rows: u64 = 0;
    while let Some(row) = input.recv().await {
        let row = transform(row)?;
        if output.send(row).await.is_err() {
            debug!(rows, "row consumer went away, stopping transform");
            return Ok(());
        }
        rows += 1;
    }

    debug!(rows, "transform finished");

    Ok(())
}

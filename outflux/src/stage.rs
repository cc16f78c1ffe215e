//! The three kinds of stages a pipe is made of.
//!
//! Every stage first negotiates its schema in `prepare`, which runs sequentially for the
//! whole pipe, and then moves rows in `start`, which runs as its own task. A stage keeps the
//! sending half of its output channel until it is dropped, so its consumer only sees the
//! channel close once the pipe is done with the stage.

use async_trait::async_trait;

use crate::concurrency::cancellation::CancellationRx;
use crate::error::EtlResult;
use crate::types::Bundle;

/// Reads rows from the source.
#[async_trait]
pub trait Extractor: Send {
    fn id(&self) -> &str;

    /// Returns the bundle carrying the rows this extractor will publish.
    async fn prepare(&mut self) -> EtlResult<Bundle>;

    /// Publishes every row, stopping early with `Ok` when cancelled.
    async fn start(&mut self, cancel: CancellationRx) -> EtlResult<()>;
}

/// Reshapes the rows and the schema of its input bundle.
#[async_trait]
pub trait Transformer: Send {
    fn id(&self) -> &str;

    /// Takes ownership of the input bundle and returns the transformed one.
    async fn prepare(&mut self, input: Bundle) -> EtlResult<Bundle>;

    async fn start(&mut self, cancel: CancellationRx) -> EtlResult<()>;
}

/// Writes rows to the destination.
#[async_trait]
pub trait Ingestor: Send {
    fn id(&self) -> &str;

    /// Prepares the destination for the data set of `input` and keeps the bundle.
    async fn prepare(&mut self, input: Bundle) -> EtlResult<()>;

    async fn start(&mut self, cancel: CancellationRx) -> EtlResult<()>;
}

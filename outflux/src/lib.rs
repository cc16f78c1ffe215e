//! Migration of InfluxDB measures into TimescaleDB hypertables.
//!
//! Every measure is moved by its own [`pipe::Pipe`]: an extractor streaming rows out of
//! InfluxDB, optional transformers reshaping them, and an ingestor writing them in batches
//! to the destination. Stages run as separate tasks connected by bounded channels, and the
//! first failing stage cancels the others through the pipe's
//! [`concurrency::cancellation::CancellationBus`].

pub mod concurrency;
pub mod conversions;
pub mod destination;
pub mod error;
pub mod extraction;
pub mod ingestion;
mod macros;
pub mod pipe;
pub mod runner;
pub mod stage;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transformation;
pub mod types;

//! Stages writing rows into a destination.

mod batch;

pub use batch::{BatchIngestor, IngestionState};

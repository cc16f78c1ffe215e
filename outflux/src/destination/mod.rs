//! Transactional sinks the ingestion stage writes to.

pub mod base;
pub mod memory;
pub mod timescale;

pub use base::{Destination, SchemaManager};

//! Postgres destination with the TimescaleDB extension.

mod client;
mod destination;
mod schema;

pub use client::connect;
pub use destination::TimescaleDestination;
pub use schema::{ExistingColumn, ExistingTable, validate_existing_table};
